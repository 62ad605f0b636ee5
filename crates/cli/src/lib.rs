pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "switchboard",
    about = "Switchboard assistant CLI",
    long_about = "Talk to the assistant, inspect routing and name resolution, and check runtime readiness.",
    after_help = "Examples:\n  switchboard chat \"play some music\"\n  switchboard route \"find Philip's email address\"\n  switchboard resolve ben --require-email\n  switchboard doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Send one message, or read messages line by line from stdin when no text is given")]
    Chat {
        #[arg(long, help = "Continue an existing conversation")]
        conversation: Option<String>,
        #[arg(long, help = "Sender id used for quota accounting (defaults to the conversation id)")]
        sender: Option<String>,
        #[arg(help = "Message text")]
        text: Vec<String>,
    },
    #[command(about = "Print the routing decision for a message as JSON")]
    Route {
        #[arg(required = true, help = "Message text")]
        text: Vec<String>,
    },
    #[command(about = "Resolve a name against the configured directory and print the result as JSON")]
    Resolve {
        #[arg(long, help = "Only consider entries that have an email address")]
        require_email: bool,
        #[arg(required = true, help = "Name, display name or @username")]
        query: Vec<String>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, language model readiness, directory and agent liveness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat { conversation, sender, text } => {
            let text = join_words(&text);
            commands::chat::run((!text.is_empty()).then_some(text), conversation, sender)
        }
        Command::Route { text } => commands::route::run(&join_words(&text)),
        Command::Resolve { require_email, query } => {
            commands::resolve::run(&join_words(&query), require_email)
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}

fn join_words(words: &[String]) -> String {
    words.join(" ").trim().to_string()
}
