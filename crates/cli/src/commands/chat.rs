use std::io::Write;

use anyhow::Result;
use switchboard_agent::runtime::AgentRuntime;
use switchboard_core::domain::conversation::ConversationId;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::commands::{async_runtime, load_config, CommandResult, EXIT_AGENT};

const EXIT_WORDS: [&str; 2] = ["exit", "quit"];

pub fn run(
    text: Option<String>,
    conversation: Option<String>,
    sender: Option<String>,
) -> CommandResult {
    let config = match load_config("chat") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("chat") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let agents = match AgentRuntime::from_config(&config) {
            Ok(agents) => agents,
            Err(error) => {
                return CommandResult::failure("chat", "agent_runtime", error.to_string(), EXIT_AGENT)
            }
        };
        let conversation = conversation.map(ConversationId);

        match text {
            Some(text) => one_shot(&agents, &text, conversation, sender).await,
            None => {
                let input = BufReader::new(tokio::io::stdin());
                let mut output = std::io::stdout();
                match converse(&agents, conversation, sender, input, &mut output).await {
                    Ok(_) => CommandResult { exit_code: 0, output: String::new() },
                    Err(error) => {
                        CommandResult::failure("chat", "agent_runtime", error.to_string(), EXIT_AGENT)
                    }
                }
            }
        }
    })
}

pub async fn one_shot(
    agents: &AgentRuntime,
    text: &str,
    conversation: Option<ConversationId>,
    sender: Option<String>,
) -> CommandResult {
    match agents.handle_message(text, conversation, sender).await {
        Ok(reply) => CommandResult {
            exit_code: 0,
            output: format!("{}\n[conversation {}]", reply.rendered, reply.conversation_id),
        },
        Err(error) => CommandResult::failure("chat", "agent_runtime", error.to_string(), EXIT_AGENT),
    }
}

/// Reads one message per line until end of input or an exit word and writes
/// each rendered reply. Returns how many messages were handled.
pub async fn converse<R, W>(
    agents: &AgentRuntime,
    conversation: Option<ConversationId>,
    sender: Option<String>,
    input: R,
    output: &mut W,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let conversation = conversation.unwrap_or_else(ConversationId::generate);
    writeln!(output, "[conversation {conversation}]")?;

    let mut lines = input.lines();
    let mut handled = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&line.to_ascii_lowercase().as_str()) {
            break;
        }

        let reply =
            agents.handle_message(line, Some(conversation.clone()), sender.clone()).await?;
        writeln!(output, "{}\n", reply.rendered)?;
        output.flush()?;
        handled += 1;
    }

    Ok(handled)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use switchboard_agent::auth::StaticAuthStatus;
    use switchboard_agent::catalog::CapabilityCatalog;
    use switchboard_agent::directory::StaticDirectory;
    use switchboard_agent::llm::UnavailableLlm;
    use switchboard_agent::runtime::{AgentRuntime, RuntimeComponents, RuntimeSettings};
    use switchboard_agent::tools::{DryRunExecutor, ExecutorRegistry};
    use switchboard_core::domain::capability::CapabilityTag;
    use switchboard_core::domain::conversation::ConversationId;
    use switchboard_core::domain::directory::DirectoryEntity;

    use super::{converse, one_shot};

    fn agents(executor: Arc<DryRunExecutor>) -> AgentRuntime {
        let catalog = Arc::new(CapabilityCatalog::standard());
        let directory = StaticDirectory::new(vec![
            DirectoryEntity::new("U001", "bsmith", "Ben Smith", "Ben Smith")
                .with_email("ben.smith@example.com"),
            DirectoryEntity::new("U002", "btaylor", "Ben Taylor", "Benjamin Taylor")
                .with_email("ben.taylor@example.com"),
        ]);
        AgentRuntime::start(
            RuntimeSettings::default(),
            RuntimeComponents {
                llm: Arc::new(UnavailableLlm),
                directory: Arc::new(directory),
                auth: Arc::new(StaticAuthStatus::new(CapabilityTag::ALL, &catalog)),
                executors: ExecutorRegistry::new(executor),
                catalog,
            },
        )
    }

    #[tokio::test]
    async fn repl_keeps_one_conversation_until_exit() {
        let executor = Arc::new(DryRunExecutor::default());
        let agents = agents(executor.clone());
        let input: &[u8] = b"email ben saying lunch is here\n\n@btaylor\nquit\nplay some music\n";
        let mut output = Vec::new();

        let handled = converse(&agents, Some(ConversationId::from("cli-1")), None, input, &mut output)
            .await
            .expect("conversation");

        assert_eq!(handled, 2);
        assert_eq!(executor.executed().len(), 1);
        let transcript = String::from_utf8(output).expect("utf8");
        assert!(transcript.starts_with("[conversation cli-1]\n"));
        assert!(transcript.contains("I found 2 users matching"));
        assert!(transcript.contains("Email sent to ben.taylor@example.com."));
        assert!(!transcript.contains("Now playing"));
    }

    #[tokio::test]
    async fn one_shot_prints_reply_and_conversation_id() {
        let agents = agents(Arc::new(DryRunExecutor::default()));

        let result = one_shot(&agents, "play some music", Some(ConversationId::from("c-9")), None).await;

        assert_eq!(result.exit_code, 0);
        assert!(result.output.starts_with("Now playing music."));
        assert!(result.output.ends_with("[conversation c-9]"));
    }

    #[tokio::test]
    async fn one_shot_rejects_blank_text() {
        let agents = agents(Arc::new(DryRunExecutor::default()));

        let result = one_shot(&agents, "  ", None, None).await;

        assert_eq!(result.exit_code, super::EXIT_AGENT);
        assert!(result.output.contains("message text is empty"));
    }
}
