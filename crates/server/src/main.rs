mod bootstrap;
mod chat;
mod health;

use std::time::Duration;

use anyhow::Result;
use axum::Router;
use switchboard_agent::runtime::AgentRuntime;
use switchboard_core::config::{AppConfig, LoadOptions};
use tokio::sync::oneshot;

fn init_logging(config: &AppConfig) {
    use switchboard_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

fn app(runtime: AgentRuntime) -> Router {
    Router::new().merge(chat::router(runtime.clone())).merge(health::router(runtime))
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let bootstrap::Application { config, runtime } = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", config.server.bind_address, config.server.port);
    let grace = Duration::from_secs(config.server.graceful_shutdown_secs);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        "switchboard-server listening"
    );

    let (stop, stopped) = oneshot::channel::<()>();
    let mut serving = tokio::spawn(async move {
        axum::serve(listener, app(runtime))
            .with_graceful_shutdown(async {
                let _ = stopped.await;
            })
            .await
    });

    tokio::select! {
        finished = &mut serving => {
            tracing::error!(
                event_name = "system.server.error",
                "http server terminated before shutdown was requested"
            );
            finished??;
            return Ok(());
        }
        signal = wait_for_shutdown() => signal?,
    }

    tracing::info!(
        event_name = "system.server.stopping",
        grace_secs = grace.as_secs(),
        "switchboard-server stopping"
    );
    let _ = stop.send(());
    match tokio::time::timeout(grace, serving).await {
        Ok(finished) => finished??,
        Err(_) => tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            grace_secs = grace.as_secs(),
            "in-flight requests did not finish within the grace period"
        ),
    }

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

#[cfg(test)]
mod test_support {
    use std::sync::Arc;

    use switchboard_agent::auth::StaticAuthStatus;
    use switchboard_agent::catalog::CapabilityCatalog;
    use switchboard_agent::directory::StaticDirectory;
    use switchboard_agent::llm::UnavailableLlm;
    use switchboard_agent::runtime::{AgentRuntime, RuntimeComponents, RuntimeSettings};
    use switchboard_agent::tools::ExecutorRegistry;
    use switchboard_core::domain::capability::CapabilityTag;
    use switchboard_core::domain::directory::DirectoryEntity;

    pub fn runtime() -> AgentRuntime {
        let catalog = Arc::new(CapabilityCatalog::standard());
        let directory = StaticDirectory::new(vec![
            DirectoryEntity::new("U001", "bsmith", "Ben Smith", "Ben Smith")
                .with_email("ben.smith@example.com"),
            DirectoryEntity::new("U002", "btaylor", "Ben Taylor", "Benjamin Taylor")
                .with_email("ben.taylor@example.com"),
            DirectoryEntity::new("U003", "ajohnson", "Alice Johnson", "Alice Johnson")
                .with_email("alice@example.com"),
        ]);
        let components = RuntimeComponents {
            llm: Arc::new(UnavailableLlm),
            directory: Arc::new(directory),
            auth: Arc::new(StaticAuthStatus::new(CapabilityTag::ALL, &catalog)),
            executors: ExecutorRegistry::default(),
            catalog,
        };
        AgentRuntime::start(RuntimeSettings::default(), components)
    }
}
