use switchboard_agent::runtime::AgentRuntime;
use switchboard_core::config::{AppConfig, ConfigError, LoadOptions};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub runtime: AgentRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("agent runtime failed to start: {0}")]
    Runtime(#[source] anyhow::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let runtime = AgentRuntime::from_config(&config).map_err(BootstrapError::Runtime)?;
    info!(
        event_name = "system.bootstrap.runtime_started",
        llm_provider = config.llm.provider.as_str(),
        authenticated = config.auth.authenticated.len(),
        "agent runtime started"
    );

    Ok(Application { config, runtime })
}
