use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::capability::CapabilityTag;
use crate::quota::QuotaPolicy;

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["switchboard.toml", "config/switchboard.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub routing: RoutingConfig,
    pub context: ContextConfig,
    pub quota: QuotaConfig,
    pub directory: DirectoryConfig,
    pub auth: AuthConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RoutingConfig {
    pub confidence_floor: f32,
    pub worker_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ContextConfig {
    pub max_turns: usize,
    pub max_conversations: usize,
}

#[derive(Clone, Debug)]
pub struct QuotaConfig {
    pub max_actions: u32,
    pub window_secs: u64,
}

#[derive(Clone, Debug, Default)]
pub struct DirectoryConfig {
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub authenticated: Vec<CapabilityTag>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
    /// No classifier: routing always takes the keyword path.
    #[serde(rename = "none")]
    Disabled,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
            Self::Disabled => "none",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub directory_path: Option<PathBuf>,
    pub server_port: Option<u16>,
    pub worker_timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Disabled,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 10,
            },
            routing: RoutingConfig { confidence_floor: 0.4, worker_timeout_secs: 30 },
            context: ContextConfig { max_turns: 10, max_conversations: 1_000 },
            quota: QuotaConfig { max_actions: 10, window_secs: 3600 },
            directory: DirectoryConfig::default(),
            auth: AuthConfig { authenticated: CapabilityTag::ALL.to_vec() },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            "none" | "disabled" => Ok(Self::Disabled),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama|none)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl RoutingConfig {
    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }
}

impl QuotaConfig {
    pub fn policy(&self) -> QuotaPolicy {
        QuotaPolicy { max_actions: self.max_actions, window: Duration::from_secs(self.window_secs) }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(routing) = patch.routing {
            if let Some(confidence_floor) = routing.confidence_floor {
                self.routing.confidence_floor = confidence_floor;
            }
            if let Some(worker_timeout_secs) = routing.worker_timeout_secs {
                self.routing.worker_timeout_secs = worker_timeout_secs;
            }
        }

        if let Some(context) = patch.context {
            if let Some(max_turns) = context.max_turns {
                self.context.max_turns = max_turns;
            }
            if let Some(max_conversations) = context.max_conversations {
                self.context.max_conversations = max_conversations;
            }
        }

        if let Some(quota) = patch.quota {
            if let Some(max_actions) = quota.max_actions {
                self.quota.max_actions = max_actions;
            }
            if let Some(window_secs) = quota.window_secs {
                self.quota.window_secs = window_secs;
            }
        }

        if let Some(path) = patch.directory.and_then(|directory| directory.path) {
            self.directory.path = Some(path);
        }

        if let Some(authenticated) = patch.auth.and_then(|auth| auth.authenticated) {
            self.auth.authenticated = parse_capabilities("auth.authenticated", &authenticated)?;
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SWITCHBOARD_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("SWITCHBOARD_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SWITCHBOARD_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("SWITCHBOARD_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("SWITCHBOARD_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("SWITCHBOARD_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SWITCHBOARD_ROUTING_CONFIDENCE_FLOOR") {
            self.routing.confidence_floor =
                parse_f32("SWITCHBOARD_ROUTING_CONFIDENCE_FLOOR", &value)?;
        }
        if let Some(value) = read_env("SWITCHBOARD_ROUTING_WORKER_TIMEOUT_SECS") {
            self.routing.worker_timeout_secs =
                parse_u64("SWITCHBOARD_ROUTING_WORKER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SWITCHBOARD_CONTEXT_MAX_TURNS") {
            self.context.max_turns = parse_u32("SWITCHBOARD_CONTEXT_MAX_TURNS", &value)? as usize;
        }
        if let Some(value) = read_env("SWITCHBOARD_CONTEXT_MAX_CONVERSATIONS") {
            self.context.max_conversations =
                parse_u32("SWITCHBOARD_CONTEXT_MAX_CONVERSATIONS", &value)? as usize;
        }

        if let Some(value) = read_env("SWITCHBOARD_QUOTA_MAX_ACTIONS") {
            self.quota.max_actions = parse_u32("SWITCHBOARD_QUOTA_MAX_ACTIONS", &value)?;
        }
        if let Some(value) = read_env("SWITCHBOARD_QUOTA_WINDOW_SECS") {
            self.quota.window_secs = parse_u64("SWITCHBOARD_QUOTA_WINDOW_SECS", &value)?;
        }

        if let Some(value) = read_env("SWITCHBOARD_DIRECTORY_PATH") {
            self.directory.path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("SWITCHBOARD_AUTH_AUTHENTICATED") {
            let tags: Vec<String> = value.split(',').map(|tag| tag.trim().to_string()).collect();
            self.auth.authenticated =
                parse_capabilities("SWITCHBOARD_AUTH_AUTHENTICATED", &tags).map_err(|_| {
                    ConfigError::InvalidEnvOverride {
                        key: "SWITCHBOARD_AUTH_AUTHENTICATED".to_string(),
                        value: value.clone(),
                    }
                })?;
        }

        if let Some(value) = read_env("SWITCHBOARD_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SWITCHBOARD_SERVER_PORT") {
            self.server.port = parse_u16("SWITCHBOARD_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("SWITCHBOARD_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SWITCHBOARD_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("SWITCHBOARD_LOGGING_LEVEL").or_else(|| read_env("SWITCHBOARD_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SWITCHBOARD_LOGGING_FORMAT").or_else(|| read_env("SWITCHBOARD_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(directory_path) = overrides.directory_path {
            self.directory.path = Some(directory_path);
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
        if let Some(worker_timeout_secs) = overrides.worker_timeout_secs {
            self.routing.worker_timeout_secs = worker_timeout_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_routing(&self.routing)?;
        validate_context(&self.context)?;
        validate_quota(&self.quota)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Path of the config file `load` would read, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn parse_capabilities(key: &str, values: &[String]) -> Result<Vec<CapabilityTag>, ConfigError> {
    let mut tags = Vec::new();
    for value in values.iter().filter(|value| !value.trim().is_empty()) {
        let tag = value
            .parse::<CapabilityTag>()
            .map_err(|error| ConfigError::Validation(format!("{key}: {error}")))?;
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    Ok(tags)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
        LlmProvider::Disabled => {}
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_routing(routing: &RoutingConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&routing.confidence_floor) {
        return Err(ConfigError::Validation(
            "routing.confidence_floor must be in range 0.0..=1.0".to_string(),
        ));
    }

    if routing.worker_timeout_secs == 0 || routing.worker_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "routing.worker_timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn validate_context(context: &ContextConfig) -> Result<(), ConfigError> {
    if context.max_turns == 0 {
        return Err(ConfigError::Validation(
            "context.max_turns must be greater than zero".to_string(),
        ));
    }
    if context.max_conversations == 0 {
        return Err(ConfigError::Validation(
            "context.max_conversations must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_quota(quota: &QuotaConfig) -> Result<(), ConfigError> {
    if quota.max_actions == 0 {
        return Err(ConfigError::Validation(
            "quota.max_actions must be greater than zero".to_string(),
        ));
    }
    if quota.window_secs == 0 {
        return Err(ConfigError::Validation(
            "quota.window_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.trim().parse::<f32>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    routing: Option<RoutingPatch>,
    context: Option<ContextPatch>,
    quota: Option<QuotaPatch>,
    directory: Option<DirectoryPatch>,
    auth: Option<AuthPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingPatch {
    confidence_floor: Option<f32>,
    worker_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ContextPatch {
    max_turns: Option<usize>,
    max_conversations: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct QuotaPatch {
    max_actions: Option<u32>,
    window_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DirectoryPatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    authenticated: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
