use std::env;
use std::fs;
use std::path::Path;

use secrecy::ExposeSecret;
use switchboard_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    render_effective(&config, config_file_path.as_deref())
}

pub fn render_effective(config: &AppConfig, config_file_path: Option<&Path>) -> String {
    let config_file_doc = load_config_file_doc(config_file_path);

    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let authenticated = config
        .auth
        .authenticated
        .iter()
        .map(|tag| tag.as_str())
        .collect::<Vec<_>>()
        .join(",");

    let doc = config_file_doc.as_ref();
    let line = |key: &str, value: &str, env_keys: &[&str]| {
        render_line(key, value, field_source(key, env_keys, doc, config_file_path))
    };
    let directory_path = config
        .directory
        .path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<unset>".to_string());

    let lines = vec![
        "effective config (source precedence: env > file > default):".to_string(),
        line("llm.provider", config.llm.provider.as_str(), &["SWITCHBOARD_LLM_PROVIDER"]),
        line("llm.model", &config.llm.model, &["SWITCHBOARD_LLM_MODEL"]),
        line(
            "llm.base_url",
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
            &["SWITCHBOARD_LLM_BASE_URL"],
        ),
        line("llm.api_key", &api_key, &["SWITCHBOARD_LLM_API_KEY"]),
        line(
            "llm.timeout_secs",
            &config.llm.timeout_secs.to_string(),
            &["SWITCHBOARD_LLM_TIMEOUT_SECS"],
        ),
        line(
            "routing.confidence_floor",
            &config.routing.confidence_floor.to_string(),
            &["SWITCHBOARD_ROUTING_CONFIDENCE_FLOOR"],
        ),
        line(
            "routing.worker_timeout_secs",
            &config.routing.worker_timeout_secs.to_string(),
            &["SWITCHBOARD_ROUTING_WORKER_TIMEOUT_SECS"],
        ),
        line(
            "context.max_turns",
            &config.context.max_turns.to_string(),
            &["SWITCHBOARD_CONTEXT_MAX_TURNS"],
        ),
        line(
            "context.max_conversations",
            &config.context.max_conversations.to_string(),
            &["SWITCHBOARD_CONTEXT_MAX_CONVERSATIONS"],
        ),
        line(
            "quota.max_actions",
            &config.quota.max_actions.to_string(),
            &["SWITCHBOARD_QUOTA_MAX_ACTIONS"],
        ),
        line(
            "quota.window_secs",
            &config.quota.window_secs.to_string(),
            &["SWITCHBOARD_QUOTA_WINDOW_SECS"],
        ),
        line("directory.path", &directory_path, &["SWITCHBOARD_DIRECTORY_PATH"]),
        line("auth.authenticated", &authenticated, &["SWITCHBOARD_AUTH_AUTHENTICATED"]),
        line(
            "server.bind_address",
            &config.server.bind_address,
            &["SWITCHBOARD_SERVER_BIND_ADDRESS"],
        ),
        line("server.port", &config.server.port.to_string(), &["SWITCHBOARD_SERVER_PORT"]),
        line(
            "server.graceful_shutdown_secs",
            &config.server.graceful_shutdown_secs.to_string(),
            &["SWITCHBOARD_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        line(
            "logging.level",
            &config.logging.level,
            &["SWITCHBOARD_LOGGING_LEVEL", "SWITCHBOARD_LOG_LEVEL"],
        ),
        line(
            "logging.format",
            &format!("{:?}", config.logging.format).to_lowercase(),
            &["SWITCHBOARD_LOGGING_FORMAT", "SWITCHBOARD_LOG_FORMAT"],
        ),
    ];

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use switchboard_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use super::{redact_token, render_effective};

    #[test]
    fn tokens_keep_only_their_prefix() {
        assert_eq!(redact_token("sk-live-abc123"), "sk-***");
        assert_eq!(redact_token("opaquevalue"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn file_values_are_attributed_and_secrets_redacted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("switchboard.toml");
        fs::write(
            &path,
            "[llm]\nprovider = \"openai\"\napi_key = \"sk-secret-value\"\n\n[quota]\nmax_actions = 3\n",
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(path.clone()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect("config should load");
        let rendered = render_effective(&config, Some(&path));

        assert!(!rendered.contains("sk-secret-value"));
        assert!(rendered.contains("- llm.api_key = sk-*** (source: file ("));
        assert!(rendered.contains("- quota.max_actions = 3 (source: file ("));
        assert!(rendered.contains("- context.max_turns = 10 (source: default)"));
    }
}
