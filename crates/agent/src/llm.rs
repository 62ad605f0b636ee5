use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use switchboard_core::config::{LlmConfig, LlmProvider};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Stand-in used when no provider is configured. Every call fails, which
/// sends routing down the keyword path and generic chat to its help text.
#[derive(Clone, Debug, Default)]
pub struct UnavailableLlm;

#[async_trait]
impl LlmClient for UnavailableLlm {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("no language model is configured")
    }
}

/// Chat-completion client for OpenAI-compatible endpoints (OpenAI, Ollama)
/// and the Anthropic messages API.
pub struct HttpLlmClient {
    client: Client,
    provider: LlmProvider,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build llm http client")?;
        let endpoint = endpoint_for(config.provider, config.base_url.as_deref())?;

        Ok(Self {
            client,
            provider: config.provider,
            endpoint,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, prompt: &str) -> Value {
        match self.provider {
            LlmProvider::Anthropic => json!({
                "model": self.model,
                "max_tokens": 1024,
                "messages": [{ "role": "user", "content": prompt }],
            }),
            _ => json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
                "temperature": 0.0,
            }),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut request = self.client.post(&self.endpoint).json(&self.request_body(prompt));
        if let Some(api_key) = &self.api_key {
            request = match self.provider {
                LlmProvider::Anthropic => request
                    .header("x-api-key", api_key.expose_secret())
                    .header("anthropic-version", ANTHROPIC_VERSION),
                _ => request.bearer_auth(api_key.expose_secret()),
            };
        }

        let response = request.send().await.context("llm request failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("llm endpoint returned {status}");
        }

        let payload: Value = response.json().await.context("failed to decode llm response")?;
        match self.provider {
            LlmProvider::Anthropic => anthropic_text(&payload),
            _ => chat_completion_text(&payload),
        }
    }
}

/// Builds the configured client; `none` yields [`UnavailableLlm`].
pub fn client_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider {
        LlmProvider::Disabled => Ok(Arc::new(UnavailableLlm)),
        _ => Ok(Arc::new(HttpLlmClient::from_config(config)?)),
    }
}

fn endpoint_for(provider: LlmProvider, base_url: Option<&str>) -> Result<String> {
    let base = |default: &str| base_url.unwrap_or(default).trim_end_matches('/').to_string();
    match provider {
        LlmProvider::OpenAi => Ok(format!("{}/chat/completions", base(OPENAI_BASE_URL))),
        LlmProvider::Ollama => Ok(format!("{}/v1/chat/completions", base(OLLAMA_BASE_URL))),
        LlmProvider::Anthropic => Ok(format!("{}/v1/messages", base(ANTHROPIC_BASE_URL))),
        LlmProvider::Disabled => Err(anyhow!("llm provider is disabled")),
    }
}

fn chat_completion_text(payload: &Value) -> Result<String> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("chat completion response had no message content"))
}

fn anthropic_text(payload: &Value) -> Result<String> {
    let blocks = payload
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("anthropic response had no content blocks"))?;
    let text = blocks
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");
    if text.is_empty() {
        bail!("anthropic response had no text blocks");
    }
    Ok(text)
}
