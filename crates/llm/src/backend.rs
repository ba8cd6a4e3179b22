//! LLM provider adapter (spec.md §4.5): a pluggable interface over
//! OpenAI-compatible, Ollama-native, LM Studio, and Azure chat-completion
//! endpoints. Response envelopes are parsed by manual JSON walking —
//! reflection-based deserialization is forbidden on this path so the
//! extraction logic stays legible regardless of how loosely a given
//! provider's envelope is shaped.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::prompt::{Message, Role};
use mockllm_config::{BackendConfig, ProviderKind};

#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network { retryable: bool, message: String },

    #[error("http {status}: {body}")]
    Http { status: u16, retryable: bool, body: String },

    #[error("invalid response envelope: {0}")]
    InvalidEnvelope(String),

    #[error("request timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,
}

impl ProviderError {
    pub fn retryable(&self) -> bool {
        match self {
            ProviderError::Network { retryable, .. } => *retryable,
            ProviderError::Http { retryable, .. } => *retryable,
            ProviderError::InvalidEnvelope(_) => false,
            ProviderError::Timeout => true,
            ProviderError::Cancelled => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Network { retryable: true, message: err.to_string() }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompleteOptions {
    pub max_tokens: Option<u32>,
    pub temperature: f32,
}

impl Default for CompleteOptions {
    fn default() -> Self {
        Self { max_tokens: None, temperature: 0.7 }
    }
}

/// A single configured LLM provider instance.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, prompt: &str, opts: &CompleteOptions) -> Result<String, ProviderError>;

    /// Streams raw token strings over `tx`. Default: not supported, caller
    /// should fall back to `complete` and emit it as a single chunk.
    async fn complete_stream(
        &self,
        prompt: &str,
        opts: &CompleteOptions,
        tx: mpsc::Sender<String>,
    ) -> Result<(), ProviderError> {
        let text = self.complete(prompt, opts).await?;
        let _ = tx.send(text).await;
        Ok(())
    }

    /// `n` independent completions. Default implementation issues `n`
    /// sequential `complete` calls; providers that support native batching
    /// can override this.
    async fn complete_n(&self, prompt: &str, n: usize, opts: &CompleteOptions) -> Result<Vec<String>, ProviderError> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.complete(prompt, opts).await?);
        }
        Ok(out)
    }

    fn name(&self) -> &str;

    fn max_context_window(&self) -> u32;
}

/// Ollama's native `/api/chat` endpoint.
pub struct OllamaBackend {
    client: Client,
    config: BackendConfig,
    timeout: Duration,
}

/// Any OpenAI-compatible `/v1/chat/completions` endpoint — this also
/// covers LM Studio and Azure OpenAI deployments, which both speak the same
/// envelope with a different base URL/auth header.
pub struct OpenAiCompatibleBackend {
    client: Client,
    config: BackendConfig,
    timeout: Duration,
}

impl OllamaBackend {
    pub fn new(config: BackendConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network { retryable: false, message: e.to_string() })?;
        Ok(Self { client, config, timeout })
    }
}

impl OpenAiCompatibleBackend {
    pub fn new(config: BackendConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network { retryable: false, message: e.to_string() })?;
        Ok(Self { client, config, timeout })
    }

    fn auth_header(&self) -> Option<String> {
        self.config.api_key.as_ref().map(|k| match self.config.provider {
            ProviderKind::Azure => k.clone(),
            _ => format!("Bearer {}", k),
        })
    }
}

fn classify_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status.as_u16() == 429
}

/// Locate `choices[0].message.content`, falling back to a top-level
/// `content` or `response` string if the envelope doesn't match the
/// OpenAI shape exactly (spec.md §4.5).
fn extract_openai_content(body: &Value) -> Result<String, ProviderError> {
    if let Some(text) = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
    {
        return Ok(text.to_string());
    }
    if let Some(text) = body.get("content").and_then(|v| v.as_str()) {
        return Ok(text.to_string());
    }
    if let Some(text) = body.get("response").and_then(|v| v.as_str()) {
        return Ok(text.to_string());
    }
    Err(ProviderError::InvalidEnvelope("no choices[0].message.content, content, or response field".to_string()))
}

fn extract_ollama_content(body: &Value) -> Result<String, ProviderError> {
    body.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| ProviderError::InvalidEnvelope("no message.content field".to_string()))
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn complete(&self, prompt: &str, opts: &CompleteOptions) -> Result<String, ProviderError> {
        let request = json!({
            "model": self.config.model_name,
            "stream": false,
            "messages": [{"role": "user", "content": prompt}],
            "options": {
                "temperature": opts.temperature,
                "num_predict": opts.max_tokens.or(self.config.max_tokens),
            }
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.config.base_url))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retryable = classify_status(status);
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http { status: status.as_u16(), retryable, body });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidEnvelope(e.to_string()))?;
        extract_ollama_content(&body)
    }

    async fn complete_stream(
        &self,
        prompt: &str,
        opts: &CompleteOptions,
        tx: mpsc::Sender<String>,
    ) -> Result<(), ProviderError> {
        use futures::StreamExt;

        let request = json!({
            "model": self.config.model_name,
            "stream": true,
            "messages": [{"role": "user", "content": prompt}],
            "options": {
                "temperature": opts.temperature,
                "num_predict": opts.max_tokens.or(self.config.max_tokens),
            }
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.config.base_url))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let retryable = classify_status(status);
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http { status: status.as_u16(), retryable, body });
        }

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for line in String::from_utf8_lossy(&chunk).lines() {
                if line.is_empty() {
                    continue;
                }
                if let Ok(parsed) = serde_json::from_str::<Value>(line) {
                    if let Ok(token) = extract_ollama_content(&parsed) {
                        if !token.is_empty() && tx.send(token).await.is_err() {
                            return Ok(());
                        }
                    }
                    if parsed.get("done").and_then(|d| d.as_bool()) == Some(true) {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn max_context_window(&self) -> u32 {
        self.config.max_context_window
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    async fn complete(&self, prompt: &str, opts: &CompleteOptions) -> Result<String, ProviderError> {
        let messages = vec![Message::user(prompt)];
        let request = json!({
            "model": self.config.model_name,
            "temperature": opts.temperature,
            "max_tokens": opts.max_tokens.or(self.config.max_tokens),
            "messages": messages.iter().map(as_openai_message).collect::<Vec<_>>(),
        });

        let mut req = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .timeout(self.timeout)
            .json(&request);

        if let Some(header) = self.auth_header() {
            req = req.header("Authorization", header);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let retryable = classify_status(status);
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http { status: status.as_u16(), retryable, body });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidEnvelope(e.to_string()))?;
        extract_openai_content(&body)
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn max_context_window(&self) -> u32 {
        self.config.max_context_window
    }
}

fn as_openai_message(m: &Message) -> Value {
    json!({ "role": role_str(m.role), "content": m.content })
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_openai_shaped_content() {
        let body: Value = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"hello"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_openai_content(&body).unwrap(), "hello");
    }

    #[test]
    fn falls_back_to_top_level_content_field() {
        let body: Value = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(extract_openai_content(&body).unwrap(), "hi");
    }

    #[test]
    fn falls_back_to_top_level_response_field() {
        let body: Value = serde_json::from_str(r#"{"response":"hi"}"#).unwrap();
        assert_eq!(extract_openai_content(&body).unwrap(), "hi");
    }

    #[test]
    fn missing_content_is_invalid_envelope() {
        let body: Value = serde_json::from_str(r#"{"choices":[{}]}"#).unwrap();
        assert!(matches!(extract_openai_content(&body), Err(ProviderError::InvalidEnvelope(_))));
    }

    #[test]
    fn server_and_429_are_retryable_client_errors_are_not() {
        assert!(classify_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
        assert!(classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(!classify_status(reqwest::StatusCode::BAD_REQUEST));
    }
}
