//! Generic HTTP side-effect tool (spec.md §4.12): makes one bounded
//! outbound HTTP call on the pipeline's behalf, e.g. to simulate a
//! "mock-hop" to a downstream service before the LLM synthesizes the
//! final response. Grounded on the shape of `HttpClient` in the retrieved
//! pack (domain allowlist, timeout, JSON body, bounded response size).

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::{Tool, ToolError, ToolOutput};

/// Request arguments this tool accepts, deserialized from the JSON
/// `arguments` value passed to `Tool::invoke`.
#[derive(Debug, Deserialize)]
struct HttpToolArgs {
    method: String,
    url: String,
    #[serde(default)]
    headers: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    body: Option<serde_json::Value>,
}

/// Caps how much of an upstream response body this tool will read, so a
/// misbehaving mock-hop target can't exhaust memory.
const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

pub struct HttpTool {
    client: Client,
    /// When non-empty, only these hosts may be called — guards against a
    /// request shape turning this into an open outbound proxy.
    allowed_hosts: Vec<String>,
}

impl HttpTool {
    pub fn new(timeout: Duration, allowed_hosts: Vec<String>) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_else(|_| Client::new());
        Self { client, allowed_hosts }
    }

    fn host_allowed(&self, url: &reqwest::Url) -> bool {
        if self.allowed_hosts.is_empty() {
            return true;
        }
        url.host_str().map(|h| self.allowed_hosts.iter().any(|allowed| allowed == h)).unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl Tool for HttpTool {
    fn name(&self) -> &str {
        "http"
    }

    fn description(&self) -> &str {
        "Makes one bounded outbound HTTP call before response synthesis"
    }

    async fn invoke(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: HttpToolArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let method = reqwest::Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ToolError::InvalidArguments(format!("invalid HTTP method: {}", args.method)))?;

        let url = reqwest::Url::parse(&args.url).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        if !self.host_allowed(&url) {
            return Err(ToolError::InvalidArguments(format!("host not allowed: {}", url.host_str().unwrap_or(""))));
        }

        let mut request = self.client.request(method, url);
        for (key, value) in &args.headers {
            request = request.header(key, value);
        }
        if let Some(body) = &args.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        let truncated = bytes.len() > MAX_RESPONSE_BYTES;
        let text = String::from_utf8_lossy(&bytes[..bytes.len().min(MAX_RESPONSE_BYTES)]).to_string();

        let body_value = serde_json::from_str::<serde_json::Value>(&text).unwrap_or(serde_json::Value::String(text));

        Ok(ToolOutput::ok(serde_json::json!({
            "status": status,
            "body": body_value,
            "truncated": truncated,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_hosts_outside_the_allowlist() {
        let tool = HttpTool::new(Duration::from_secs(1), vec!["allowed.example".to_string()]);
        let url = reqwest::Url::parse("https://evil.example/x").unwrap();
        assert!(!tool.host_allowed(&url));
    }

    #[test]
    fn empty_allowlist_permits_any_host() {
        let tool = HttpTool::new(Duration::from_secs(1), vec![]);
        let url = reqwest::Url::parse("https://anything.example/x").unwrap();
        assert!(tool.host_allowed(&url));
    }
}
