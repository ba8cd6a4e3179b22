//! Tool invoker (spec.md §2, §4.12 "Optional side-effect calls"): lets the
//! pipeline run a bounded HTTP side-effect call before synthesizing a
//! response, for request shapes that model an external mock-hop rather
//! than a pure LLM round trip.

pub mod http_tool;
pub mod registry;

pub use http_tool::HttpTool;
pub use registry::{ToolExecutor, ToolRegistry};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ToolError {
    #[error("tool \"{0}\" not found")]
    NotFound(String),

    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: serde_json::Value,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: serde_json::Value) -> Self {
        Self { content, is_error: false }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { content: serde_json::json!({ "message": message.into() }), is_error: true }
    }
}

/// A single side-effect-capable tool, run by name with JSON arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn invoke(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError>;
}

impl From<ToolError> for mockllm_core::ApiError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::NotFound(name) => mockllm_core::ApiError::BadRequest(format!("unknown tool: {name}")),
            ToolError::InvalidArguments(msg) => mockllm_core::ApiError::BadRequest(msg),
            ToolError::ExecutionFailed(msg) => mockllm_core::ApiError::InternalError(msg),
        }
    }
}
