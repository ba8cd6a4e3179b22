//! LLM provider adapters, resilience wrapper, weighted backend pool,
//! chunker, and prompt builder (spec.md §4.4-§4.6, §4.8).

pub mod backend;
pub mod chunker;
pub mod pool;
pub mod prompt;
pub mod resilience;

pub use backend::{CompleteOptions, LlmBackend, OllamaBackend, OpenAiCompatibleBackend, ProviderError};
pub use pool::{BackendPool, PoolEntry, PoolError};
pub use prompt::{Message, PromptBuilder, Role};
pub use resilience::{BreakerState, CircuitBreaker, ResilientClient};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("invalid JSON from upstream: {0}")]
    InvalidJson(String),
}

impl From<LlmError> for mockllm_core::ApiError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Pool(PoolError::Empty) | LlmError::Pool(PoolError::AllUnavailable) => {
                mockllm_core::ApiError::UpstreamUnavailable(err.to_string())
            }
            LlmError::Pool(PoolError::UnknownBackend(name)) => {
                mockllm_core::ApiError::BadRequest(format!("unknown backend: {name}"))
            }
            LlmError::Provider(ProviderError::Timeout) => mockllm_core::ApiError::UpstreamTimeout,
            LlmError::Provider(ProviderError::InvalidEnvelope(msg)) => {
                mockllm_core::ApiError::UpstreamInvalidOutput(msg)
            }
            LlmError::Provider(other) => mockllm_core::ApiError::UpstreamUnavailable(other.to_string()),
            LlmError::InvalidJson(msg) => mockllm_core::ApiError::UpstreamInvalidOutput(msg),
        }
    }
}
