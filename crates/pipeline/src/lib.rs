//! Orchestrates one request end to end: sanitize, extract the response
//! shape, assemble the prompt (optionally chunked), call the backend pool,
//! cache the result, record it into the named API context, and apply the
//! egress rate-limit delay (spec.md §4.9, §4.10).

pub mod chunking;
pub mod fanout;
pub mod handlers;
pub mod journey;
pub mod prompt_assembly;
pub mod sanitizer;
pub mod shape_extractor;

use std::sync::Arc;

use mockllm_config::{CacheConfig, ChunkingConfig, RateLimitConfig, ResilienceConfig, SanitizerConfig, StreamingConfig};
use mockllm_core::traits::{CacheStore, ContextStore};
use mockllm_core::Json;
use mockllm_llm::BackendPool;
use mockllm_ratelimit::EndpointStats;
use mockllm_tools::ToolExecutor;

use journey::JourneyStore;

pub use shape_extractor::RawBody;

/// Everything a handler needs to run a request, bundled so call sites pass
/// one value instead of threading half a dozen singletons through every
/// function signature. Cloning is cheap — every field is an `Arc`. The
/// cache and context store are held as trait objects: this crate only
/// ever calls through `CacheStore`/`ContextStore`, never reaches into
/// `mockllm-cache`/`mockllm-context` internals (spec.md §9).
#[derive(Clone)]
pub struct PipelineDeps {
    pub cache: Arc<dyn CacheStore>,
    pub context: Arc<dyn ContextStore>,
    pub backends: Arc<BackendPool>,
    pub tools: Arc<ToolExecutor>,
    pub stats: Arc<EndpointStats>,
    pub journeys: Arc<JourneyStore>,
    pub cache_config: Arc<CacheConfig>,
    pub resilience_config: Arc<ResilienceConfig>,
    pub chunking_config: Arc<ChunkingConfig>,
    pub sanitizer_config: Arc<SanitizerConfig>,
    pub rate_limit_config: Arc<RateLimitConfig>,
    pub streaming_config: Arc<StreamingConfig>,
    /// Copied out of `ServerConfig` at startup so this crate doesn't need
    /// to depend on the server-facing config shape.
    pub request_delay_min_ms: u64,
    pub request_delay_max_ms: u64,
}

/// Everything the HTTP layer extracts from one inbound request before
/// handing it to the pipeline.
#[derive(Debug, Clone)]
pub struct RequestInput {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub header_shape: Option<String>,
    pub body: RawBody,
    /// `?context=` — name of the API context to record this exchange into
    /// and fold into the prompt.
    pub context_name: Option<String>,
    /// `?backend=` / `X-LLM-Backend` — pin a specific configured backend.
    pub backend_pin: Option<String>,
    /// Name of a registered tool to invoke as a side effect before
    /// synthesis (spec.md §4.12's "optional side-effect calls"), kept
    /// separate from `ShapeInfo` since it governs an action, not a shape.
    pub tool_name: Option<String>,
    pub tool_arguments: Option<serde_json::Value>,
    /// `?journeySession=` / `X-Journey-Session` — pins a live journey
    /// session whose current step's `prompt_block()` is folded into the
    /// prompt (spec.md §4.4 "journey-step description").
    pub journey_session: Option<String>,
    /// `includeSchema=true` — envelope the response with the shape used.
    pub include_schema: bool,
    /// `autoChunk=false` disables chunking for this request even when the
    /// global config has it enabled.
    pub auto_chunk: bool,
}

/// The result of a regular (non-streaming) request, ready for the HTTP
/// layer to write out.
#[derive(Debug, Clone)]
pub struct RegularOutcome {
    pub status: u16,
    pub body: Json,
    /// `X-LLMApi-Avg-Time` header value, present only when cache
    /// statistics are enabled.
    pub avg_time_ms: Option<u64>,
}
