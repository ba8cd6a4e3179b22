//! Process-wide application state (spec.md §9 "Global state"): the
//! singleton stores, wired once at startup and threaded through the axum
//! router as a single `Arc`-cloneable value, mirroring the donor's
//! `AppState`.

use std::sync::Arc;
use std::time::Duration;

use mockllm_cache::VariantCache;
use mockllm_channels::ChannelRegistry;
use mockllm_config::Settings;
use mockllm_context::ContextRegistry;
use mockllm_llm::BackendPool;
use mockllm_pipeline::journey::JourneyStore;
use mockllm_pipeline::PipelineDeps;
use mockllm_ratelimit::{EndpointStats, IngressLimiter};
use mockllm_tools::{HttpTool, ToolExecutor, ToolRegistry};

use crate::blobs::BlobStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub cache: Arc<VariantCache>,
    pub context: Arc<ContextRegistry>,
    pub channels: Arc<ChannelRegistry>,
    pub backends: Arc<BackendPool>,
    pub stats: Arc<EndpointStats>,
    pub journeys: Arc<JourneyStore>,
    pub ingress: Arc<IngressLimiter>,
    pub openapi_specs: Arc<BlobStore>,
    pub grpc_protos: Arc<BlobStore>,
    pub pipeline: PipelineDeps,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to build backend pool: {0}")]
    Pool(#[from] mockllm_llm::PoolError),
}

impl AppState {
    pub fn new(config: Settings) -> Result<Arc<Self>, StartupError> {
        let config = Arc::new(config);

        let cache = VariantCache::new(config.cache.clone());
        let context = ContextRegistry::new(config.context.clone());
        let channels = ChannelRegistry::new();
        let backends = Arc::new(BackendPool::new(&config.backends, &config.resilience)?);
        let stats = Arc::new(EndpointStats::new(config.rate_limit.stats_window_size));
        let journeys = JourneyStore::new();
        let ingress = IngressLimiter::new(config.server.requests_per_minute);
        let openapi_specs = Arc::new(BlobStore::new());
        let grpc_protos = Arc::new(BlobStore::new());

        let mut tool_registry = ToolRegistry::new();
        tool_registry.register(Arc::new(HttpTool::new(Duration::from_secs(config.resilience.timeout_secs), Vec::new())));
        let tools = Arc::new(ToolExecutor::new(Arc::new(tool_registry)));

        let pipeline = PipelineDeps {
            cache: cache.clone(),
            context: context.clone(),
            backends: backends.clone(),
            tools,
            stats: stats.clone(),
            journeys: journeys.clone(),
            cache_config: Arc::new(config.cache.clone()),
            resilience_config: Arc::new(config.resilience.clone()),
            chunking_config: Arc::new(config.chunking.clone()),
            sanitizer_config: Arc::new(config.sanitizer.clone()),
            rate_limit_config: Arc::new(config.rate_limit.clone()),
            streaming_config: Arc::new(config.streaming.clone()),
            request_delay_min_ms: config.server.random_request_delay_min_ms,
            request_delay_max_ms: config.server.random_request_delay_max_ms,
        };

        Ok(Arc::new(Self {
            config,
            cache,
            context,
            channels,
            backends,
            stats,
            journeys,
            ingress,
            openapi_specs,
            grpc_protos,
            pipeline,
        }))
    }

    /// Spawns every background sweeper this process owns. Returns the
    /// shutdown senders so `main` can stop them on graceful shutdown.
    pub fn spawn_sweepers(&self) -> Vec<tokio::sync::watch::Sender<bool>> {
        vec![self.cache.spawn_sweeper(), self.context.spawn_sweeper(), self.ingress.spawn_sweeper()]
    }
}
