use crate::error::ApiError;
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// A synchronous-from-the-caller's-view producer of one fresh response.
/// Boxed so [`CacheStore::acquire`] can be called through a trait object
/// without a generic parameter on the trait itself.
pub type ProduceFn = Arc<dyn Fn() -> BoxFuture<'static, Result<String, ApiError>> + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub total_queued: usize,
}

/// Capability interface for the variant cache (spec.md §4.7).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Dequeue a pooled response for `key`, or synchronously `produce` one
    /// and kick off a background refill. Never blocks longer than one
    /// `produce` call.
    async fn acquire(
        &self,
        key: &Fingerprint,
        capacity: u32,
        produce: ProduceFn,
    ) -> Result<String, ApiError>;

    async fn invalidate(&self, key: &Fingerprint);

    async fn stats(&self) -> CacheStats;
}
