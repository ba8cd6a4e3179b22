//! The variant cache itself (spec.md §4.7): `acquire`/`refill`/
//! `invalidate`/`stats`, plus the background sweeper that enforces sliding
//! and absolute expiry and the global item budget.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use mockllm_core::traits::{CacheStats, CacheStore, ProduceFn};
use mockllm_core::{ApiError, Fingerprint};

use mockllm_config::CacheConfig;

use crate::entry::{CacheEntry, StoredVariant};

pub struct VariantCache {
    entries: DashMap<Fingerprint, Arc<Mutex<CacheEntry>>>,
    config: Arc<CacheConfig>,
    hits: AtomicU64,
    misses: AtomicU64,
    total_queued: Arc<AtomicUsize>,
}

impl VariantCache {
    pub fn new(config: CacheConfig) -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            config: Arc::new(config),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            total_queued: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn entry_for(&self, key: &Fingerprint, capacity: u32) -> Arc<Mutex<CacheEntry>> {
        self.entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(CacheEntry::new(capacity))))
            .clone()
    }

    /// Spawns the background refill as a detached task, so `acquire`
    /// returns as soon as it has a response to hand back (spec.md §4.7
    /// "without holding the caller").
    fn spawn_background_refill(&self, key: Fingerprint, entry: Arc<Mutex<CacheEntry>>, capacity: u32, produce: ProduceFn) {
        let config = Arc::clone(&self.config);
        let total_queued = Arc::clone(&self.total_queued);
        tokio::spawn(run_refill(key, entry, capacity, produce, config, total_queued));
    }

    pub fn spawn_sweeper(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let cache = Arc::clone(self);
        let sliding = Duration::from_secs(cache.config.sliding_minutes * 60);
        let absolute = Duration::from_secs(cache.config.absolute_minutes * 60);
        let max_items = cache.config.max_items_global;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.sweep_once(sliding, absolute, max_items).await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("variant cache sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    async fn sweep_once(&self, sliding: Duration, absolute: Duration, max_items: usize) {
        let mut snapshot: Vec<(Fingerprint, Instant, Instant, usize)> = Vec::new();
        for item in self.entries.iter() {
            let guard = item.value().lock().await;
            snapshot.push((item.key().clone(), guard.created_at, guard.last_accessed, guard.queue.len()));
        }

        let mut removed = 0usize;
        for (key, created_at, last_accessed, queue_len) in &snapshot {
            if last_accessed.elapsed() > sliding || created_at.elapsed() > absolute {
                if self.entries.remove(key).is_some() {
                    self.total_queued.fetch_sub(*queue_len, Ordering::Relaxed);
                    removed += 1;
                }
            }
        }

        if self.total_queued.load(Ordering::Relaxed) > max_items {
            let mut remaining: Vec<_> = snapshot
                .into_iter()
                .filter(|(key, ..)| self.entries.contains_key(key))
                .collect();
            remaining.sort_by_key(|(_, _, last_accessed, _)| *last_accessed);
            for (key, _, _, queue_len) in remaining {
                if self.total_queued.load(Ordering::Relaxed) <= max_items {
                    break;
                }
                if self.entries.remove(&key).is_some() {
                    self.total_queued.fetch_sub(queue_len, Ordering::Relaxed);
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            info!(removed, remaining = self.entries.len(), "variant cache sweep evicted entries");
        }
    }
}

async fn run_refill(
    key: Fingerprint,
    entry: Arc<Mutex<CacheEntry>>,
    capacity: u32,
    produce: ProduceFn,
    config: Arc<CacheConfig>,
    total_queued: Arc<AtomicUsize>,
) {
    {
        let mut guard = entry.lock().await;
        if guard.refill_in_flight {
            return;
        }
        guard.refill_in_flight = true;
    }

    let need = {
        let guard = entry.lock().await;
        (capacity as usize).saturating_sub(guard.queue.len())
    };

    for _ in 0..need {
        match produce().await {
            Ok(text) => {
                let variant = StoredVariant::encode(text, config.compression_enabled, config.compression_threshold_bytes);
                let mut guard = entry.lock().await;
                if guard.queue.len() >= guard.capacity as usize {
                    break;
                }
                guard.queue.push_back(variant);
                total_queued.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                warn!(fingerprint = %key, error = %err, "cache refill produce failed, leaving queue partial");
                break;
            }
        }
    }

    let mut guard = entry.lock().await;
    guard.is_primed = true;
    guard.refill_in_flight = false;
}

#[async_trait]
impl CacheStore for VariantCache {
    async fn acquire(&self, key: &Fingerprint, capacity: u32, produce: ProduceFn) -> Result<String, ApiError> {
        let capacity = capacity.min(self.config.max_cache_per_key).max(1);
        let entry = self.entry_for(key, capacity);

        let popped = {
            let mut guard = entry.lock().await;
            let variant = guard.queue.pop_front();
            if variant.is_some() {
                guard.touch();
                self.total_queued.fetch_sub(1, Ordering::Relaxed);
            }
            (variant, guard.needs_refill())
        };

        match popped {
            (Some(variant), needs_refill) => {
                if self.config.stats_enabled {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                }
                if needs_refill {
                    self.spawn_background_refill(key.clone(), entry, capacity, produce);
                }
                variant.decode()
            }
            (None, _) => {
                if self.config.stats_enabled {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                }
                let fresh = produce().await?;
                {
                    let mut guard = entry.lock().await;
                    guard.touch();
                }
                self.spawn_background_refill(key.clone(), entry, capacity, produce);
                Ok(fresh)
            }
        }
    }

    async fn invalidate(&self, key: &Fingerprint) {
        if let Some((_, entry)) = self.entries.remove(key) {
            let guard = entry.lock().await;
            self.total_queued.fetch_sub(guard.queue.len(), Ordering::Relaxed);
        }
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
            total_queued: self.total_queued.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use std::sync::atomic::AtomicU32;

    fn counting_producer(counter: Arc<AtomicU32>) -> ProduceFn {
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                let n = counter.fetch_add(1, Ordering::Relaxed);
                Ok(format!("variant-{n}"))
            }) as BoxFuture<'static, Result<String, ApiError>>
        })
    }

    #[tokio::test]
    async fn miss_then_background_refill_primes_queue() {
        let cache = VariantCache::new(CacheConfig { compression_enabled: false, ..CacheConfig::default() });
        let key = Fingerprint::compute("GET", "/x", None);
        let counter = Arc::new(AtomicU32::new(0));

        let first = cache.acquire(&key, 3, counting_producer(Arc::clone(&counter))).await.unwrap();
        assert_eq!(first, "variant-0");

        // allow the spawned refill task to run
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stats = cache.stats().await;
        assert!(stats.total_queued >= 1, "expected background refill to have queued at least one variant");
    }

    #[tokio::test]
    async fn invalidate_removes_entry_and_queued_count() {
        let cache = VariantCache::new(CacheConfig::default());
        let key = Fingerprint::compute("GET", "/y", None);
        let counter = Arc::new(AtomicU32::new(0));
        let _ = cache.acquire(&key, 2, counting_producer(counter)).await.unwrap();
        cache.invalidate(&key).await;
        let stats = cache.stats().await;
        assert_eq!(stats.entries, 0);
    }
}
