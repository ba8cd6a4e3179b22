//! Ingress rate limiting (spec.md §6): a fixed-window limiter partitioned
//! per client (API key / auth header / `X-Forwarded-For` first hop /
//! remote IP).

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::info;

const WINDOW: Duration = Duration::from_secs(60);
const STALE_AFTER: Duration = Duration::from_secs(2 * 60);

struct Window {
    count: u32,
    window_start: Instant,
}

pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub retry_after_secs: u64,
    pub reset_at_secs: u64,
}

pub struct IngressLimiter {
    windows: DashMap<String, Mutex<Window>>,
    requests_per_minute: u32,
}

impl IngressLimiter {
    pub fn new(requests_per_minute: u32) -> Arc<Self> {
        Arc::new(Self { windows: DashMap::new(), requests_per_minute })
    }

    pub fn check(&self, partition_key: &str) -> RateLimitDecision {
        let entry = self
            .windows
            .entry(partition_key.to_string())
            .or_insert_with(|| Mutex::new(Window { count: 0, window_start: Instant::now() }));
        let mut window = entry.lock();

        if window.window_start.elapsed() >= WINDOW {
            window.window_start = Instant::now();
            window.count = 0;
        }

        window.count += 1;
        let remaining_in_window = WINDOW.saturating_sub(window.window_start.elapsed());
        let allowed = window.count <= self.requests_per_minute;

        RateLimitDecision {
            allowed,
            limit: self.requests_per_minute,
            remaining: self.requests_per_minute.saturating_sub(window.count),
            retry_after_secs: remaining_in_window.as_secs().max(1),
            reset_at_secs: remaining_in_window.as_secs(),
        }
    }

    pub fn spawn_sweeper(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let limiter = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(5 * 60));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let before = limiter.windows.len();
                        limiter.windows.retain(|_, w| w.lock().window_start.elapsed() < STALE_AFTER);
                        let after = limiter.windows.len();
                        if before != after {
                            info!(removed = before - after, "ingress rate limit sweep evicted stale partitions");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_within_limit() {
        let limiter = IngressLimiter::new(5);
        for _ in 0..5 {
            assert!(limiter.check("client-a").allowed);
        }
        assert!(!limiter.check("client-a").allowed);
    }

    #[test]
    fn partitions_are_independent() {
        let limiter = IngressLimiter::new(1);
        assert!(limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
        assert!(!limiter.check("a").allowed);
    }
}
