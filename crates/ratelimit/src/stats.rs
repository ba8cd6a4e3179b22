//! Per-endpoint latency statistics (spec.md §4.11): a ring of the last
//! `RateLimitStatsWindowSize` LLM elapsed times per fingerprint, and their
//! arithmetic mean.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use mockllm_core::Fingerprint;

struct Ring {
    samples: VecDeque<u64>,
    capacity: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self { samples: VecDeque::with_capacity(capacity), capacity: capacity.max(1) }
    }

    fn push(&mut self, elapsed_ms: u64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(elapsed_ms);
    }

    fn avg(&self) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        (self.samples.iter().sum::<u64>() as f64 / self.samples.len() as f64).round() as u64
    }
}

/// Process-wide table of per-fingerprint latency rings.
pub struct EndpointStats {
    rings: DashMap<Fingerprint, Arc<Mutex<Ring>>>,
    window_size: usize,
}

impl EndpointStats {
    pub fn new(window_size: usize) -> Self {
        Self { rings: DashMap::new(), window_size }
    }

    pub fn record(&self, key: &Fingerprint, elapsed_ms: u64) {
        let ring = self
            .rings
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Ring::new(self.window_size))))
            .clone();
        ring.lock().push(elapsed_ms);
    }

    pub fn avg(&self, key: &Fingerprint) -> u64 {
        self.rings.get(key).map(|ring| ring.lock().avg()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_drops_oldest_beyond_capacity() {
        let mut ring = Ring::new(3);
        ring.push(10);
        ring.push(20);
        ring.push(30);
        ring.push(40);
        assert_eq!(ring.samples.len(), 3);
        assert_eq!(ring.avg(), 30);
    }

    #[test]
    fn unseen_fingerprint_has_zero_average() {
        let stats = EndpointStats::new(10);
        let key = Fingerprint::compute("GET", "/x", None);
        assert_eq!(stats.avg(&key), 0);
    }
}
