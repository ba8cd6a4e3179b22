//! Weighted backend selection across configured providers (spec.md §4.5),
//! generalizing the donor's fixed dual-backend dispatcher into an
//! N-backend pool with priority tiers, weighted round robin within a
//! tier, and a pin-by-name override.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use mockllm_config::{BackendConfig, ProviderKind, ResilienceConfig};

use crate::backend::{LlmBackend, OllamaBackend, OpenAiCompatibleBackend, ProviderError};
use crate::resilience::ResilientClient;

pub struct PoolEntry {
    pub config: BackendConfig,
    pub client: ResilientClient,
    cursor_weight: AtomicU32,
}

/// Selects among configured, enabled backends. Backends are grouped by
/// `priority` (lower value first); within a tier, selection is weighted
/// round robin by `weight`. A caller can pin a specific backend by name
/// (the server layer reads this from a header or query parameter).
pub struct BackendPool {
    entries: Vec<PoolEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("no backends configured")]
    Empty,
    #[error("unknown backend: {0}")]
    UnknownBackend(String),
    #[error("all backends unavailable")]
    AllUnavailable,
}

fn build_backend(config: &BackendConfig, timeout: std::time::Duration) -> Result<Box<dyn LlmBackend>, ProviderError> {
    match config.provider {
        ProviderKind::Ollama => Ok(Box::new(OllamaBackend::new(config.clone(), timeout)?)),
        ProviderKind::OpenAiCompatible | ProviderKind::LmStudio | ProviderKind::Azure => {
            Ok(Box::new(OpenAiCompatibleBackend::new(config.clone(), timeout)?))
        }
    }
}

impl BackendPool {
    pub fn new(backends: &[BackendConfig], resilience: &ResilienceConfig) -> Result<Self, PoolError> {
        let timeout = std::time::Duration::from_secs(resilience.timeout_secs);
        let mut entries = Vec::new();
        for config in backends.iter().filter(|b| b.enabled) {
            let backend = build_backend(config, timeout).map_err(|_| PoolError::Empty)?;
            entries.push(PoolEntry {
                config: config.clone(),
                client: ResilientClient::new(backend, resilience.clone()),
                cursor_weight: AtomicU32::new(0),
            });
        }
        if entries.is_empty() {
            return Err(PoolError::Empty);
        }
        Ok(Self { entries })
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.client.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&PoolEntry> {
        self.entries.iter().find(|e| e.client.name() == name)
    }

    /// Earliest instant any backend's breaker might let a call through —
    /// used to compute `Retry-After` when every backend is currently
    /// `Open` (spec.md §6).
    pub fn earliest_probe_at(&self) -> Option<Instant> {
        self.entries.iter().filter_map(|e| e.client.breaker().open_until()).min()
    }

    /// Picks a backend: `pinned` wins if it names a configured backend
    /// whose breaker currently allows a request, otherwise falls through
    /// to weighted round robin within the lowest-priority tier that
    /// currently has at least one closed/half-open breaker (spec.md
    /// §4.5(1)). If every backend is open, falls back to the one whose
    /// cooldown expires soonest (spec.md §4.5 "all Open -> earliest
    /// openUntil").
    pub fn select(&self, pinned: Option<&str>) -> Result<&PoolEntry, PoolError> {
        if self.entries.is_empty() {
            return Err(PoolError::Empty);
        }

        if let Some(name) = pinned {
            let entry = self.get(name).ok_or_else(|| PoolError::UnknownBackend(name.to_string()))?;
            if entry.client.breaker().allow_request() {
                return Ok(entry);
            }
            // Pinned backend is Open: fall through to weighted selection
            // (spec.md §4.5(1) "use it if enabled and not in Open breaker
            // state; otherwise fall through").
        }

        let min_priority = self.entries.iter().map(|e| e.config.priority).min().unwrap();
        let tier: Vec<&PoolEntry> = self
            .entries
            .iter()
            .filter(|e| e.config.priority == min_priority)
            .collect();

        let available: Vec<&&PoolEntry> = tier
            .iter()
            .filter(|e| e.client.breaker().allow_request())
            .collect();

        if let Some(entry) = weighted_pick(&available) {
            return Ok(entry);
        }

        self.entries
            .iter()
            .min_by_key(|e| e.client.breaker().open_until().unwrap_or_else(Instant::now))
            .ok_or(PoolError::AllUnavailable)
    }
}

fn weighted_pick<'a>(available: &[&&'a PoolEntry]) -> Option<&'a PoolEntry> {
    if available.is_empty() {
        return None;
    }
    let total_weight: u32 = available.iter().map(|e| e.config.weight.max(1)).sum();
    if total_weight == 0 {
        return Some(available[0]);
    }
    // Each entry advances its own cursor by its weight and wraps at the
    // tier's total weight, giving a stateless-looking weighted round robin
    // without a shared mutable index.
    let chosen = available
        .iter()
        .min_by_key(|e| e.cursor_weight.load(Ordering::Relaxed))
        .copied()
        .unwrap();
    chosen.cursor_weight.fetch_add(total_weight / chosen.config.weight.max(1).max(1), Ordering::Relaxed);
    Some(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockllm_config::BackendConfig;

    fn cfg(name: &str, priority: i32, weight: u32) -> BackendConfig {
        BackendConfig { name: name.to_string(), priority, weight, ..BackendConfig::default() }
    }

    #[test]
    fn empty_backend_list_is_an_error() {
        let result = BackendPool::new(&[], &ResilienceConfig::default());
        assert!(matches!(result, Err(PoolError::Empty)));
    }

    #[test]
    fn selects_within_lowest_priority_tier() {
        let backends = vec![cfg("primary", 0, 1), cfg("secondary", 1, 1)];
        let pool = BackendPool::new(&backends, &ResilienceConfig::default()).unwrap();
        let chosen = pool.select(None).unwrap();
        assert_eq!(chosen.config.name, "primary");
    }

    #[test]
    fn pin_overrides_selection() {
        let backends = vec![cfg("primary", 0, 1), cfg("secondary", 1, 1)];
        let pool = BackendPool::new(&backends, &ResilienceConfig::default()).unwrap();
        let chosen = pool.select(Some("secondary")).unwrap();
        assert_eq!(chosen.config.name, "secondary");
    }

    #[test]
    fn unknown_pin_is_an_error() {
        let backends = vec![cfg("primary", 0, 1)];
        let pool = BackendPool::new(&backends, &ResilienceConfig::default()).unwrap();
        assert!(matches!(pool.select(Some("ghost")), Err(PoolError::UnknownBackend(_))));
    }

    #[test]
    fn pin_falls_through_when_pinned_backend_is_open() {
        let resilience = ResilienceConfig::default();
        let backends = vec![cfg("primary", 0, 1), cfg("secondary", 1, 1)];
        let pool = BackendPool::new(&backends, &resilience).unwrap();
        let secondary = pool.get("secondary").unwrap();
        for _ in 0..resilience.circuit_breaker_failure_threshold {
            secondary.client.breaker().record_failure();
        }
        assert_eq!(secondary.client.breaker().state(), crate::resilience::BreakerState::Open);

        let chosen = pool.select(Some("secondary")).unwrap();
        assert_eq!(chosen.config.name, "primary");
    }
}
