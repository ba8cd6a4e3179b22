//! Retry-with-backoff and per-backend circuit breaking (spec.md §4.6),
//! generalized from the donor's single-backend retry loop into a wrapper
//! any `LlmBackend` can be placed behind.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use mockllm_config::ResilienceConfig;

use crate::backend::{CompleteOptions, LlmBackend, ProviderError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Tracks consecutive failures for one backend and decides whether calls
/// should currently be allowed through.
pub struct CircuitBreaker {
    failure_threshold: u32,
    open_duration: Duration,
    consecutive_failures: AtomicU32,
    state: Mutex<BreakerState>,
    opened_at: Mutex<Option<Instant>>,
    half_open_probe_in_flight: Mutex<bool>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            failure_threshold,
            open_duration,
            consecutive_failures: AtomicU32::new(0),
            state: Mutex::new(BreakerState::Closed),
            opened_at: Mutex::new(None),
            half_open_probe_in_flight: Mutex::new(false),
        }
    }

    pub fn state(&self) -> BreakerState {
        *self.state.lock()
    }

    /// The instant an `Open` breaker should be considered for a half-open
    /// probe. Used by the backend pool to pick the "earliest openUntil"
    /// backend when every backend is currently open (spec.md §4.5).
    pub fn open_until(&self) -> Option<Instant> {
        self.opened_at.lock().map(|at| at + self.open_duration)
    }

    /// Returns whether a call is currently permitted, transitioning
    /// `Open` -> `HalfOpen` once the cooldown has elapsed. Only one
    /// half-open probe is allowed in flight at a time.
    pub fn allow_request(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => {
                let mut probe = self.half_open_probe_in_flight.lock();
                if *probe {
                    false
                } else {
                    *probe = true;
                    true
                }
            }
            BreakerState::Open => {
                let elapsed = self
                    .opened_at
                    .lock()
                    .map(|at| at.elapsed() >= self.open_duration)
                    .unwrap_or(true);
                if elapsed {
                    *state = BreakerState::HalfOpen;
                    *self.half_open_probe_in_flight.lock() = true;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        *self.state.lock() = BreakerState::Closed;
        *self.opened_at.lock() = None;
        *self.half_open_probe_in_flight.lock() = false;
    }

    pub fn record_failure(&self) {
        *self.half_open_probe_in_flight.lock() = false;
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let mut state = self.state.lock();
        if *state == BreakerState::HalfOpen || failures >= self.failure_threshold {
            *state = BreakerState::Open;
            *self.opened_at.lock() = Some(Instant::now());
        }
    }
}

/// Wraps an `LlmBackend` with exponential-backoff-plus-jitter retries and a
/// circuit breaker, so callers only ever see "it worked" or "it's
/// currently unavailable" (spec.md §4.6).
pub struct ResilientClient {
    inner: Box<dyn LlmBackend>,
    breaker: CircuitBreaker,
    config: ResilienceConfig,
    last_latency_ms: AtomicU64,
}

impl ResilientClient {
    pub fn new(inner: Box<dyn LlmBackend>, config: ResilienceConfig) -> Self {
        let breaker = CircuitBreaker::new(
            config.circuit_breaker_failure_threshold,
            Duration::from_secs(config.circuit_breaker_duration_secs),
        );
        Self { inner, breaker, config, last_latency_ms: AtomicU64::new(0) }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn max_context_window(&self) -> u32 {
        self.inner.max_context_window()
    }

    pub fn last_latency_ms(&self) -> u64 {
        self.last_latency_ms.load(Ordering::Relaxed)
    }

    pub async fn complete(&self, prompt: &str, opts: &CompleteOptions) -> Result<String, ProviderError> {
        if !self.breaker.allow_request() {
            return Err(ProviderError::Network {
                retryable: true,
                message: format!("circuit breaker open for backend {}", self.inner.name()),
            });
        }

        let started = Instant::now();
        let mut attempt = 0u32;
        let result = loop {
            attempt += 1;
            match self.inner.complete(prompt, opts).await {
                Ok(text) => break Ok(text),
                Err(err) if err.retryable() && attempt <= self.config.max_retry_attempts => {
                    let delay = backoff_delay(self.config.retry_base_delay_secs, attempt);
                    warn!(backend = self.inner.name(), attempt, ?delay, error = %err, "retrying llm backend call");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(err) => break Err(err),
            }
        };

        self.last_latency_ms.store(started.elapsed().as_millis() as u64, Ordering::Relaxed);

        match &result {
            Ok(_) => {
                debug!(backend = self.inner.name(), "completion succeeded");
                self.breaker.record_success();
            }
            Err(err) if err.retryable() => {
                warn!(backend = self.inner.name(), error = %err, "completion failed after retries");
                self.breaker.record_failure();
            }
            Err(err) => {
                warn!(backend = self.inner.name(), error = %err, "completion failed with a non-retryable error");
            }
        }

        result
    }

    /// Token-streaming passthrough (spec.md §4.10). Breaker-gated but not
    /// retried: a stream that fails partway through has already emitted
    /// tokens to the caller, so restarting it from scratch would duplicate
    /// output. The caller observes cancellation the same way the cache and
    /// push-channel paths do — a dropped receiver ends the loop.
    pub async fn complete_stream(&self, prompt: &str, opts: &CompleteOptions, tx: mpsc::Sender<String>) -> Result<(), ProviderError> {
        if !self.breaker.allow_request() {
            return Err(ProviderError::Network {
                retryable: true,
                message: format!("circuit breaker open for backend {}", self.inner.name()),
            });
        }

        let result = self.inner.complete_stream(prompt, opts, tx).await;
        match &result {
            Ok(()) => self.breaker.record_success(),
            Err(err) if err.retryable() => self.breaker.record_failure(),
            Err(_) => {}
        }
        result
    }
}

/// Exponential backoff from `base_delay_secs`, doubled per attempt, with
/// ±10% jitter (spec.md §4.6), capped at 30s.
fn backoff_delay(base_delay_secs: f64, attempt: u32) -> Duration {
    let exp = base_delay_secs * 2f64.powi(attempt as i32 - 1);
    let capped = exp.min(30.0);
    let jitter = rand::thread_rng().gen_range(-0.1..=0.1);
    Duration::from_secs_f64((capped + capped * jitter).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn breaker_closes_again_on_success() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.allow_request());
    }

    #[test]
    fn backoff_grows_and_stays_capped() {
        let d1 = backoff_delay(0.5, 1);
        let d5 = backoff_delay(0.5, 5);
        assert!(d1.as_secs_f64() <= 0.75);
        assert!(d5.as_secs_f64() <= 45.0);
    }
}
