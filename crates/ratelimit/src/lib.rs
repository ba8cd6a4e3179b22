//! Rate-limit engine (spec.md §4.11, §6): per-endpoint latency statistics,
//! egress delay computation, N-fanout strategy resolution, and ingress
//! fixed-window limiting.

pub mod delay;
pub mod ingress;
pub mod stats;

pub use delay::{compute_delay, cumulative_delay, resolve_strategy, FanoutStrategy};
pub use ingress::{IngressLimiter, RateLimitDecision};
pub use stats::EndpointStats;
