//! Egress delay computation and N-fanout strategy resolution (spec.md
//! §4.11).

use std::time::Duration;

use rand::Rng;

use mockllm_config::RateLimitDelayRange;

/// Computes the per-request delay for `range`, given `moving_avg_ms` (used
/// only by the `Max` mode).
pub fn compute_delay(range: &RateLimitDelayRange, moving_avg_ms: u64) -> Duration {
    match range {
        RateLimitDelayRange::None => Duration::ZERO,
        RateLimitDelayRange::MinMax { min_ms, max_ms } => {
            let (min_ms, max_ms) = if min_ms <= max_ms { (*min_ms, *max_ms) } else { (*max_ms, *min_ms) };
            if min_ms == max_ms {
                Duration::from_millis(min_ms)
            } else {
                Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
            }
        }
        RateLimitDelayRange::Max => Duration::from_millis(moving_avg_ms),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutStrategy {
    Sequential,
    Parallel,
    Streaming,
}

/// Resolves `?strategy=` (or its `Auto` default) into a concrete strategy
/// for a given fanout count `n` (spec.md §4.11 "Auto").
pub fn resolve_strategy(requested: Option<FanoutStrategy>, n: usize) -> FanoutStrategy {
    if let Some(strategy) = requested {
        return strategy;
    }
    if n <= 1 {
        FanoutStrategy::Sequential
    } else if n <= 5 {
        FanoutStrategy::Parallel
    } else {
        FanoutStrategy::Streaming
    }
}

/// Cumulative per-response stagger for the `Parallel` strategy: response
/// `i` (0-indexed) is delayed by `i * delay`.
pub fn cumulative_delay(delay: Duration, index: usize) -> Duration {
    delay.saturating_mul(index as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_delay_is_within_bounds() {
        let range = RateLimitDelayRange::MinMax { min_ms: 10, max_ms: 20 };
        for _ in 0..20 {
            let d = compute_delay(&range, 0).as_millis() as u64;
            assert!((10..=20).contains(&d));
        }
    }

    #[test]
    fn max_mode_uses_moving_average() {
        let d = compute_delay(&RateLimitDelayRange::Max, 123);
        assert_eq!(d, Duration::from_millis(123));
    }

    #[test]
    fn auto_resolves_by_fanout_count() {
        assert_eq!(resolve_strategy(None, 1), FanoutStrategy::Sequential);
        assert_eq!(resolve_strategy(None, 5), FanoutStrategy::Parallel);
        assert_eq!(resolve_strategy(None, 6), FanoutStrategy::Streaming);
    }

    #[test]
    fn explicit_strategy_overrides_auto() {
        assert_eq!(resolve_strategy(Some(FanoutStrategy::Sequential), 10), FanoutStrategy::Sequential);
    }
}
