//! N-fanout strategy execution (spec.md §4.11): given `n` independent
//! "produce one result" closures, run them Sequential / Parallel /
//! Streaming depending on the resolved [`mockllm_ratelimit::FanoutStrategy`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;

use mockllm_core::ApiError;
use mockllm_ratelimit::delay::cumulative_delay;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Produces the `index`-th result of a fanout, independent of the others.
pub type IndexedProduceFn = Arc<dyn Fn(usize) -> BoxFuture<'static, Result<String, ApiError>> + Send + Sync>;

/// Sequential strategy (spec.md §4.11): await each call, sleep the delay,
/// then the next.
pub async fn run_sequential(n: usize, delay: Duration, produce: IndexedProduceFn) -> Vec<Result<String, ApiError>> {
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        out.push(produce(i).await);
        if !delay.is_zero() && i + 1 < n {
            tokio::time::sleep(delay).await;
        }
    }
    out
}

/// Parallel strategy: issue all `n` calls concurrently, then stagger the
/// *responses* by `i * delay` (spec.md §4.11).
pub async fn run_parallel(n: usize, delay: Duration, produce: IndexedProduceFn) -> Vec<Result<String, ApiError>> {
    let futures = (0..n).map(|i| {
        let produce = produce.clone();
        async move {
            let result = produce(i).await;
            let stagger = cumulative_delay(delay, i);
            if !stagger.is_zero() {
                tokio::time::sleep(stagger).await;
            }
            result
        }
    });
    futures::future::join_all(futures).await
}

/// Streaming strategy: emits `(index, result)` pairs over `tx` in
/// completion order, each paced by `delay` (spec.md §4.11 "order =
/// completion order"). Stops early if the receiver has gone away.
pub async fn run_streaming(n: usize, delay: Duration, produce: IndexedProduceFn, tx: mpsc::Sender<(usize, Result<String, ApiError>)>) {
    let mut futs = FuturesUnordered::new();
    for i in 0..n {
        let produce = produce.clone();
        futs.push(async move {
            let result = produce(i).await;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            (i, result)
        });
    }

    while let Some((i, result)) = futs.next().await {
        if tx.send((i, result)).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_produce() -> (IndexedProduceFn, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let produce: IndexedProduceFn = Arc::new(move |i| {
            let counter = Arc::clone(&counter_clone);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(format!("item-{i}"))
            })
        });
        (produce, counter)
    }

    #[tokio::test]
    async fn sequential_runs_all_and_preserves_order() {
        let (produce, counter) = counting_produce();
        let results = run_sequential(3, Duration::from_millis(0), produce).await;
        assert_eq!(counter.load(Ordering::Relaxed), 3);
        assert_eq!(results[0].as_ref().unwrap(), "item-0");
        assert_eq!(results[2].as_ref().unwrap(), "item-2");
    }

    #[tokio::test]
    async fn parallel_runs_all_concurrently() {
        let (produce, counter) = counting_produce();
        let results = run_parallel(5, Duration::from_millis(0), produce).await;
        assert_eq!(counter.load(Ordering::Relaxed), 5);
        assert_eq!(results.len(), 5);
    }

    #[tokio::test]
    async fn streaming_emits_every_result_over_the_channel() {
        let (produce, _counter) = counting_produce();
        let (tx, mut rx) = mpsc::channel(16);
        run_streaming(4, Duration::from_millis(0), produce, tx).await;

        let mut received = 0;
        while let Some((_, result)) = rx.recv().await {
            assert!(result.is_ok());
            received += 1;
        }
        assert_eq!(received, 4);
    }
}
