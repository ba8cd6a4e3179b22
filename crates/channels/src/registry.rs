//! The push-channel registry (spec.md §4.12): `register`/`unregister`/
//! `list`/`get`/`start`/`stop`/`subscribe`/`unsubscribe`, plus the
//! per-channel generator task.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use mockllm_core::traits::ProduceFn;

use crate::channel::{ChannelState, PayloadSpec, PushChannel, SharedChannel};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel \"{0}\" already exists with a different payload")]
    AlreadyExists(String),
    #[error("channel \"{0}\" not found")]
    NotFound(String),
}

pub struct ChannelRegistry {
    channels: DashMap<String, SharedChannel>,
    shutdowns: DashMap<String, watch::Sender<bool>>,
}

impl ChannelRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { channels: DashMap::new(), shutdowns: DashMap::new() })
    }

    /// Registers a channel. Idempotent if the name already exists with an
    /// identical payload spec; otherwise an error (spec.md §4.12).
    pub fn register(&self, name: &str, spec: PayloadSpec, interval_ms: u64, run_when_idle: bool) -> Result<SharedChannel, ChannelError> {
        if let Some(existing) = self.channels.get(name) {
            if existing.spec == spec {
                return Ok(existing.clone());
            }
            return Err(ChannelError::AlreadyExists(name.to_string()));
        }
        let channel = Arc::new(PushChannel::new(name, spec, interval_ms, run_when_idle));
        self.channels.insert(name.to_string(), channel.clone());
        Ok(channel)
    }

    pub fn unregister(&self, name: &str) -> Result<(), ChannelError> {
        if let Some(tx) = self.shutdowns.remove(name) {
            let _ = tx.1.send(true);
        }
        match self.channels.remove(name) {
            Some((_, channel)) => {
                channel.destroy();
                Ok(())
            }
            None => Err(ChannelError::NotFound(name.to_string())),
        }
    }

    pub fn list(&self) -> Vec<SharedChannel> {
        self.channels.iter().map(|e| e.value().clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<SharedChannel> {
        self.channels.get(name).map(|e| e.value().clone())
    }

    /// Starts (or restarts) a channel's generator task. `produce` builds a
    /// synthetic request from the channel's spec and runs it through the
    /// pipeline, bypassing the variant cache (spec.md §4.12).
    pub fn start(&self, name: &str, produce: ProduceFn) -> Result<(), ChannelError> {
        let channel = self.get(name).ok_or_else(|| ChannelError::NotFound(name.to_string()))?;
        if channel.state() == ChannelState::Running {
            return Ok(());
        }
        channel.start();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdowns.insert(name.to_string(), shutdown_tx);
        tokio::spawn(run_generator(channel, produce, shutdown_rx));
        Ok(())
    }

    pub fn stop(&self, name: &str) -> Result<(), ChannelError> {
        let channel = self.get(name).ok_or_else(|| ChannelError::NotFound(name.to_string()))?;
        channel.stop();
        if let Some((_, tx)) = self.shutdowns.remove(name) {
            let _ = tx.send(true);
        }
        Ok(())
    }

    pub fn subscribe(&self, name: &str) -> Result<(Uuid, mpsc::Receiver<String>), ChannelError> {
        let channel = self.get(name).ok_or_else(|| ChannelError::NotFound(name.to_string()))?;
        Ok(channel.subscribe())
    }

    pub fn unsubscribe(&self, name: &str, id: &Uuid) {
        if let Some(channel) = self.get(name) {
            channel.unsubscribe(id);
        }
    }
}

async fn run_generator(channel: SharedChannel, produce: ProduceFn, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(channel.interval_ms.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !channel.is_active() {
                    continue;
                }
                if channel.subscriber_count() == 0 && !channel.run_when_idle {
                    continue;
                }
                match produce().await {
                    Ok(payload) => channel.publish(&payload),
                    Err(err) => warn!(channel = channel.name, error = %err, "push channel generator produce failed, continuing"),
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    debug!(channel = channel.name, "push channel generator stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use mockllm_core::ApiError;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

    fn spec() -> PayloadSpec {
        PayloadSpec { method: "GET".to_string(), path: "/feed".to_string(), body: "{}".to_string(), shape: None }
    }

    #[test]
    fn registering_same_name_with_same_spec_is_idempotent() {
        let registry = ChannelRegistry::new();
        registry.register("feed", spec(), 1000, true).unwrap();
        let second = registry.register("feed", spec(), 1000, true);
        assert!(second.is_ok());
    }

    #[test]
    fn registering_same_name_with_different_spec_errors() {
        let registry = ChannelRegistry::new();
        registry.register("feed", spec(), 1000, true).unwrap();
        let mut other = spec();
        other.path = "/other".to_string();
        let result = registry.register("feed", other, 1000, true);
        assert!(matches!(result, Err(ChannelError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn generator_publishes_to_subscribers() {
        let registry = ChannelRegistry::new();
        registry.register("feed", spec(), 20, true).unwrap();
        let (_id, mut rx) = registry.subscribe("feed").unwrap();

        let counter = Arc::new(AtomicU32::new(0));
        let produce: ProduceFn = Arc::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                let n = counter.fetch_add(1, AtomicOrdering::Relaxed);
                Ok(format!("{{\"n\":{n}}}"))
            }) as BoxFuture<'static, Result<String, ApiError>>
        });
        registry.start("feed", produce).unwrap();

        let received = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(received.is_ok());
        registry.stop("feed").unwrap();
    }
}
