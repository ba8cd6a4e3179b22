//! A single push channel: its spec, lifecycle state, and subscriber set
//! (spec.md §4.12).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

/// The synthetic request a channel replays on every tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadSpec {
    pub method: String,
    pub path: String,
    pub body: String,
    pub shape: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Created,
    Running,
    Stopped,
    Destroyed,
}

pub struct PushChannel {
    pub name: String,
    pub spec: PayloadSpec,
    pub interval_ms: u64,
    pub run_when_idle: bool,
    state: RwLock<ChannelState>,
    active: AtomicBool,
    pub subscribers: DashMap<Uuid, mpsc::Sender<String>>,
}

impl PushChannel {
    pub fn new(name: impl Into<String>, spec: PayloadSpec, interval_ms: u64, run_when_idle: bool) -> Self {
        Self {
            name: name.into(),
            spec,
            interval_ms,
            run_when_idle,
            state: RwLock::new(ChannelState::Created),
            active: AtomicBool::new(false),
            subscribers: DashMap::new(),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.read()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn start(&self) {
        *self.state.write() = ChannelState::Running;
        self.active.store(true, Ordering::Relaxed);
    }

    pub fn stop(&self) {
        *self.state.write() = ChannelState::Stopped;
        self.active.store(false, Ordering::Relaxed);
    }

    pub fn destroy(&self) {
        *self.state.write() = ChannelState::Destroyed;
        self.active.store(false, Ordering::Relaxed);
    }

    pub fn subscribe(&self) -> (Uuid, mpsc::Receiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(32);
        self.subscribers.insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: &Uuid) {
        self.subscribers.remove(id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Publishes `payload` to every subscriber, dropping any whose
    /// receiver has gone away (spec.md §4.12 "removes it on next
    /// failure").
    pub fn publish(&self, payload: &str) {
        let dead: Vec<Uuid> = self
            .subscribers
            .iter()
            .filter_map(|entry| match entry.value().try_send(payload.to_string()) {
                Ok(()) => None,
                Err(_) => Some(*entry.key()),
            })
            .collect();
        for id in dead {
            self.subscribers.remove(&id);
        }
    }
}

pub type SharedChannel = Arc<PushChannel>;
