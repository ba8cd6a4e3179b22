//! Capability interfaces for the process-wide singleton stores.
//!
//! The variant cache, context store, and push-channel registry are owned
//! exclusively by their respective crates (`mockllm-cache`,
//! `mockllm-context`, `mockllm-channels`). Everything else — the pipeline,
//! the HTTP handlers — talks to them only through these traits, and only
//! ever passes plain identifiers (a [`crate::Fingerprint`], a context name)
//! across the boundary, never a pointer into the store's internals. See
//! spec.md §9 ("Global state", "Cyclic / back references").

mod cache;
mod context;

pub use cache::{CacheStats, CacheStore, ProduceFn};
pub use context::ContextStore;
