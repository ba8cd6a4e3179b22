//! Variant cache (spec.md §4.7): a keyed, bounded pool of pre-generated
//! response variants per request fingerprint, with sliding + absolute
//! expiration, single-flight refill, optional compression, and
//! statistics.

pub mod entry;
pub mod store;

pub use entry::{CacheEntry, StoredVariant};
pub use store::VariantCache;
