//! API context store (spec.md §4.3): named contexts tracking recent calls
//! and a merged shared-data map extracted from response bodies.

pub mod context;
pub mod shared_keys;
pub mod store;

pub use context::{ApiContext, RecentCall};
pub use shared_keys::SharedKeyMatcher;
pub use store::ContextRegistry;
