//! Request handlers: regular (spec.md §4.9) and streaming (spec.md §4.10).

pub mod regular;
pub mod streaming;

pub use regular::handle as handle_regular;
pub use regular::produce_for_channel;
pub use streaming::handle as handle_streaming;
