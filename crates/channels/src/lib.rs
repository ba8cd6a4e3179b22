//! Push-channel engine (spec.md §4.12): named, timer-driven generators
//! that synthesize a fresh payload per tick and fan it out to subscribers.

pub mod channel;
pub mod registry;

pub use channel::{ChannelState, PayloadSpec, PushChannel, SharedChannel};
pub use registry::{ChannelError, ChannelRegistry};
