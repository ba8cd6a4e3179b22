//! HTTP server for the mock LLM API server (spec.md §6): the public
//! synthesis/streaming surface, the auth-gated management surface, and
//! the process-wide state they share.

pub mod auth;
pub mod blobs;
pub mod http;
pub mod ingress;
pub mod knobs;
pub mod management;
pub mod response;
pub mod state;

pub use http::create_router;
pub use state::{AppState, StartupError};
