//! Core types shared across the mock LLM API server:
//! - a tagged JSON value tree, walked by hand (no reflection, spec.md §9)
//! - request fingerprinting
//! - the `ShapeInfo`/`ErrorConfig` extracted per request
//! - error kinds and their HTTP mapping
//! - capability traits for the process-wide singleton stores

pub mod error;
pub mod fingerprint;
pub mod json;
pub mod shape;
pub mod traits;

pub use error::{ApiError, Result};
pub use fingerprint::Fingerprint;
pub use json::Json;
pub use shape::{ErrorConfig, ShapeInfo};
