//! Request fingerprinting: a stable hash of (method, normalized path,
//! canonicalized shape), used as the variant-cache key and the
//! endpoint-statistics key. See spec.md §3.

use sha2::{Digest, Sha256};
use std::fmt;

/// Hex-encoded SHA-256 digest, newtyped so it can't be confused with any
/// other `String` flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// `method`: HTTP method, case-insensitive. `path`: request path with
    /// volatile query params already stripped by the caller. `shape`: the
    /// canonicalized shape text (or `""` if none).
    pub fn compute(method: &str, path: &str, shape: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(method.to_ascii_uppercase().as_bytes());
        hasher.update(b"\0");
        hasher.update(normalize_path(path).as_bytes());
        hasher.update(b"\0");
        hasher.update(canonicalize_shape(shape.unwrap_or("")).as_bytes());
        Fingerprint(hex(&hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Strips a trailing slash (except for the root) so `/a/b` and `/a/b/`
/// fingerprint identically; leaves the rest untouched. Volatile query
/// params are the caller's responsibility to drop before calling this.
fn normalize_path(path: &str) -> String {
    if path.len() > 1 && path.ends_with('/') {
        path.trim_end_matches('/').to_string()
    } else {
        path.to_string()
    }
}

/// Re-parses the shape and re-serializes it through `serde_json` so that
/// key order and whitespace differences collapse to the same fingerprint.
fn canonicalize_shape(shape: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(shape) {
        Ok(v) => canonical_string(&v),
        Err(_) => shape.trim().to_string(),
    }
}

fn canonical_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", k, canonical_string(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_string).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_produce_same_fingerprint() {
        let a = Fingerprint::compute("GET", "/api/mock/users", Some(r#"{"id":0,"name":""}"#));
        let b = Fingerprint::compute("get", "/api/mock/users/", Some(r#"{"name":"","id":0}"#));
        assert_eq!(a, b);
    }

    #[test]
    fn different_shape_produces_different_fingerprint() {
        let a = Fingerprint::compute("GET", "/api/mock/users", Some(r#"{"id":0}"#));
        let b = Fingerprint::compute("GET", "/api/mock/users", Some(r#"{"id":0,"name":""}"#));
        assert_ne!(a, b);
    }
}
