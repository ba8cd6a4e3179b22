//! `ShapeInfo`: the extracted response-schema hint plus the `$cache`/
//! `$error` directives a client can embed in it. See spec.md §3, §4.2.

use crate::json::Json;
use serde::{Deserialize, Serialize};

/// The `$error:{...}` hint, parsed out of a shape and stripped before the
/// remaining shape is used for prompting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorConfig {
    pub status: u16,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

/// Everything extracted from a request's shape hint, carried through the
/// whole pipeline as a single per-request value.
#[derive(Debug, Clone, Default)]
pub struct ShapeInfo {
    /// Raw shape text (already stripped of `$cache`/`$error`), if any.
    pub shape: Option<String>,
    pub is_json_schema: bool,
    /// 0 means "use the configured default".
    pub cache_count: u32,
    pub error_config: Option<ErrorConfig>,
}

impl ShapeInfo {
    pub fn none() -> Self {
        Self::default()
    }

    /// Parse a raw shape string (from `?shape=`, `X-Response-Shape`, or the
    /// body's `shape` field), stripping `$cache:N` and `$error:{...}` hints
    /// and clamping `N` to `[0, max_cache_per_key]`.
    pub fn parse(raw: &str, max_cache_per_key: u32) -> Self {
        if raw.trim().is_empty() {
            return Self::none();
        }

        let Ok(parsed) = Json::parse(raw) else {
            // Not JSON at all: treat the whole string as a descriptive
            // example shape, with no hints to extract.
            return Self { shape: Some(raw.to_string()), is_json_schema: false, ..Self::default() };
        };

        let (without_cache, cache_hint) = parsed.without_key("$cache");
        let (without_error, error_hint) = without_cache.without_key("$error");

        let cache_count = cache_hint
            .and_then(|v| v.leaf_to_string())
            .and_then(|s| s.parse::<i64>().ok())
            .map(|n| n.clamp(0, max_cache_per_key as i64) as u32)
            .unwrap_or(0);

        let error_config = error_hint.and_then(|v| {
            serde_json::from_value::<ErrorConfig>(v.to_value()).ok()
        });

        let is_json_schema = without_error.get("type").is_some() || without_error.get("properties").is_some();

        Self {
            shape: Some(without_error.to_value().to_string()),
            is_json_schema,
            cache_count,
            error_config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_cache_hint_and_clamps() {
        let info = ShapeInfo::parse(r#"{"id":0,"$cache":999}"#, 50);
        assert_eq!(info.cache_count, 50);
        assert!(!info.shape.as_ref().unwrap().contains("$cache"));
    }

    #[test]
    fn extracts_error_hint() {
        let info = ShapeInfo::parse(r#"{"$error":{"status":503,"message":"down"}}"#, 50);
        let err = info.error_config.unwrap();
        assert_eq!(err.status, 503);
        assert_eq!(err.message.as_deref(), Some("down"));
    }

    #[test]
    fn detects_json_schema_vs_example() {
        let schema = ShapeInfo::parse(r#"{"type":"object","properties":{"id":{"type":"number"}}}"#, 50);
        assert!(schema.is_json_schema);

        let example = ShapeInfo::parse(r#"{"id":0,"name":""}"#, 50);
        assert!(!example.is_json_schema);
    }

    #[test]
    fn empty_shape_is_none() {
        let info = ShapeInfo::parse("", 50);
        assert!(info.shape.is_none());
    }
}
