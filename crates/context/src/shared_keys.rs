//! `extractSharedKeys` (spec.md §4.3): walk a JSON response body and pull
//! out string/number leaves whose key looks identifying — `id`, `*Id`,
//! `*Name`, `*Email`, `sku`, `code`, etc. — keyed by dotted path.

use regex::RegexSet;

use mockllm_core::Json;

/// Compiled from the configurable `shared_key_patterns` list so the set
/// of "looks identifying" key names is a deployment knob, not a constant.
pub struct SharedKeyMatcher {
    patterns: RegexSet,
}

impl SharedKeyMatcher {
    pub fn new(patterns: &[String]) -> Self {
        let patterns = RegexSet::new(patterns).unwrap_or_else(|_| RegexSet::empty());
        Self { patterns }
    }

    fn leaf_key_matches(&self, path: &str) -> bool {
        let last_segment = path.rsplit(['.', ']']).next().unwrap_or(path).trim_start_matches('[');
        self.patterns.is_match(last_segment)
    }

    /// Returns `(dotted_path, stringified_value)` pairs for every leaf
    /// whose final path segment matches a shared-key pattern.
    pub fn extract(&self, body: &Json) -> Vec<(String, String)> {
        let mut out = Vec::new();
        body.walk_leaves(|path, value| {
            if self.leaf_key_matches(path) {
                if let Some(text) = value.leaf_to_string() {
                    out.push((path.to_string(), text));
                }
            }
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_matcher() -> SharedKeyMatcher {
        SharedKeyMatcher::new(&[
            r"(?i)^id$".to_string(),
            r"(?i)id$".to_string(),
            r"(?i)name$".to_string(),
            r"(?i)email$".to_string(),
            r"(?i)^sku$".to_string(),
            r"(?i)^code$".to_string(),
        ])
    }

    #[test]
    fn extracts_matching_leaves_with_dotted_paths() {
        let body = Json::parse(r#"{"userId":42,"profile":{"fullName":"Ann"},"note":"hi"}"#).unwrap();
        let extracted = default_matcher().extract(&body);
        assert!(extracted.iter().any(|(path, value)| path == "userId" && value == "42"));
        assert!(extracted.iter().any(|(path, value)| path == "profile.fullName" && value == "Ann"));
        assert!(!extracted.iter().any(|(path, _)| path == "note"));
    }

    #[test]
    fn indexes_array_entries() {
        let body = Json::parse(r#"{"items":[{"sku":"A1"},{"sku":"B2"}]}"#).unwrap();
        let extracted = default_matcher().extract(&body);
        assert!(extracted.iter().any(|(path, value)| path == "items[0].sku" && value == "A1"));
        assert!(extracted.iter().any(|(path, value)| path == "items[1].sku" && value == "B2"));
    }
}
