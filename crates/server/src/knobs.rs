//! Parses the request knobs spec.md §6 defines (query param, with a
//! header fallback for the ones the spec gives an equivalent header for)
//! into the pipeline's [`RequestInput`] plus the server-only knobs
//! (`n=`, `rateLimit=`, `strategy=`) that never cross into the pipeline
//! crate.

use axum::http::HeaderMap;
use mockllm_config::RateLimitDelayRange;
use mockllm_pipeline::RawBody;
use mockllm_pipeline::RequestInput;
use mockllm_ratelimit::delay::FanoutStrategy;

pub const RESPONSE_SHAPE_HEADER: &str = "x-response-shape";
pub const BACKEND_HEADER: &str = "x-llm-backend";
pub const JOURNEY_SESSION_HEADER: &str = "x-journey-session";
pub const RATE_LIMIT_DELAY_HEADER: &str = "x-rate-limit-delay";
pub const RATE_LIMIT_STRATEGY_HEADER: &str = "x-rate-limit-strategy";

fn query_value<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

pub fn parse_query(raw: Option<&str>) -> Vec<(String, String)> {
    match raw {
        Some(raw) if !raw.is_empty() => serde_urlencoded::from_str(raw).unwrap_or_default(),
        _ => Vec::new(),
    }
}

pub fn bool_knob(query: &[(String, String)], key: &str, default: bool) -> bool {
    match query_value(query, key) {
        Some(v) => v.eq_ignore_ascii_case("true"),
        None => default,
    }
}

/// Builds the pipeline's [`RequestInput`] from the parsed query, headers,
/// method/path, and already-read body.
pub fn build_request_input(
    method: &str,
    path: &str,
    query: Vec<(String, String)>,
    headers: &HeaderMap,
    body: RawBody,
) -> RequestInput {
    let header_shape = header_str(headers, RESPONSE_SHAPE_HEADER).map(str::to_string);
    let context_name = query_value(&query, "context").map(str::to_string);
    let backend_pin = query_value(&query, "backend")
        .map(str::to_string)
        .or_else(|| header_str(headers, BACKEND_HEADER).map(str::to_string));
    let tool_name = query_value(&query, "tool").map(str::to_string);
    let tool_arguments = query_value(&query, "toolArgs").and_then(|raw| serde_json::from_str(raw).ok());
    let journey_session = query_value(&query, "journeySession")
        .map(str::to_string)
        .or_else(|| header_str(headers, JOURNEY_SESSION_HEADER).map(str::to_string));
    let include_schema = bool_knob(&query, "includeSchema", false);
    let auto_chunk = bool_knob(&query, "autoChunk", true);

    RequestInput {
        method: method.to_string(),
        path: path.to_string(),
        query,
        header_shape,
        body,
        context_name,
        backend_pin,
        tool_name,
        tool_arguments,
        journey_session,
        include_schema,
        auto_chunk,
    }
}

/// `rateLimit=min-max` or `rateLimit=max`, from the query or its header
/// equivalent. Returns `None` when absent — callers should fall back to
/// the process-wide configured range.
pub fn rate_limit_override(query: &[(String, String)], headers: &HeaderMap) -> Option<RateLimitDelayRange> {
    let raw = query_value(query, "rateLimit").or_else(|| header_str(headers, RATE_LIMIT_DELAY_HEADER))?;
    parse_rate_limit_spec(raw)
}

fn parse_rate_limit_spec(raw: &str) -> Option<RateLimitDelayRange> {
    if raw.eq_ignore_ascii_case("max") {
        return Some(RateLimitDelayRange::Max);
    }
    let (min_raw, max_raw) = raw.split_once('-')?;
    let min_ms: u64 = min_raw.trim().parse().ok()?;
    let max_ms: u64 = max_raw.trim().parse().ok()?;
    Some(RateLimitDelayRange::MinMax { min_ms, max_ms })
}

/// `strategy=` / `X-Rate-Limit-Strategy:`. `Auto` (or anything
/// unrecognized) resolves to `None`, letting `resolve_strategy` pick based
/// on `n`.
pub fn strategy_override(query: &[(String, String)], headers: &HeaderMap) -> Option<FanoutStrategy> {
    let raw = query_value(query, "strategy").or_else(|| header_str(headers, RATE_LIMIT_STRATEGY_HEADER))?;
    match raw {
        "Sequential" => Some(FanoutStrategy::Sequential),
        "Parallel" => Some(FanoutStrategy::Parallel),
        "Streaming" => Some(FanoutStrategy::Streaming),
        _ => None,
    }
}

pub fn fanout_count(query: &[(String, String)]) -> usize {
    query_value(query, "n").and_then(|v| v.parse::<usize>().ok()).unwrap_or(1).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_min_max_rate_limit_spec() {
        assert!(matches!(parse_rate_limit_spec("10-50"), Some(RateLimitDelayRange::MinMax { min_ms: 10, max_ms: 50 })));
    }

    #[test]
    fn parses_max_mode_rate_limit_spec() {
        assert!(matches!(parse_rate_limit_spec("max"), Some(RateLimitDelayRange::Max)));
    }

    #[test]
    fn rejects_malformed_rate_limit_spec() {
        assert!(parse_rate_limit_spec("garbage").is_none());
    }

    #[test]
    fn fanout_count_defaults_to_one() {
        assert_eq!(fanout_count(&[]), 1);
        assert_eq!(fanout_count(&[("n".to_string(), "7".to_string())]), 7);
    }

    #[test]
    fn bool_knob_reads_true_case_insensitively() {
        let query = vec![("includeSchema".to_string(), "TRUE".to_string())];
        assert!(bool_knob(&query, "includeSchema", false));
    }

    #[test]
    fn journey_session_knob_prefers_query_over_header() {
        let query = vec![("journeySession".to_string(), "s1".to_string())];
        let mut headers = HeaderMap::new();
        headers.insert(JOURNEY_SESSION_HEADER, "s2".parse().unwrap());
        let input = build_request_input("GET", "/x", query, &headers, RawBody::Empty);
        assert_eq!(input.journey_session.as_deref(), Some("s1"));
    }

    #[test]
    fn journey_session_knob_falls_back_to_header() {
        let mut headers = HeaderMap::new();
        headers.insert(JOURNEY_SESSION_HEADER, "s2".parse().unwrap());
        let input = build_request_input("GET", "/x", Vec::new(), &headers, RawBody::Empty);
        assert_eq!(input.journey_session.as_deref(), Some("s2"));
    }
}
