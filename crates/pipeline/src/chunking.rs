//! Bridges `mockllm_llm::chunker`'s pure token-budget math into the
//! pipeline: decides how many items a request is asking for, and wires
//! the resulting chunk plan into a sequence of prompts.
//!
//! **Implementer decision** (spec.md §4.8 does not say where the
//! "requested count" comes from): derive it, in priority order, from an
//! explicit `?count=` query parameter, then the length of the shape's
//! top-level JSON array (when the shape is given as an array example),
//! else default to 1 (no chunking needed). Recorded in DESIGN.md.

use mockllm_core::{Json, ShapeInfo};
use mockllm_llm::chunker::estimate_tokens;

pub fn requested_count(query: &[(String, String)], shape_info: &ShapeInfo) -> usize {
    if let Some(n) = query
        .iter()
        .find(|(k, _)| k == "count")
        .and_then(|(_, v)| v.parse::<usize>().ok())
    {
        return n.max(1);
    }

    if let Some(shape) = &shape_info.shape {
        if let Ok(parsed) = Json::parse(shape) {
            if let Some(items) = parsed.as_array() {
                return items.len().max(1);
            }
        }
    }

    1
}

/// Rough per-item token estimate, used as `estTokensPerItem` in
/// `plan_chunk_count` — derived from the shape text itself (one example
/// item's size), or a small constant when there's no shape to measure.
pub fn est_tokens_per_item(shape_info: &ShapeInfo) -> u32 {
    match &shape_info.shape {
        Some(shape) => estimate_tokens(shape).max(1),
        None => 32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_count_query_param_wins() {
        let query = vec![("count".to_string(), "250".to_string())];
        let shape_info = ShapeInfo::none();
        assert_eq!(requested_count(&query, &shape_info), 250);
    }

    #[test]
    fn array_shape_length_used_when_no_count_param() {
        let shape_info = ShapeInfo::parse(r#"[{"id":0},{"id":0},{"id":0}]"#, 50);
        assert_eq!(requested_count(&[], &shape_info), 3);
    }

    #[test]
    fn defaults_to_one_with_no_signal() {
        let shape_info = ShapeInfo::none();
        assert_eq!(requested_count(&[], &shape_info), 1);
    }
}
