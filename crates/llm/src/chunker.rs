//! Oversized-response chunking (spec.md §4.8): split a large array
//! response into token-budgeted slices, issue one sequential LLM call per
//! slice, and reassemble the results into a single JSON document.

use mockllm_core::Json;

/// Rough token estimate: ~4 characters per token, which is the standard
/// back-of-envelope figure used when no tokenizer is available.
pub fn estimate_tokens(text: &str) -> u32 {
    ((text.len() as f64) / 4.0).ceil() as u32
}

/// Decides whether a response targeting `requested_count` items needs to
/// be chunked, and if so into how many pieces. `budget_tokens` is
/// `max_context_window * context_window_fraction` minus the prompt's own
/// token count — the remaining room for output.
pub fn plan_chunk_count(
    requested_count: usize,
    est_tokens_per_item: u32,
    budget_tokens: u32,
) -> usize {
    if requested_count == 0 || budget_tokens == 0 {
        return 1;
    }
    let total_tokens = est_tokens_per_item.saturating_mul(requested_count as u32).max(1);
    if total_tokens <= budget_tokens {
        return 1;
    }
    let items_per_chunk = (budget_tokens / est_tokens_per_item.max(1)).max(1) as usize;
    (requested_count + items_per_chunk - 1) / items_per_chunk
}

/// Splits `requested_count` items into `chunks` contiguous, roughly equal
/// `(start_index, count)` ranges.
pub fn chunk_ranges(requested_count: usize, chunks: usize) -> Vec<(usize, usize)> {
    if chunks <= 1 {
        return vec![(0, requested_count)];
    }
    let base = requested_count / chunks;
    let remainder = requested_count % chunks;
    let mut ranges = Vec::with_capacity(chunks);
    let mut start = 0;
    for i in 0..chunks {
        let size = base + usize::from(i < remainder);
        if size == 0 {
            continue;
        }
        ranges.push((start, size));
        start += size;
    }
    ranges
}

/// Concatenates the arrays returned by each chunk call into one JSON
/// array. Non-array chunk results are wrapped as single-element arrays so
/// a malformed chunk doesn't drop the rest.
pub fn merge_chunks(chunks: Vec<Json>) -> Json {
    let mut merged = Vec::new();
    for chunk in chunks {
        match chunk {
            Json::Arr(items) => merged.extend(items),
            other => merged.push(other),
        }
    }
    Json::Arr(merged)
}

/// A short textual summary of prior chunks, threaded into subsequent
/// prompts so continuations stay consistent with what came before
/// (spec.md §4.8 "short summary of prior chunks").
pub fn summarize_prior_chunks(chunks: &[Json]) -> String {
    let total_items: usize = chunks
        .iter()
        .map(|c| match c {
            Json::Arr(items) => items.len(),
            _ => 1,
        })
        .sum();
    format!("Prior chunks emitted {} items across {} call(s); continue the sequence without repeating them.", total_items, chunks.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_requests_need_no_chunking() {
        assert_eq!(plan_chunk_count(10, 20, 1000), 1);
    }

    #[test]
    fn oversized_requests_split_into_multiple_chunks() {
        let chunks = plan_chunk_count(1000, 50, 1000);
        assert!(chunks > 1);
    }

    #[test]
    fn ranges_cover_the_full_count_without_overlap() {
        let ranges = chunk_ranges(17, 4);
        let total: usize = ranges.iter().map(|(_, count)| count).sum();
        assert_eq!(total, 17);
        let mut cursor = 0;
        for (start, count) in ranges {
            assert_eq!(start, cursor);
            cursor += count;
        }
    }

    #[test]
    fn merge_flattens_arrays_across_chunks() {
        let merged = merge_chunks(vec![
            Json::Arr(vec![Json::Num(1.0), Json::Num(2.0)]),
            Json::Arr(vec![Json::Num(3.0)]),
        ]);
        match merged {
            Json::Arr(items) => assert_eq!(items.len(), 3),
            _ => panic!("expected array"),
        }
    }
}
