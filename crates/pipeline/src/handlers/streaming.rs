//! The streaming request handler (spec.md §4.10): SSE modes `LlmTokens`,
//! `CompleteObjects`, `ArrayItems`, plus continuous mode. Cancellation is
//! observed the same way everywhere else in this workspace — a failed
//! `mpsc::Sender::send` (the receiver, and with it the client connection,
//! is gone) ends the loop without writing another event.

use std::time::Duration;

use rand::Rng;
use serde_json::json;
use tokio::sync::mpsc;

use mockllm_core::{Fingerprint, Json, ShapeInfo};

use crate::prompt_assembly::{self, PromptInputs};
use crate::shape_extractor;
use crate::{PipelineDeps, RequestInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseMode {
    LlmTokens,
    CompleteObjects,
    ArrayItems,
}

impl SseMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "LlmTokens" => Some(SseMode::LlmTokens),
            "CompleteObjects" => Some(SseMode::CompleteObjects),
            "ArrayItems" => Some(SseMode::ArrayItems),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamingInput {
    pub request: RequestInput,
    pub mode: SseMode,
    pub continuous: bool,
}

/// One SSE frame: an optional `event:` name plus a JSON `data` payload.
/// Per spec.md §6 ("No `event:` field unless noted"), only the `LlmTokens`
/// token frames (`token`) and continuous mode's per-batch marker (`info`)
/// carry a name; everything else is a bare `data: ...` frame. The HTTP
/// layer formats this as `[event: <name>\n]data: <json>\n\n`.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: Option<&'static str>,
    pub data: serde_json::Value,
}

/// Drives the streaming pipeline, writing frames to `tx` until the
/// upstream completes, `max_duration` elapses (continuous mode only), or
/// the receiver disconnects.
pub async fn handle(deps: PipelineDeps, input: StreamingInput, tx: mpsc::Sender<SseEvent>) {
    if input.continuous {
        run_continuous(deps, input, tx).await;
        return;
    }
    run_once(&deps, &input.request, input.mode, &tx, None).await;
}

async fn run_continuous(deps: PipelineDeps, input: StreamingInput, tx: mpsc::Sender<SseEvent>) {
    let interval = Duration::from_millis(deps.streaming_config.continuous_interval_ms);
    let max_duration = deps.streaming_config.continuous_max_duration_secs;
    let started = tokio::time::Instant::now();
    let mut batch: u32 = 0;

    loop {
        if max_duration > 0 && started.elapsed().as_secs() >= max_duration {
            break;
        }

        if tx
            .send(SseEvent { event: Some("info"), data: json!({"batch": batch, "startedAt": started.elapsed().as_millis() as u64}) })
            .await
            .is_err()
        {
            return;
        }

        if !run_once(&deps, &input.request, input.mode, &tx, Some(batch)).await {
            return;
        }

        batch += 1;
        tokio::time::sleep(interval).await;
    }
}

/// Runs one pipeline pass and streams its result. Returns `false` if the
/// receiver disconnected mid-stream (the caller should stop looping).
async fn run_once(deps: &PipelineDeps, request: &RequestInput, mode: SseMode, tx: &mpsc::Sender<SseEvent>, batch: Option<u32>) -> bool {
    let shape_info =
        shape_extractor::extract_shape(&request.query, request.header_shape.as_deref(), &request.body, deps.cache_config.max_cache_per_key);

    if let Some(error_config) = &shape_info.error_config {
        let data = json!({"error": "SimulatedError", "status": error_config.status, "message": error_config.message, "batch": batch});
        return tx.send(SseEvent { event: None, data }).await.is_ok();
    }

    let body_json = shape_extractor::body_to_json(&request.body);
    let fingerprint = Fingerprint::compute(&request.method, &request.path, shape_info.shape.as_deref());

    let context_block = match &request.context_name {
        Some(name) => deps.context.format_for_prompt(name).await,
        None => None,
    };

    match mode {
        SseMode::LlmTokens => stream_tokens(deps, request, &shape_info, &body_json, context_block.as_deref(), &fingerprint, tx, batch).await,
        SseMode::CompleteObjects | SseMode::ArrayItems => {
            stream_complete(deps, request, &shape_info, &body_json, context_block.as_deref(), mode, tx, batch).await
        }
    }
}

async fn stream_tokens(
    deps: &PipelineDeps,
    request: &RequestInput,
    shape_info: &ShapeInfo,
    body_json: &Json,
    context_block: Option<&str>,
    fingerprint: &Fingerprint,
    tx: &mpsc::Sender<SseEvent>,
    batch: Option<u32>,
) -> bool {
    let entry = match deps.backends.select(request.backend_pin.as_deref()) {
        Ok(entry) => entry,
        Err(err) => return emit_stream_error(tx, &err.to_string(), batch).await,
    };

    let prompt = prompt_assembly::assemble(
        PromptInputs {
            method: &request.method,
            path: &request.path,
            body: body_json,
            shape_info,
            context_block: context_block.map(str::to_string),
            journey_block: resolve_journey_block(deps, request),
            continuation_index: None,
        },
        deps.sanitizer_config.max_len,
    );

    let (token_tx, mut token_rx) = mpsc::channel::<String>(32);
    let opts = mockllm_llm::CompleteOptions::default();
    let name = entry.client.name().to_string();
    let delay_range = (deps.streaming_config.chunk_delay_min_ms, deps.streaming_config.chunk_delay_max_ms);

    // Driven with `tokio::join!` rather than `tokio::spawn`: `entry`
    // borrows from the pool behind `deps`, so the producer can't be
    // handed off to a 'static task. Joining keeps both sides running on
    // this task — the drain loop must keep pulling even after the client
    // disconnects, or a full channel would leave the backend's `send`
    // blocked forever waiting for a receiver that stopped reading.
    let mut accumulated = String::new();
    let mut disconnected = false;
    let drain = async {
        while let Some(chunk) = token_rx.recv().await {
            if disconnected {
                continue;
            }
            accumulated.push_str(&chunk);
            let data = json!({"chunk": chunk, "accumulated": accumulated, "done": false, "batch": batch});
            if tx.send(SseEvent { event: Some("token"), data }).await.is_err() {
                disconnected = true;
            } else {
                sleep_between_emissions(delay_range).await;
            }
        }
    };

    let started = std::time::Instant::now();
    let (outcome, ()) = tokio::join!(entry.client.complete_stream(&prompt, &opts, token_tx), drain);

    if disconnected {
        return false;
    }

    if let Err(err) = outcome {
        tracing::warn!(backend = %name, error = %err, "token stream ended with an error");
        return emit_stream_error(tx, &err.to_string(), batch).await;
    }

    deps.stats.record(fingerprint, started.elapsed().as_millis() as u64);
    let data = json!({"chunk": "", "accumulated": accumulated, "done": true, "batch": batch});
    tx.send(SseEvent { event: Some("token"), data }).await.is_ok()
}

async fn stream_complete(
    deps: &PipelineDeps,
    request: &RequestInput,
    shape_info: &ShapeInfo,
    body_json: &Json,
    context_block: Option<&str>,
    mode: SseMode,
    tx: &mpsc::Sender<SseEvent>,
    batch: Option<u32>,
) -> bool {
    let entry = match deps.backends.select(request.backend_pin.as_deref()) {
        Ok(entry) => entry,
        Err(err) => return emit_stream_error(tx, &err.to_string(), batch).await,
    };

    let prompt = prompt_assembly::assemble(
        PromptInputs {
            method: &request.method,
            path: &request.path,
            body: body_json,
            shape_info,
            context_block: context_block.map(str::to_string),
            journey_block: resolve_journey_block(deps, request),
            continuation_index: None,
        },
        deps.sanitizer_config.max_len,
    );

    let text = match entry.client.complete(&prompt, &mockllm_llm::CompleteOptions::default()).await {
        Ok(text) => text,
        Err(err) => return emit_stream_error(tx, &err.to_string(), batch).await,
    };

    let parsed = match Json::parse(&text) {
        Ok(value) => value,
        Err(_) => return emit_stream_error(tx, "upstream response was not valid JSON", batch).await,
    };

    let delay_range = (deps.streaming_config.chunk_delay_min_ms, deps.streaming_config.chunk_delay_max_ms);

    let (array_name, items) = match &parsed {
        Json::Arr(items) => (None, items.clone()),
        Json::Obj(fields) => match fields.iter().find(|(_, v)| matches!(v, Json::Arr(_))) {
            Some((name, Json::Arr(items))) => (Some(name.clone()), items.clone()),
            _ => (None, vec![parsed.clone()]),
        },
        other => (None, vec![other.clone()]),
    };

    let total = items.len();
    for (index, item) in items.into_iter().enumerate() {
        let has_more = index + 1 < total;
        let mut data = json!({
            "data": item.to_value(),
            "index": index,
            "total": total,
            "done": !has_more,
            "batch": batch,
        });
        if mode == SseMode::ArrayItems {
            if let Some(obj) = data.as_object_mut() {
                obj.insert("arrayName".to_string(), json!(array_name));
                obj.insert("hasMore".to_string(), json!(has_more));
            }
        }
        if tx.send(SseEvent { event: None, data }).await.is_err() {
            return false;
        }
        sleep_between_emissions(delay_range).await;
    }

    true
}

/// Resolves the `?journeySession=` pin (if any) into prompt text, mirroring
/// `handlers::regular::resolve_journey_block`.
fn resolve_journey_block(deps: &PipelineDeps, request: &RequestInput) -> Option<String> {
    let session_id = request.journey_session.as_deref()?;
    deps.journeys.get_session(session_id).and_then(|instance| instance.prompt_block())
}

async fn emit_stream_error(tx: &mpsc::Sender<SseEvent>, message: &str, batch: Option<u32>) -> bool {
    tx.send(SseEvent { event: None, data: json!({"message": message, "batch": batch}) }).await.is_ok()
}

async fn sleep_between_emissions((min_ms, max_ms): (u64, u64)) {
    if max_ms == 0 {
        return;
    }
    let (min_ms, max_ms) = if min_ms <= max_ms { (min_ms, max_ms) } else { (max_ms, min_ms) };
    let delay_ms = if min_ms == max_ms { min_ms } else { rand::thread_rng().gen_range(min_ms..=max_ms) };
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_sse_modes() {
        assert_eq!(SseMode::parse("LlmTokens"), Some(SseMode::LlmTokens));
        assert_eq!(SseMode::parse("ArrayItems"), Some(SseMode::ArrayItems));
        assert_eq!(SseMode::parse("bogus"), None);
    }
}
