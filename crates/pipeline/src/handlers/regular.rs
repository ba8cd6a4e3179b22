//! The regular (non-streaming) request handler (spec.md §4.9): `Idle ->
//! Delaying -> CacheLookup -> {Hit | Producing(LLM) | Erroring} ->
//! Delivering -> Done`.

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use rand::Rng;

use mockllm_core::traits::ProduceFn;
use mockllm_core::{ApiError, ErrorConfig, Fingerprint, Json, ShapeInfo};
use mockllm_llm::pool::PoolEntry;
use mockllm_llm::{CompleteOptions, LlmError, PoolError, ProviderError};
use mockllm_ratelimit::compute_delay;

use crate::chunking;
use crate::prompt_assembly::{self, PromptInputs};
use crate::shape_extractor::{self, RawBody};
use crate::{PipelineDeps, RegularOutcome, RequestInput};

pub async fn handle(deps: PipelineDeps, input: RequestInput) -> RegularOutcome {
    pre_delay(&deps).await;

    let shape_info =
        shape_extractor::extract_shape(&input.query, input.header_shape.as_deref(), &input.body, deps.cache_config.max_cache_per_key);

    if let Some(error_config) = shape_info.error_config.clone() {
        return simulated_error_outcome(error_config);
    }

    let body_json = shape_extractor::body_to_json(&input.body);
    let fingerprint = Fingerprint::compute(&input.method, &input.path, shape_info.shape.as_deref());

    let tool_output = match run_tool_if_requested(&deps, &input).await {
        Ok(output) => output,
        Err(err) => return error_outcome(err),
    };
    let merged_body = merge_tool_output(&body_json, &tool_output);

    let context_block = match &input.context_name {
        Some(name) => deps.context.format_for_prompt(name).await,
        None => None,
    };

    let produce = build_produce_fn(deps.clone(), input.clone(), shape_info.clone(), merged_body.clone(), context_block, fingerprint.clone());

    let capacity = if shape_info.cache_count > 0 { shape_info.cache_count } else { 1 }.min(deps.cache_config.max_cache_per_key).max(1);

    let raw = match deps.cache.acquire(&fingerprint, capacity, produce).await {
        Ok(text) => text,
        Err(err) => return error_outcome(err),
    };

    let parsed = match Json::parse(&raw) {
        Ok(value) => value,
        Err(_) => {
            return RegularOutcome { status: 502, body: diagnostic_body("upstream response was not valid JSON after retries"), avg_time_ms: None }
        }
    };

    if let Some(name) = &input.context_name {
        deps.context.record(name, &input.method, &input.path, &merged_body.to_string(), &raw).await;
    }

    let avg = deps.stats.avg(&fingerprint);
    if deps.rate_limit_config.enabled {
        let delay = compute_delay(&deps.rate_limit_config.delay_range, avg);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    let body = if input.include_schema { wrap_with_schema(parsed, &shape_info) } else { parsed };

    RegularOutcome { status: 200, body, avg_time_ms: deps.cache_config.stats_enabled.then_some(avg) }
}

/// Entry point for the push-channel engine (spec.md §4.12): runs the same
/// generate-and-validate-and-regenerate flow a regular request does, but
/// skips the variant cache entirely so every tick is freshly synthesized
/// ("bypassing the variant cache for freshness"). Takes the channel's
/// payload spec fields directly rather than a `mockllm_channels` type, so
/// this crate doesn't need that dependency.
pub async fn produce_for_channel(deps: PipelineDeps, method: &str, path: &str, body: &str, shape: Option<&str>) -> Result<String, ApiError> {
    let raw_body = if body.is_empty() { RawBody::Empty } else { RawBody::Json(body.to_string()) };
    let shape_info = shape_extractor::extract_shape(&[], shape, &raw_body, deps.cache_config.max_cache_per_key);

    if let Some(cfg) = &shape_info.error_config {
        return Err(ApiError::SimulatedError {
            status: cfg.status,
            message: cfg.message.clone().unwrap_or_else(|| "simulated error".to_string()),
            details: cfg.details.clone(),
        });
    }

    let merged_body = shape_extractor::body_to_json(&raw_body);
    let fingerprint = Fingerprint::compute(method, path, shape_info.shape.as_deref());
    let input = RequestInput {
        method: method.to_string(),
        path: path.to_string(),
        query: Vec::new(),
        header_shape: shape.map(str::to_string),
        body: raw_body,
        context_name: None,
        backend_pin: None,
        tool_name: None,
        tool_arguments: None,
        journey_session: None,
        include_schema: false,
        auto_chunk: true,
    };

    produce_once(deps, input, shape_info, merged_body, None, fingerprint).await
}

async fn pre_delay(deps: &PipelineDeps) {
    let (min_ms, max_ms) = (deps.request_delay_min_ms, deps.request_delay_max_ms);
    if max_ms == 0 {
        return;
    }
    let (min_ms, max_ms) = if min_ms <= max_ms { (min_ms, max_ms) } else { (max_ms, min_ms) };
    let delay_ms = if min_ms == max_ms { min_ms } else { rand::thread_rng().gen_range(min_ms..=max_ms) };
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}

async fn run_tool_if_requested(deps: &PipelineDeps, input: &RequestInput) -> Result<Option<Json>, ApiError> {
    let Some(name) = &input.tool_name else {
        return Ok(None);
    };
    let arguments = input.tool_arguments.clone().unwrap_or(serde_json::Value::Null);
    let output = deps.tools.execute(name, arguments).await?;
    Ok(Some(Json::from_value(&output.content)))
}

fn merge_tool_output(body: &Json, tool_output: &Option<Json>) -> Json {
    match (body, tool_output) {
        (_, None) => body.clone(),
        (Json::Obj(fields), Some(tool)) => {
            let mut merged = fields.clone();
            merged.push(("toolResult".to_string(), tool.clone()));
            Json::Obj(merged)
        }
        (other, Some(tool)) => Json::Obj(vec![("body".to_string(), other.clone()), ("toolResult".to_string(), tool.clone())]),
    }
}

fn build_produce_fn(
    deps: PipelineDeps,
    input: RequestInput,
    shape_info: ShapeInfo,
    merged_body: Json,
    context_block: Option<String>,
    fingerprint: Fingerprint,
) -> ProduceFn {
    std::sync::Arc::new(move || {
        let deps = deps.clone();
        let input = input.clone();
        let shape_info = shape_info.clone();
        let merged_body = merged_body.clone();
        let context_block = context_block.clone();
        let fingerprint = fingerprint.clone();
        Box::pin(async move { produce_once(deps, input, shape_info, merged_body, context_block, fingerprint).await }) as BoxFuture<'static, Result<String, ApiError>>
    })
}

/// Builds the prompt (possibly split into chunks), calls the selected
/// backend, and regenerates up to `MaxRetryAttempts` times if the result
/// isn't valid JSON (spec.md §4.9 step 4).
async fn produce_once(
    deps: PipelineDeps,
    input: RequestInput,
    shape_info: ShapeInfo,
    merged_body: Json,
    context_block: Option<String>,
    fingerprint: Fingerprint,
) -> Result<String, ApiError> {
    let max_attempts = deps.resilience_config.max_retry_attempts + 1;
    let mut last_err: Option<ApiError> = None;

    for _attempt in 0..max_attempts {
        let entry = deps.backends.select(input.backend_pin.as_deref()).map_err(pool_err)?;

        let started = Instant::now();
        let result = generate(&deps, &input, &shape_info, &merged_body, context_block.as_deref(), entry).await;

        match result {
            Ok(text) => {
                if Json::parse(&text).is_ok() {
                    deps.stats.record(&fingerprint, started.elapsed().as_millis() as u64);
                    return Ok(text);
                }
                last_err = Some(ApiError::UpstreamInvalidOutput("LLM response was not valid JSON".to_string()));
            }
            Err(err) => last_err = Some(err),
        }
    }

    Err(last_err.unwrap_or_else(|| ApiError::InternalError("exhausted regeneration attempts".to_string())))
}

async fn generate(
    deps: &PipelineDeps,
    input: &RequestInput,
    shape_info: &ShapeInfo,
    merged_body: &Json,
    context_block: Option<&str>,
    entry: &PoolEntry,
) -> Result<String, ApiError> {
    let requested = chunking::requested_count(&input.query, shape_info);
    let per_item_tokens = chunking::est_tokens_per_item(shape_info);
    let journey_block = resolve_journey_block(deps, input);

    let base_prompt = prompt_assembly::assemble(
        PromptInputs {
            method: &input.method,
            path: &input.path,
            body: merged_body,
            shape_info,
            context_block: context_block.map(str::to_string),
            journey_block: journey_block.clone(),
            continuation_index: None,
        },
        deps.sanitizer_config.max_len,
    );

    let prompt_tokens = mockllm_llm::chunker::estimate_tokens(&base_prompt);
    let budget = (entry.client.max_context_window() as f64 * deps.chunking_config.context_window_fraction) as u32;
    let budget_tokens = budget.saturating_sub(prompt_tokens);

    let chunk_count = if deps.chunking_config.enabled && input.auto_chunk {
        mockllm_llm::chunker::plan_chunk_count(requested, per_item_tokens, budget_tokens)
    } else {
        1
    };

    if chunk_count <= 1 {
        complete_once(entry, &base_prompt).await
    } else {
        run_chunked(entry, input, shape_info, merged_body, context_block, journey_block, chunk_count, requested, deps.sanitizer_config.max_len).await
    }
}

/// Resolves the `?journeySession=` pin (if any) against the live session
/// store into prompt text (spec.md §4.4 "journey-step description").
/// Missing/unknown sessions fall back to no journey influence rather than
/// failing the request — journeys are an additive bias, not a
/// requirement.
fn resolve_journey_block(deps: &PipelineDeps, input: &RequestInput) -> Option<String> {
    let session_id = input.journey_session.as_deref()?;
    deps.journeys.get_session(session_id).and_then(|instance| instance.prompt_block())
}

async fn complete_once(entry: &PoolEntry, prompt: &str) -> Result<String, ApiError> {
    entry.client.complete(prompt, &CompleteOptions::default()).await.map_err(provider_err)
}

#[allow(clippy::too_many_arguments)]
async fn run_chunked(
    entry: &PoolEntry,
    input: &RequestInput,
    shape_info: &ShapeInfo,
    merged_body: &Json,
    context_block: Option<&str>,
    journey_block: Option<String>,
    chunk_count: usize,
    requested: usize,
    max_len: usize,
) -> Result<String, ApiError> {
    let ranges = mockllm_llm::chunker::chunk_ranges(requested, chunk_count);
    let mut parsed_chunks: Vec<Json> = Vec::with_capacity(ranges.len());

    for (idx, (start, count)) in ranges.iter().enumerate() {
        let continuation = if parsed_chunks.is_empty() {
            format!("Generate items {}..{} of {} total.", start, start + count, requested)
        } else {
            format!(
                "Generate items {}..{} of {} total. {}",
                start,
                start + count,
                requested,
                mockllm_llm::chunker::summarize_prior_chunks(&parsed_chunks)
            )
        };
        let journey_block = match &journey_block {
            Some(j) => Some(format!("{continuation} {j}")),
            None => Some(continuation),
        };

        let prompt = prompt_assembly::assemble(
            PromptInputs {
                method: &input.method,
                path: &input.path,
                body: merged_body,
                shape_info,
                context_block: context_block.map(str::to_string),
                journey_block,
                continuation_index: Some(idx as u32),
            },
            max_len,
        );

        let text = complete_once(entry, &prompt).await?;
        let parsed = Json::parse(&text).map_err(|_| ApiError::UpstreamInvalidOutput("chunk response was not valid JSON".to_string()))?;
        parsed_chunks.push(parsed);
    }

    Ok(mockllm_llm::chunker::merge_chunks(parsed_chunks).to_string())
}

fn provider_err(err: ProviderError) -> ApiError {
    LlmError::from(err).into()
}

fn pool_err(err: PoolError) -> ApiError {
    LlmError::from(err).into()
}

fn wrap_with_schema(parsed: Json, shape_info: &ShapeInfo) -> Json {
    match shape_info.shape.as_deref().and_then(|s| Json::parse(s).ok()) {
        Some(shape_json) => Json::Obj(vec![("data".to_string(), parsed), ("schema".to_string(), shape_json)]),
        None => parsed,
    }
}

fn simulated_error_outcome(cfg: ErrorConfig) -> RegularOutcome {
    let mut fields = vec![
        ("error".to_string(), Json::Str("SimulatedError".to_string())),
        ("message".to_string(), Json::Str(cfg.message.clone().unwrap_or_else(|| "simulated error".to_string()))),
    ];
    if let Some(details) = &cfg.details {
        fields.push(("details".to_string(), Json::from_value(details)));
    }
    RegularOutcome { status: cfg.status, body: Json::Obj(fields), avg_time_ms: None }
}

fn error_outcome(err: ApiError) -> RegularOutcome {
    RegularOutcome { status: err.status_code(), body: error_body(&err), avg_time_ms: None }
}

fn error_body(err: &ApiError) -> Json {
    Json::Obj(vec![("error".to_string(), Json::Str(err.kind().to_string())), ("message".to_string(), Json::Str(err.redacted_message()))])
}

fn diagnostic_body(msg: &str) -> Json {
    Json::Obj(vec![("error".to_string(), Json::Str("UpstreamInvalidOutput".to_string())), ("message".to_string(), Json::Str(msg.to_string()))])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_tool_output_appends_to_object_body() {
        let body = Json::Obj(vec![("a".to_string(), Json::Num(1.0))]);
        let tool = Some(Json::Obj(vec![("ok".to_string(), Json::Bool(true))]));
        let merged = merge_tool_output(&body, &tool);
        assert!(merged.get("toolResult").is_some());
        assert!(merged.get("a").is_some());
    }

    #[test]
    fn merge_tool_output_wraps_non_object_body() {
        let body = Json::Str("hello".to_string());
        let tool = Some(Json::Bool(true));
        let merged = merge_tool_output(&body, &tool);
        assert!(merged.get("body").is_some());
        assert!(merged.get("toolResult").is_some());
    }

    #[test]
    fn merge_tool_output_is_noop_without_a_tool_call() {
        let body = Json::Obj(vec![("a".to_string(), Json::Num(1.0))]);
        let merged = merge_tool_output(&body, &None);
        assert_eq!(merged, body);
    }

    #[test]
    fn wrap_with_schema_envelopes_when_shape_present() {
        let shape_info = ShapeInfo::parse(r#"{"id":0}"#, 50);
        let wrapped = wrap_with_schema(Json::Obj(vec![("id".to_string(), Json::Num(1.0))]), &shape_info);
        assert!(wrapped.get("data").is_some());
        assert!(wrapped.get("schema").is_some());
    }

    #[test]
    fn wrap_with_schema_passes_through_without_a_shape() {
        let shape_info = ShapeInfo::none();
        let parsed = Json::Obj(vec![("id".to_string(), Json::Num(1.0))]);
        let wrapped = wrap_with_schema(parsed.clone(), &shape_info);
        assert_eq!(wrapped, parsed);
    }

    #[test]
    fn simulated_error_outcome_carries_status_and_message() {
        let cfg = ErrorConfig { status: 503, message: Some("down for maintenance".to_string()), details: None };
        let outcome = simulated_error_outcome(cfg);
        assert_eq!(outcome.status, 503);
        assert!(matches!(outcome.body.get("message"), Some(Json::Str(s)) if s == "down for maintenance"));
    }
}
