//! The public synthesis surface (spec.md §6): `{prefix}/**` for regular
//! requests (with N-fanout per §4.11), `{prefix}/stream/**` for SSE, and
//! `{prefix}/graphql`. CORS and the ingress rate limiter wrap this router;
//! the auth-gated management surface lives in [`crate::management`].

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Multipart, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Response, Sse};
use axum::routing::{any, get, post};
use axum::Router;
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use mockllm_core::{ApiError, Json};
use mockllm_pipeline::fanout::{run_parallel, run_sequential, run_streaming, BoxFuture, IndexedProduceFn};
use mockllm_pipeline::handlers::{regular, streaming};
use mockllm_pipeline::handlers::streaming::{SseEvent, SseMode, StreamingInput};
use mockllm_pipeline::shape_extractor::{self, RawBody};
use mockllm_ratelimit::{compute_delay, resolve_strategy, FanoutStrategy};

use crate::auth::auth_middleware;
use crate::ingress::ingress_rate_limit;
use crate::knobs;
use crate::response::ApiErrorResponse;
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.config.server.cors_origins, state.config.server.cors_enabled);
    let prefix = state.config.server.prefix.clone();
    let management_prefix = state.config.server.management_prefix.clone();

    let synth_router = Router::new()
        .route(&format!("{prefix}/graphql"), post(graphql_handler))
        .route(&format!("{prefix}/stream/*rest"), any(stream_handler))
        .route(&format!("{prefix}/*rest"), any(synth_handler))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), ingress_rate_limit))
        .with_state(state.clone());

    let management_router = crate::management::router(&management_prefix)
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state.clone());

    Router::new()
        .merge(synth_router)
        .merge(management_router)
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health_check() -> impl IntoResponse {
    axum::Json(serde_json::json!({"status": "ok"}))
}

/// Builds the CORS layer (spec.md §6): wildcard origins never get
/// credentials — the combination is forbidden by the CORS spec itself.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        if origins.iter().any(|o| o == "*") && origins.len() > 1 {
            tracing::warn!("CORS origins combine \"*\" with explicit entries; \"*\" wins and credentials stay disabled");
        }
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin = %origin, "invalid CORS origin, dropping");
                None
            })
        })
        .collect();

    if parsed.is_empty() {
        tracing::error!("all configured CORS origins were invalid, falling back to wildcard without credentials");
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(true)
}

async fn read_raw_body(request: Request, max_size: usize) -> Result<(String, RawBody), Response> {
    let content_type = request.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or("").to_string();

    if content_type.starts_with("multipart/form-data") {
        let body = drain_multipart(request, max_size).await?;
        return Ok((content_type, body));
    }

    let bytes = axum::body::to_bytes(request.into_body(), max_size)
        .await
        .map_err(|_| ApiErrorResponse(ApiError::PayloadTooLarge).into_response())?;
    let text = String::from_utf8_lossy(&bytes).into_owned();

    let body = if text.is_empty() {
        RawBody::Empty
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        RawBody::UrlEncoded(text)
    } else {
        RawBody::Json(text)
    };
    Ok((content_type, body))
}

/// Drains a multipart body into bounded-memory metadata (spec.md §4.2):
/// `{fieldName: value, files: [{filename,size,contentType}]}`, with file
/// parts streamed chunk-by-chunk rather than buffered whole.
async fn drain_multipart(request: Request, max_size: usize) -> Result<RawBody, Response> {
    let bad_request = || ApiErrorResponse(ApiError::BadRequest("invalid multipart body".to_string())).into_response();

    let mut multipart = Multipart::from_request(request, &()).await.map_err(|_| bad_request())?;
    let mut fields: Vec<(String, Json)> = Vec::new();
    let mut files: Vec<Json> = Vec::new();
    let mut total: usize = 0;

    while let Some(mut field) = multipart.next_field().await.map_err(|_| bad_request())? {
        let name = field.name().unwrap_or("field").to_string();

        if let Some(filename) = field.file_name().map(str::to_string) {
            let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
            let mut size: usize = 0;
            while let Some(chunk) = field.chunk().await.map_err(|_| bad_request())? {
                size += chunk.len();
                total += chunk.len();
                if total > max_size {
                    return Err(ApiErrorResponse(ApiError::PayloadTooLarge).into_response());
                }
            }
            files.push(Json::Obj(vec![
                ("filename".to_string(), Json::Str(filename)),
                ("size".to_string(), Json::Num(size as f64)),
                ("contentType".to_string(), Json::Str(content_type)),
            ]));
        } else {
            let text = field.text().await.unwrap_or_default();
            total += text.len();
            if total > max_size {
                return Err(ApiErrorResponse(ApiError::PayloadTooLarge).into_response());
            }
            fields.push((name, Json::Str(text)));
        }
    }

    if !files.is_empty() {
        fields.push(("files".to_string(), Json::Arr(files)));
    }
    Ok(RawBody::Json(Json::Obj(fields).to_string()))
}

async fn synth_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let query_raw = request.uri().query().map(str::to_string);
    let headers = request.headers().clone();
    let max_size = state.config.server.max_request_size_bytes;

    let raw_body = match read_raw_body(request, max_size).await {
        Ok((_, body)) => body,
        Err(resp) => return resp,
    };

    let query = knobs::parse_query(query_raw.as_deref());
    let n = knobs::fanout_count(&query);
    let input = knobs::build_request_input(&method, &path, query.clone(), &headers, raw_body);

    if n <= 1 {
        let outcome = regular::handle(state.pipeline.clone(), input).await;
        return render_regular(outcome);
    }

    let requested_strategy = knobs::strategy_override(&query, &headers);
    let strategy = resolve_strategy(requested_strategy, n);
    let delay = knobs::rate_limit_override(&query, &headers)
        .map(|range| compute_delay(&range, 0))
        .unwrap_or_else(|| compute_delay(&state.pipeline.rate_limit_config.delay_range, 0));

    let produce = build_fanout_produce(&state, &input);

    match strategy {
        FanoutStrategy::Sequential => render_fanout_json(run_sequential(n, delay, produce).await),
        FanoutStrategy::Parallel => render_fanout_json(run_parallel(n, delay, produce).await),
        FanoutStrategy::Streaming => render_fanout_sse(n, delay, produce).await,
    }
}

/// Builds an [`IndexedProduceFn`] that regenerates one independent variant
/// per call, reusing the channel engine's cache-bypassing produce path
/// (spec.md §4.11's fanout calls are independent LLM draws, same as a
/// push channel's tick).
fn build_fanout_produce(state: &Arc<AppState>, input: &mockllm_pipeline::RequestInput) -> IndexedProduceFn {
    let shape_info =
        shape_extractor::extract_shape(&input.query, input.header_shape.as_deref(), &input.body, state.pipeline.cache_config.max_cache_per_key);
    let shape_text = shape_info.shape;
    let body_text = shape_extractor::body_to_json(&input.body).to_string();
    let method = input.method.clone();
    let path = input.path.clone();
    let deps = state.pipeline.clone();

    std::sync::Arc::new(move |_index: usize| {
        let deps = deps.clone();
        let method = method.clone();
        let path = path.clone();
        let body_text = body_text.clone();
        let shape_text = shape_text.clone();
        Box::pin(async move { regular::produce_for_channel(deps, &method, &path, &body_text, shape_text.as_deref()).await })
            as BoxFuture<'static, Result<String, ApiError>>
    })
}

fn render_regular(outcome: mockllm_pipeline::RegularOutcome) -> Response {
    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, [(header::CONTENT_TYPE, "application/json")], outcome.body.to_string()).into_response();
    if let Some(avg) = outcome.avg_time_ms {
        if let Ok(value) = HeaderValue::from_str(&avg.to_string()) {
            response.headers_mut().insert("x-llmapi-avg-time", value);
        }
    }
    response
}

fn render_fanout_json(results: Vec<Result<String, ApiError>>) -> Response {
    let items: Vec<Json> = results
        .into_iter()
        .enumerate()
        .map(|(index, result)| match result {
            Ok(text) => Json::parse(&text).unwrap_or(Json::Str(text)),
            Err(err) => Json::Obj(vec![
                ("index".to_string(), Json::Num(index as f64)),
                ("error".to_string(), Json::Str(err.kind().to_string())),
                ("message".to_string(), Json::Str(err.redacted_message())),
            ]),
        })
        .collect();
    let body = Json::Obj(vec![("results".to_string(), Json::Arr(items))]);
    (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], body.to_string()).into_response()
}

async fn render_fanout_sse(n: usize, delay: Duration, produce: IndexedProduceFn) -> Response {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(run_streaming(n, delay, produce, tx));

    let stream = ReceiverStream::new(rx).map(|(index, result)| {
        let data = match result {
            Ok(text) => {
                let parsed = Json::parse(&text).unwrap_or(Json::Str(text));
                serde_json::json!({"index": index, "data": parsed.to_value(), "done": false})
            }
            Err(err) => serde_json::json!({"index": index, "error": err.kind(), "message": err.redacted_message()}),
        };
        Ok::<_, std::convert::Infallible>(Event::default().data(data.to_string()))
    });

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

async fn stream_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let query_raw = request.uri().query().map(str::to_string);
    let headers = request.headers().clone();
    let max_size = state.config.server.max_request_size_bytes;

    let raw_body = match read_raw_body(request, max_size).await {
        Ok((_, body)) => body,
        Err(resp) => return resp,
    };

    let query = knobs::parse_query(query_raw.as_deref());
    let mode = query
        .iter()
        .find(|(k, _)| k == "sseMode")
        .and_then(|(_, v)| SseMode::parse(v))
        .unwrap_or(SseMode::CompleteObjects);
    let continuous = knobs::bool_knob(&query, "continuous", false);
    let input = knobs::build_request_input(&method, &path, query, &headers, raw_body);

    let (tx, rx) = mpsc::channel::<SseEvent>(64);
    tokio::spawn(streaming::handle(state.pipeline.clone(), StreamingInput { request: input, mode, continuous }, tx));

    let stream = ReceiverStream::new(rx).map(|event| {
        let mut sse_event = Event::default().data(event.data.to_string());
        if let Some(name) = event.event {
            sse_event = sse_event.event(name);
        }
        Ok::<_, std::convert::Infallible>(sse_event)
    });

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

/// `POST {prefix}/graphql` (spec.md §6): treats the body's `query` field as
/// the shape hint and `variables` as the request body, then envelopes the
/// result as `{"data":…}` or `{"errors":[…]}`.
async fn graphql_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let query_raw = request.uri().query().map(str::to_string);
    let headers = request.headers().clone();
    let max_size = state.config.server.max_request_size_bytes;

    let bytes = match axum::body::to_bytes(request.into_body(), max_size).await {
        Ok(b) => b,
        Err(_) => return ApiErrorResponse(ApiError::PayloadTooLarge).into_response(),
    };
    let graphql_body = parse_graphql_body(&bytes);

    let query = knobs::parse_query(query_raw.as_deref());
    let raw_body = RawBody::Json(graphql_body.variables);
    let mut input = knobs::build_request_input("POST", &path, query, &headers, raw_body);
    if input.header_shape.is_none() {
        input.header_shape = graphql_body.shape;
    }

    let outcome = regular::handle(state.pipeline.clone(), input).await;
    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::OK);
    let body = if outcome.status >= 400 {
        Json::Obj(vec![("errors".to_string(), Json::Arr(vec![outcome.body]))])
    } else {
        Json::Obj(vec![("data".to_string(), outcome.body)])
    };
    (status, [(header::CONTENT_TYPE, "application/json")], body.to_string()).into_response()
}

struct GraphQlBody {
    shape: Option<String>,
    variables: String,
}

fn parse_graphql_body(bytes: &Bytes) -> GraphQlBody {
    let text = String::from_utf8_lossy(bytes);
    let parsed = Json::parse(&text).unwrap_or(Json::Null);
    let shape = parsed.get("query").and_then(Json::as_str).map(str::to_string);
    let variables = parsed.get("variables").map(|v| v.to_string()).unwrap_or_else(|| "{}".to_string());
    GraphQlBody { shape, variables }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_origin_never_gets_credentials() {
        let layer = build_cors_layer(&["*".to_string()], true);
        let _ = layer;
    }

    #[test]
    fn disabled_cors_is_permissive() {
        let layer = build_cors_layer(&[], false);
        let _ = layer;
    }
}
