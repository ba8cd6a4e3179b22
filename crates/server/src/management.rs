//! The auth-gated management surface (spec.md §6): API contexts, OpenAPI
//! spec / gRPC proto blobs, push channels, and journeys.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json as AxumJson, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use mockllm_channels::PayloadSpec;
use mockllm_core::traits::ContextStore;
use mockllm_core::ApiError;
use mockllm_pipeline::journey::{JourneyStep, JourneyTemplate};

use crate::response::ApiErrorResponse;
use crate::state::AppState;

pub fn router(prefix: &str) -> Router<Arc<AppState>> {
    Router::new()
        .route(&format!("{prefix}/contexts"), get(list_contexts).delete(clear_all_contexts))
        .route(&format!("{prefix}/contexts/:name"), get(get_context).delete(clear_context))
        .route(&format!("{prefix}/contexts/:name/calls"), post(add_context_call))
        .route(&format!("{prefix}/contexts/:name/shared"), patch(patch_context_shared))
        .route(&format!("{prefix}/openapi/specs"), get(list_openapi_specs).post(put_openapi_spec_unnamed))
        .route(
            &format!("{prefix}/openapi/specs/:name"),
            get(get_openapi_spec).post(put_openapi_spec).delete(delete_openapi_spec),
        )
        .route(&format!("{prefix}/openapi/specs/:name/reload"), post(reload_openapi_spec))
        .route(&format!("{prefix}/openapi/specs/:name/test"), post(test_openapi_spec))
        .route(&format!("{prefix}/grpc-protos"), get(list_grpc_protos))
        .route(
            &format!("{prefix}/grpc-protos/:name"),
            get(get_grpc_proto).post(put_grpc_proto).delete(delete_grpc_proto),
        )
        .route(&format!("{prefix}/signalr/contexts"), get(list_channels).post(register_channel))
        .route(&format!("{prefix}/signalr/contexts/:name"), delete(unregister_channel))
        .route(&format!("{prefix}/signalr/contexts/:name/start"), post(start_channel))
        .route(&format!("{prefix}/signalr/contexts/:name/stop"), post(stop_channel))
        .route(&format!("{prefix}/signalr/contexts/:name/subscribe"), get(subscribe_channel))
        .route(&format!("{prefix}/journeys/templates"), get(list_journey_templates).post(create_journey_template))
        .route(&format!("{prefix}/journeys/templates/:name"), get(get_journey_template).delete(delete_journey_template))
        .route(&format!("{prefix}/journeys/sessions/:id"), get(get_journey_session))
        .route(&format!("{prefix}/journeys/sessions/:id/start"), post(start_journey_session))
        .route(&format!("{prefix}/journeys/sessions/:id/advance"), post(advance_journey_session))
        .route(&format!("{prefix}/journeys/sessions/:id/end"), post(end_journey_session))
}

fn not_found(message: impl Into<String>) -> Response {
    ApiErrorResponse(ApiError::BadRequest(message.into())).into_response()
}

// ---- Contexts ----

async fn list_contexts(State(state): State<Arc<AppState>>) -> AxumJson<Value> {
    AxumJson(json!({"contexts": state.context.list_all().await}))
}

async fn get_context(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.context.snapshot(&name).await {
        Some(snapshot) => AxumJson(snapshot).into_response(),
        None => not_found(format!("context \"{name}\" not found")),
    }
}

async fn clear_context(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> StatusCode {
    state.context.clear(&name).await;
    StatusCode::NO_CONTENT
}

async fn clear_all_contexts(State(state): State<Arc<AppState>>) -> StatusCode {
    state.context.clear_all().await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct AddContextCallRequest {
    method: String,
    path: String,
    #[serde(default, rename = "requestBody")]
    request_body: String,
    #[serde(default, rename = "responseBody")]
    response_body: String,
}

async fn add_context_call(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    AxumJson(body): AxumJson<AddContextCallRequest>,
) -> StatusCode {
    state.context.record(&name, &body.method, &body.path, &body.request_body, &body.response_body).await;
    StatusCode::NO_CONTENT
}

async fn patch_context_shared(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    AxumJson(pairs): AxumJson<Vec<(String, String)>>,
) -> StatusCode {
    state.context.patch_shared(&name, pairs);
    StatusCode::NO_CONTENT
}

// ---- OpenAPI specs ----

async fn list_openapi_specs(State(state): State<Arc<AppState>>) -> AxumJson<Value> {
    let specs: Vec<Value> = state.openapi_specs.list().into_iter().map(|(name, spec)| json!({"name": name, "spec": spec})).collect();
    AxumJson(json!({"specs": specs}))
}

async fn get_openapi_spec(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.openapi_specs.get(&name) {
        Some(spec) => AxumJson(spec).into_response(),
        None => not_found(format!("openapi spec \"{name}\" not found")),
    }
}

async fn put_openapi_spec(State(state): State<Arc<AppState>>, Path(name): Path<String>, AxumJson(spec): AxumJson<Value>) -> StatusCode {
    state.openapi_specs.put(&name, spec);
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct NamedSpecRequest {
    name: String,
    spec: Value,
}

async fn put_openapi_spec_unnamed(State(state): State<Arc<AppState>>, AxumJson(body): AxumJson<NamedSpecRequest>) -> StatusCode {
    state.openapi_specs.put(&body.name, body.spec);
    StatusCode::CREATED
}

async fn delete_openapi_spec(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> StatusCode {
    if state.openapi_specs.remove(&name) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn reload_openapi_spec(State(state): State<Arc<AppState>>, Path(name): Path<String>, AxumJson(spec): AxumJson<Value>) -> StatusCode {
    state.openapi_specs.put(&name, spec);
    StatusCode::NO_CONTENT
}

async fn test_openapi_spec(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> AxumJson<Value> {
    AxumJson(json!({"valid": state.openapi_specs.get(&name).is_some()}))
}

// ---- gRPC protos ----

async fn list_grpc_protos(State(state): State<Arc<AppState>>) -> AxumJson<Value> {
    let protos: Vec<Value> = state.grpc_protos.list().into_iter().map(|(name, proto)| json!({"name": name, "proto": proto})).collect();
    AxumJson(json!({"protos": protos}))
}

async fn get_grpc_proto(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.grpc_protos.get(&name) {
        Some(proto) => AxumJson(proto).into_response(),
        None => not_found(format!("grpc proto \"{name}\" not found")),
    }
}

async fn put_grpc_proto(State(state): State<Arc<AppState>>, Path(name): Path<String>, AxumJson(proto): AxumJson<Value>) -> StatusCode {
    state.grpc_protos.put(&name, proto);
    StatusCode::NO_CONTENT
}

async fn delete_grpc_proto(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> StatusCode {
    if state.grpc_protos.remove(&name) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

// ---- Push channels ----

#[derive(Debug, Deserialize)]
struct RegisterChannelRequest {
    name: String,
    method: String,
    path: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    shape: Option<String>,
    #[serde(default = "default_interval_ms", rename = "intervalMs")]
    interval_ms: u64,
    #[serde(default, rename = "runWhenIdle")]
    run_when_idle: bool,
}

fn default_interval_ms() -> u64 {
    5_000
}

async fn list_channels(State(state): State<Arc<AppState>>) -> AxumJson<Value> {
    let channels: Vec<Value> = state
        .channels
        .list()
        .into_iter()
        .map(|c| json!({"name": c.name, "state": format!("{:?}", c.state()), "subscribers": c.subscriber_count()}))
        .collect();
    AxumJson(json!({"channels": channels}))
}

async fn register_channel(State(state): State<Arc<AppState>>, AxumJson(body): AxumJson<RegisterChannelRequest>) -> Response {
    let spec = PayloadSpec { method: body.method, path: body.path, body: body.body, shape: body.shape };
    match state.channels.register(&body.name, spec, body.interval_ms, body.run_when_idle) {
        Ok(_) => StatusCode::CREATED.into_response(),
        Err(err) => ApiErrorResponse(ApiError::BadRequest(err.to_string())).into_response(),
    }
}

async fn unregister_channel(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.channels.unregister(&name) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => not_found(err.to_string()),
    }
}

async fn start_channel(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    let Some(channel) = state.channels.get(&name) else {
        return not_found(format!("channel \"{name}\" not found"));
    };
    let deps = state.pipeline.clone();
    let spec = channel.spec.clone();
    let produce: mockllm_core::traits::ProduceFn = std::sync::Arc::new(move || {
        let deps = deps.clone();
        let spec = spec.clone();
        Box::pin(async move {
            mockllm_pipeline::handlers::produce_for_channel(deps, &spec.method, &spec.path, &spec.body, spec.shape.as_deref()).await
        }) as futures::future::BoxFuture<'static, Result<String, ApiError>>
    });
    match state.channels.start(&name, produce) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => not_found(err.to_string()),
    }
}

async fn stop_channel(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.channels.stop(&name) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => not_found(err.to_string()),
    }
}

async fn subscribe_channel(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.channels.subscribe(&name) {
        Ok((id, rx)) => ws.on_upgrade(move |socket| forward_channel_messages(socket, state, name, id, rx)),
        Err(err) => not_found(err.to_string()),
    }
}

async fn forward_channel_messages(
    mut socket: WebSocket,
    state: Arc<AppState>,
    name: String,
    id: uuid::Uuid,
    mut rx: tokio::sync::mpsc::Receiver<String>,
) {
    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(payload) => {
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            }
        }
    }
    state.channels.unsubscribe(&name, &id);
}

// ---- Journeys ----

async fn list_journey_templates(State(state): State<Arc<AppState>>) -> AxumJson<Value> {
    AxumJson(json!({"templates": state.journeys.list_templates()}))
}

async fn get_journey_template(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.journeys.get_template(&name) {
        Some(template) => AxumJson(serde_json::to_value(&*template).unwrap_or(Value::Null)).into_response(),
        None => not_found(format!("journey template \"{name}\" not found")),
    }
}

#[derive(Debug, Deserialize)]
struct CreateJourneyTemplateRequest {
    name: String,
    steps: Vec<JourneyStep>,
}

async fn create_journey_template(State(state): State<Arc<AppState>>, AxumJson(body): AxumJson<CreateJourneyTemplateRequest>) -> StatusCode {
    state.journeys.register_template(JourneyTemplate { name: body.name, steps: body.steps });
    StatusCode::CREATED
}

async fn delete_journey_template(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.journeys.delete_template(&name) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => not_found(err.to_string()),
    }
}

async fn get_journey_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.journeys.get_session(&id) {
        Some(session) => AxumJson(serde_json::to_value(&session).unwrap_or(Value::Null)).into_response(),
        None => not_found(format!("journey session \"{id}\" not found")),
    }
}

#[derive(Debug, Deserialize)]
struct StartJourneySessionRequest {
    template: String,
    #[serde(default)]
    variables: std::collections::BTreeMap<String, String>,
}

async fn start_journey_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AxumJson(body): AxumJson<StartJourneySessionRequest>,
) -> Response {
    match state.journeys.start_session(&id, &body.template, body.variables) {
        Ok(session) => AxumJson(serde_json::to_value(&session).unwrap_or(Value::Null)).into_response(),
        Err(err) => not_found(err.to_string()),
    }
}

async fn advance_journey_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.journeys.advance_session(&id) {
        Ok(session) => AxumJson(serde_json::to_value(&session).unwrap_or(Value::Null)).into_response(),
        Err(err) => not_found(err.to_string()),
    }
}

async fn end_journey_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.journeys.end_session(&id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => not_found(err.to_string()),
    }
}
