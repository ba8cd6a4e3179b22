//! Ingress rate-limiting middleware (spec.md §6): partitions clients by
//! API key / auth header / `X-Forwarded-For` first hop / remote IP, and
//! rejects with 429 plus `Retry-After`/`X-RateLimit-*` headers once the
//! fixed window is exhausted.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::state::AppState;

fn partition_key(request: &Request) -> String {
    let headers = request.headers();
    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        return format!("auth:{auth}");
    }
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            return format!("xff:{}", first.trim());
        }
    }
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return format!("ip:{}", addr.ip());
    }
    "unknown".to_string()
}

pub async fn ingress_rate_limit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let key = partition_key(&request);
    let decision = state.ingress.check(&key);

    if !decision.allowed {
        let body = json!({"error": "TooManyRequests", "message": "Rate limit exceeded"});
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(decision.retry_after_secs));
        if let Ok(v) = HeaderValue::from_str(&decision.limit.to_string()) {
            headers.insert("x-ratelimit-limit", v);
        }
        if let Ok(v) = HeaderValue::from_str(&decision.reset_at_secs.to_string()) {
            headers.insert("x-ratelimit-reset", v);
        }
        return response;
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn prefers_auth_header_over_forwarded_for() {
        let request = Request::builder()
            .header(axum::http::header::AUTHORIZATION, "Bearer xyz")
            .header("x-forwarded-for", "1.2.3.4")
            .body(Body::empty())
            .unwrap();
        assert_eq!(partition_key(&request), "auth:Bearer xyz");
    }

    #[test]
    fn falls_back_to_forwarded_for_first_hop() {
        let request = Request::builder().header("x-forwarded-for", "1.2.3.4, 5.6.7.8").body(Body::empty()).unwrap();
        assert_eq!(partition_key(&request), "xff:1.2.3.4");
    }

    #[test]
    fn falls_back_to_unknown_with_no_signal() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(partition_key(&request), "unknown");
    }
}
