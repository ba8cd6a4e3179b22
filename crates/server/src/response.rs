//! Maps [`mockllm_core::ApiError`] onto the single JSON error envelope
//! spec.md §7 defines: `{"error":"<kind>","message":"<redacted>"}`, with
//! `SimulatedError` carrying its caller-chosen status and an optional
//! `details` field instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use mockllm_core::ApiError;

pub struct ApiErrorResponse(pub ApiError);

impl From<ApiError> for ApiErrorResponse {
    fn from(err: ApiError) -> Self {
        ApiErrorResponse(err)
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match &self.0 {
            ApiError::SimulatedError { message, details, .. } => {
                let mut body = json!({"error": "SimulatedError", "message": message});
                if let Some(details) = details {
                    body["details"] = details.clone();
                }
                (status, Json(body)).into_response()
            }
            ApiError::TooManyRequests { retry_after_secs } => {
                let body = json!({"error": self.0.kind(), "message": self.0.redacted_message()});
                let mut response = (status, Json(body)).into_response();
                if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after_secs.to_string()) {
                    response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
                }
                response
            }
            other => {
                let body = json!({"error": other.kind(), "message": other.redacted_message()});
                (status, Json(body)).into_response()
            }
        }
    }
}
