//! Error kinds surfaced from the core pipeline, and their HTTP mapping.

use once_cell::sync::Lazy;
use regex::RegexSet;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Error kinds the pipeline can surface to the HTTP layer.
///
/// `SimulatedError` is not an error *of* the core — it is an error the core
/// produces *on demand* when a request's `ShapeInfo.error_config` is set.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("too many requests")]
    TooManyRequests { retry_after_secs: u64 },

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream timeout")]
    UpstreamTimeout,

    #[error("upstream returned invalid output: {0}")]
    UpstreamInvalidOutput(String),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("simulated error")]
    SimulatedError { status: u16, message: String, details: Option<serde_json::Value> },
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized => 401,
            ApiError::TooManyRequests { .. } => 429,
            ApiError::PayloadTooLarge => 413,
            ApiError::UpstreamUnavailable(_) => 503,
            ApiError::UpstreamTimeout => 504,
            ApiError::UpstreamInvalidOutput(_) => 502,
            ApiError::InternalError(_) => 500,
            ApiError::SimulatedError { status, .. } => *status,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::Unauthorized => "Unauthorized",
            ApiError::TooManyRequests { .. } => "TooManyRequests",
            ApiError::PayloadTooLarge => "PayloadTooLarge",
            ApiError::UpstreamUnavailable(_) => "UpstreamUnavailable",
            ApiError::UpstreamTimeout => "UpstreamTimeout",
            ApiError::UpstreamInvalidOutput(_) => "UpstreamInvalidOutput",
            ApiError::InternalError(_) => "InternalError",
            ApiError::SimulatedError { .. } => "SimulatedError",
        }
    }

    /// Redacted, client-safe message: strips words matching
    /// `password|secret|token|key|credential|auth|bearer|api_key` and any
    /// URL/file path before the message is written to a response body.
    pub fn redacted_message(&self) -> String {
        redact(&self.to_string())
    }
}

static SECRET_WORDS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)password", r"(?i)secret", r"(?i)token", r"(?i)key",
        r"(?i)credential", r"(?i)auth", r"(?i)bearer", r"(?i)api_key",
    ])
    .expect("static redaction patterns are valid regexes")
});

static PATH_LIKE: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"(?:[a-zA-Z][a-zA-Z0-9+.-]*://\S+|[./][\w./-]{2,})").unwrap());

fn redact(msg: &str) -> String {
    msg.split(' ')
        .map(|word| {
            if SECRET_WORDS.is_match(word) || PATH_LIKE.is_match(word) {
                "[REDACTED]"
            } else {
                word
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_spec_table() {
        assert_eq!(ApiError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(ApiError::Unauthorized.status_code(), 401);
        assert_eq!(ApiError::TooManyRequests { retry_after_secs: 1 }.status_code(), 429);
        assert_eq!(ApiError::PayloadTooLarge.status_code(), 413);
        assert_eq!(ApiError::UpstreamUnavailable("x".into()).status_code(), 503);
        assert_eq!(ApiError::UpstreamTimeout.status_code(), 504);
        assert_eq!(ApiError::UpstreamInvalidOutput("x".into()).status_code(), 502);
        assert_eq!(ApiError::InternalError("x".into()).status_code(), 500);
    }

    #[test]
    fn redacts_secret_like_substrings() {
        let err = ApiError::InternalError("leaked api_key=sk-abc and https://host/path".into());
        let msg = err.redacted_message();
        assert!(!msg.contains("sk-abc"));
        assert!(!msg.contains("https://host/path"));
    }
}
