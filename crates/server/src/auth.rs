//! Management-surface authentication (spec.md §6): bearer-token auth with
//! two modes — constant-time API-key compare, or HMAC-SHA256 JWT
//! verification. Gates only the auth-gated management prefix; the public
//! synthesis surface never reaches this middleware.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use mockllm_config::{AuthConfig, AuthMode};

use crate::state::AppState;

const SKEW_SECS: i64 = 5 * 60;

#[derive(Debug)]
enum AuthOutcome {
    Disabled,
    PublicPath,
    Authorized { #[allow(dead_code)] subject: String, #[allow(dead_code)] role: String },
    Unauthorized(&'static str),
}

#[derive(Debug, Deserialize)]
struct JwtClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    nbf: Option<i64>,
}

/// Checks one request against the auth config, without touching the
/// response — kept separate from the middleware fn so it's unit-testable
/// without spinning up axum.
fn check(auth: &AuthConfig, path: &str, bearer: Option<&str>) -> AuthOutcome {
    if !auth.enabled {
        return AuthOutcome::Disabled;
    }
    if auth.public_paths.iter().any(|p| p == path) {
        return AuthOutcome::PublicPath;
    }

    let Some(token) = bearer else {
        return AuthOutcome::Unauthorized("missing bearer token");
    };
    let Some(secret) = &auth.secret else {
        return AuthOutcome::Unauthorized("no secret configured");
    };

    match auth.mode {
        AuthMode::ApiKey => {
            if constant_time_eq(token.as_bytes(), secret.as_bytes()) {
                AuthOutcome::Authorized { subject: "api-key".to_string(), role: "admin".to_string() }
            } else {
                AuthOutcome::Unauthorized("invalid API key")
            }
        }
        AuthMode::Jwt => verify_jwt(token, secret),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.ct_eq(b).into()
}

fn verify_jwt(token: &str, secret: &str) -> AuthOutcome {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
        return AuthOutcome::Unauthorized("malformed token");
    };

    let signing_input = format!("{header_b64}.{payload_b64}");
    let Ok(expected_sig) = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(sig_b64) else {
        return AuthOutcome::Unauthorized("malformed signature");
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return AuthOutcome::Unauthorized("invalid signing secret");
    };
    mac.update(signing_input.as_bytes());
    if mac.verify_slice(&expected_sig).is_err() {
        return AuthOutcome::Unauthorized("signature mismatch");
    }

    let Ok(payload_bytes) = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(payload_b64) else {
        return AuthOutcome::Unauthorized("malformed claims");
    };
    let Ok(claims) = serde_json::from_slice::<JwtClaims>(&payload_bytes) else {
        return AuthOutcome::Unauthorized("malformed claims");
    };

    let now = chrono::Utc::now().timestamp();
    if let Some(exp) = claims.exp {
        if now > exp + SKEW_SECS {
            return AuthOutcome::Unauthorized("token expired");
        }
    }
    if let Some(nbf) = claims.nbf {
        if now < nbf - SKEW_SECS {
            return AuthOutcome::Unauthorized("token not yet valid");
        }
    }

    AuthOutcome::Authorized {
        subject: claims.sub.unwrap_or_else(|| "unknown".to_string()),
        role: claims.role.unwrap_or_else(|| "admin".to_string()),
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    request.headers().get(axum::http::header::AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
}

fn unauthorized_response(reason: &str) -> Response {
    let mut response =
        (StatusCode::UNAUTHORIZED, axum::Json(serde_json::json!({"error": "Unauthorized", "message": reason}))).into_response();
    let value = "Bearer realm=\"mockllm-management\", error=\"invalid_token\"".to_string();
    if let Ok(header_value) = HeaderValue::from_str(&value) {
        response.headers_mut().insert(axum::http::header::WWW_AUTHENTICATE, header_value);
    }
    response
}

pub async fn auth_middleware(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let bearer = bearer_token(&request).map(str::to_string);

    match check(&state.config.server.auth, &path, bearer.as_deref()) {
        AuthOutcome::Disabled | AuthOutcome::PublicPath | AuthOutcome::Authorized { .. } => next.run(request).await,
        AuthOutcome::Unauthorized(reason) => unauthorized_response(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(mode: AuthMode, secret: &str) -> AuthConfig {
        AuthConfig { enabled: true, mode, secret: Some(secret.to_string()), public_paths: vec!["/health".to_string()] }
    }

    #[test]
    fn disabled_auth_always_passes() {
        let cfg = AuthConfig { enabled: false, ..auth(AuthMode::ApiKey, "x") };
        assert!(matches!(check(&cfg, "/contexts", None), AuthOutcome::Disabled));
    }

    #[test]
    fn public_path_bypasses_auth() {
        let cfg = auth(AuthMode::ApiKey, "x");
        assert!(matches!(check(&cfg, "/health", None), AuthOutcome::PublicPath));
    }

    #[test]
    fn correct_api_key_is_authorized() {
        let cfg = auth(AuthMode::ApiKey, "s3cr3t");
        assert!(matches!(check(&cfg, "/contexts", Some("s3cr3t")), AuthOutcome::Authorized { .. }));
    }

    #[test]
    fn wrong_api_key_is_rejected() {
        let cfg = auth(AuthMode::ApiKey, "s3cr3t");
        assert!(matches!(check(&cfg, "/contexts", Some("nope")), AuthOutcome::Unauthorized(_)));
    }

    #[test]
    fn missing_bearer_is_rejected() {
        let cfg = auth(AuthMode::ApiKey, "s3cr3t");
        assert!(matches!(check(&cfg, "/contexts", None), AuthOutcome::Unauthorized(_)));
    }

    fn sign_jwt(secret: &str, claims: serde_json::Value) -> String {
        let header = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string());
        let signing_input = format!("{header}.{payload}");
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signing_input.as_bytes());
        let sig = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{signing_input}.{sig}")
    }

    #[test]
    fn valid_jwt_is_authorized_with_claims() {
        let cfg = auth(AuthMode::Jwt, "jwt-secret");
        let now = chrono::Utc::now().timestamp();
        let token = sign_jwt("jwt-secret", serde_json::json!({"sub": "ann", "role": "admin", "exp": now + 3600}));
        match check(&cfg, "/contexts", Some(&token)) {
            AuthOutcome::Authorized { subject, role } => {
                assert_eq!(subject, "ann");
                assert_eq!(role, "admin");
            }
            other => panic!("expected Authorized, got {other:?}"),
        }
    }

    #[test]
    fn expired_jwt_is_rejected() {
        let cfg = auth(AuthMode::Jwt, "jwt-secret");
        let now = chrono::Utc::now().timestamp();
        let token = sign_jwt("jwt-secret", serde_json::json!({"sub": "ann", "exp": now - 3600}));
        assert!(matches!(check(&cfg, "/contexts", Some(&token)), AuthOutcome::Unauthorized(_)));
    }

    #[test]
    fn jwt_within_skew_window_is_accepted() {
        let cfg = auth(AuthMode::Jwt, "jwt-secret");
        let now = chrono::Utc::now().timestamp();
        let token = sign_jwt("jwt-secret", serde_json::json!({"sub": "ann", "exp": now - 60}));
        assert!(matches!(check(&cfg, "/contexts", Some(&token)), AuthOutcome::Authorized { .. }));
    }

    #[test]
    fn jwt_with_wrong_signature_is_rejected() {
        let cfg = auth(AuthMode::Jwt, "jwt-secret");
        let token = sign_jwt("wrong-secret", serde_json::json!({"sub": "ann"}));
        assert!(matches!(check(&cfg, "/contexts", Some(&token)), AuthOutcome::Unauthorized(_)));
    }
}
