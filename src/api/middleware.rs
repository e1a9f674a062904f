use std::{collections::HashSet, sync::Arc};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::StoreError;

/// Bearer keys accepted on admin routes.
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<HashSet<String>>,
    pub enabled: bool,
}

impl AuthState {
    /// Auth is enabled whenever keys are configured. Configuration loading
    /// already refuses to start without keys outside development.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_keys(config.admin_api_keys.iter().cloned())
    }

    pub fn with_keys(keys: impl IntoIterator<Item = String>) -> Self {
        let keys: HashSet<String> = keys.into_iter().filter(|k| !k.trim().is_empty()).collect();
        if keys.is_empty() {
            tracing::warn!("STORE_ADMIN_API_KEYS not set; admin routes are unauthenticated");
        }
        Self {
            enabled: !keys.is_empty(),
            api_keys: Arc::new(keys),
        }
    }

    pub fn disabled() -> Self {
        Self {
            api_keys: Arc::new(HashSet::new()),
            enabled: false,
        }
    }

    fn allows(&self, token: &str) -> bool {
        self.api_keys.contains(token)
    }
}

/// Propagates `x-request-id` or assigns a fresh UUIDv4. The ID is recorded
/// on the request span, so every log line for the request carries it, and
/// echoed on the response.
pub async fn request_id(req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    let span = tracing::info_span!("request", request_id = %id);
    let mut res = next.run(req).instrument(span).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }
    res
}

pub async fn require_bearer_auth(State(auth): State<AuthState>, req: Request, next: Next) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    match extract_bearer_token(req.headers().get(AUTHORIZATION)) {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => {
            tracing::debug!(uri = %req.uri(), "rejected admin request without a valid bearer token");
            StoreError::Unauthorized.into_response()
        }
    }
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_token_accepts_valid_header() {
        let header = HeaderValue::from_static("Bearer admin-key");
        assert_eq!(extract_bearer_token(Some(&header)), Some("admin-key"));
    }

    #[test]
    fn extract_bearer_token_rejects_other_schemes_and_blanks() {
        assert_eq!(extract_bearer_token(Some(&HeaderValue::from_static("Basic abc123"))), None);
        assert_eq!(extract_bearer_token(Some(&HeaderValue::from_static("Bearer   "))), None);
        assert_eq!(extract_bearer_token(None), None);
    }

    #[test]
    fn auth_is_enabled_only_with_keys() {
        assert!(!AuthState::with_keys(Vec::new()).enabled);
        assert!(!AuthState::with_keys(vec![" ".to_string()]).enabled);

        let auth = AuthState::with_keys(vec!["k1".to_string()]);
        assert!(auth.enabled);
        assert!(auth.allows("k1"));
        assert!(!auth.allows("k2"));
    }
}
