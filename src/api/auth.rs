use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::error::ApiError;
use super::AppState;

/// Proof that the request carried the configured bearer token.
///
/// With no token configured every guarded route rejects.
#[derive(Debug, Clone, Copy)]
pub struct Authorized;

#[async_trait]
impl FromRequestParts<AppState> for Authorized {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.api_token.as_deref().filter(|t| !t.is_empty()) else {
            tracing::warn!("Rejected {}: no API token configured", parts.uri.path());
            return Err(ApiError::Unauthorized("API token is not configured".to_string()));
        };

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".to_string()))?;

        let token = bearer_token(header)
            .ok_or_else(|| ApiError::Unauthorized("expected a Bearer token".to_string()))?;

        if tokens_match(token, expected) {
            Ok(Authorized)
        } else {
            tracing::warn!("Rejected {}: invalid API token", parts.uri.path());
            Err(ApiError::Unauthorized("invalid API token".to_string()))
        }
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn tokens_match(given: &str, expected: &str) -> bool {
    if given.len() != expected.len() {
        return false;
    }
    given
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
