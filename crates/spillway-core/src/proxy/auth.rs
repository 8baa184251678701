//! Inbound access-token verification.

use axum::http::HeaderMap;

/// Admit the request when no access token is configured, or when the token
/// appears inside any inbound header value. The header name is deliberately
/// unconstrained so `authorization: Bearer <token>`, `x-api-key: <token>`
/// and provider-specific schemes all work without per-scheme parsing.
pub fn verify_access_token(headers: &HeaderMap, access_token: &str) -> bool {
    if access_token.is_empty() {
        return true;
    }

    headers
        .iter()
        .any(|(_, value)| value.to_str().map(|v| v.contains(access_token)).unwrap_or(false))
}
