//! Header rewriting for forwarded requests and relayed responses.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

/// Hop-by-hop headers are connection-scoped and never forwarded.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Headers for the outbound request: hop-by-hop names stripped, plus `host`
/// and `content-length`, which the HTTP client regenerates for the rebuilt
/// request against the provider's base URL.
pub fn filter_request_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| {
            !is_hop_by_hop(name) && **name != header::HOST && **name != header::CONTENT_LENGTH
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Headers relayed back to the client: hop-by-hop names stripped. The body
/// is relayed verbatim, so `content-length` stays accurate and is kept.
pub fn filter_response_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Substitute the gateway access token with the selected provider's token in
/// every outbound header value. Substring replacement keeps scheme prefixes
/// like `Bearer ` intact. No-op when no access token is configured.
pub fn substitute_token(headers: &mut HeaderMap, access_token: &str, provider_token: &str) {
    if access_token.is_empty() {
        return;
    }

    for value in headers.values_mut() {
        let Ok(text) = value.to_str() else {
            continue;
        };
        if !text.contains(access_token) {
            continue;
        }
        let replaced = text.replace(access_token, provider_token);
        if let Ok(new_value) = HeaderValue::from_str(&replaced) {
            *value = new_value;
        }
    }
}

/// Outbound headers in one step: filter, then credential substitution.
pub fn prepare_request_headers(
    headers: &HeaderMap,
    access_token: &str,
    provider_token: &str,
) -> HeaderMap {
    let mut prepared = filter_request_headers(headers);
    substitute_token(&mut prepared, access_token, provider_token);
    prepared
}

/// `base_url + path + ?query`. The base URL is slash-trimmed at config load.
pub fn build_target_url(base_url: &str, path: &str, query: Option<&str>) -> String {
    match query {
        Some(query) if !query.is_empty() => format!("{base_url}{path}?{query}"),
        _ => format!("{base_url}{path}"),
    }
}
