//! Gateway state and the transparent proxy route.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::any;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::GatewayConfig;
use crate::error::GatewayResult;
use crate::proxy::auth::verify_access_token;
use crate::proxy::common::generate_request_id;
use crate::proxy::forward::{forward_buffered, forward_streaming, ForwardContext};
use crate::proxy::registry::BreakerRegistry;

const MAX_REQUEST_BODY_BYTES: usize = 100 * 1024 * 1024;

/// Shared state behind every request: the immutable config, the breaker
/// registry, and one pooled outbound client.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub registry: Arc<BreakerRegistry>,
    pub client: reqwest::Client,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let registry =
            Arc::new(BreakerRegistry::new(&config.providers, &config.gateway.circuit_breaker));
        let client = build_http_client()?;
        Ok(Self { config: Arc::new(config), registry, client })
    }
}

/// Long-lived pooled client for all outbound calls.
///
/// No client-wide request timeout: the per-attempt deadline wraps the header
/// phase explicitly, and streaming bodies must be able to outlive it.
fn build_http_client() -> GatewayResult<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(20))
        .pool_max_idle_per_host(16)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .build()?;
    Ok(client)
}

/// Build the transparent proxy router: a catch-all that forwards everything.
pub fn build_proxy_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", any(proxy_handler))
        .route("/{*path}", any(proxy_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn proxy_handler(State(state): State<GatewayState>, request: Request) -> Response {
    let req_id = generate_request_id();
    let span = tracing::info_span!("request", req_id = %req_id);
    handle_proxy_request(state, request, req_id).instrument(span).await
}

async fn handle_proxy_request(
    state: GatewayState,
    request: Request,
    req_id: String,
) -> Response {
    let (parts, body) = request.into_parts();
    let method = parts.method;
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().map(str::to_string);
    let headers = parts.headers;

    let body = match axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(req_id = %req_id, error = %err, "failed to read request body");
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": "bad_request"})))
                .into_response();
        },
    };

    let intent = parse_request_intent(&headers, &body);
    match &intent.model {
        Some(model) => tracing::info!(
            req_id = %req_id,
            method = %method,
            path = %path,
            query = query.as_deref().unwrap_or(""),
            model = %model,
            stream = intent.stream,
            "request_start"
        ),
        None => tracing::info!(
            req_id = %req_id,
            method = %method,
            path = %path,
            query = query.as_deref().unwrap_or(""),
            stream = intent.stream,
            "request_start"
        ),
    }

    if !verify_access_token(&headers, &state.config.gateway.access_token) {
        tracing::warn!(req_id = %req_id, reason = "no header carries the access token", "auth_failed");
        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "unauthorized"})))
            .into_response();
    }

    let ctx = ForwardContext { req_id, method, path, query };
    if intent.stream {
        forward_streaming(&state, &ctx, &headers, body).await
    } else {
        forward_buffered(&state, &ctx, &headers, body).await
    }
}

#[derive(Debug, Default, PartialEq)]
struct RequestIntent {
    stream: bool,
    model: Option<String>,
}

/// Streaming detection: a JSON body (per `content-type`) with a top-level
/// `stream: true` selects the streaming path. Parse failures and non-JSON
/// bodies fall back to buffered. The optional `model` field rides along for
/// the request log.
fn parse_request_intent(headers: &HeaderMap, body: &Bytes) -> RequestIntent {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().starts_with("application/json"))
        .unwrap_or(false);
    if !is_json || body.is_empty() {
        return RequestIntent::default();
    }

    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => RequestIntent {
            stream: value.get("stream").and_then(serde_json::Value::as_bool).unwrap_or(false),
            model: value.get("model").and_then(serde_json::Value::as_str).map(str::to_string),
        },
        Err(_) => RequestIntent::default(),
    }
}
