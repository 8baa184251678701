//! The failover cascade.
//!
//! Both paths share selection, header rewriting, classification and breaker
//! bookkeeping; the cascade loops stay separate because the failure-commit
//! boundary differs. The buffered path can fall over at any point before the
//! full response is read; the streaming path can only fall over until the
//! response headers are committed to the client.

mod buffered;
mod streaming;

pub use buffered::forward_buffered;
pub use streaming::forward_streaming;

use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use crate::proxy::circuit_breaker::CircuitBreaker;
use crate::proxy::classify::AttemptError;
use crate::proxy::headers::filter_response_headers;

/// Request-scoped data threaded through the cascade.
pub struct ForwardContext {
    pub req_id: String,
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
}

/// Bookkeeping across the attempts of one request: which providers were
/// tried and the most recent failure, for the exhaustion summary.
pub(crate) struct Cascade {
    tried: Vec<String>,
    last_error: Option<(String, AttemptError)>,
}

impl Cascade {
    pub(crate) fn new() -> Self {
        Self { tried: Vec::new(), last_error: None }
    }

    /// Log the forward and record the provider as tried. Returns the
    /// 1-based attempt number.
    pub(crate) fn begin_attempt(
        &mut self,
        ctx: &ForwardContext,
        provider_name: &str,
        target_url: &str,
    ) -> usize {
        self.tried.push(provider_name.to_string());
        let attempt = self.tried.len();
        tracing::info!(
            req_id = %ctx.req_id,
            provider = provider_name,
            target_url,
            attempt,
            "request_forward"
        );
        attempt
    }

    /// Failure verdict for one attempt: update the breaker, log, remember
    /// the error for the exhaustion summary.
    pub(crate) fn record_failure(
        &mut self,
        ctx: &ForwardContext,
        breaker: &CircuitBreaker,
        err: AttemptError,
        duration_ms: f64,
    ) {
        breaker.record_failure();
        match err.status {
            Some(status) => tracing::error!(
                req_id = %ctx.req_id,
                provider = breaker.name(),
                error_type = err.kind.as_str(),
                error_msg = %err.message,
                status,
                duration_ms,
                "request_failure"
            ),
            None => tracing::error!(
                req_id = %ctx.req_id,
                provider = breaker.name(),
                error_type = err.kind.as_str(),
                error_msg = %err.message,
                duration_ms,
                "request_failure"
            ),
        }
        self.last_error = Some((breaker.name().to_string(), err));
    }

    /// Every yielded provider failed: summarize the cascade as a 502.
    pub(crate) fn exhausted(self, ctx: &ForwardContext) -> Response {
        let (error_type, error_msg) = self
            .last_error
            .as_ref()
            .map(|(_, err)| (err.kind.as_str(), err.message.as_str()))
            .unwrap_or(("unknown", "no providers attempted"));
        tracing::error!(
            req_id = %ctx.req_id,
            error_type,
            error_msg,
            "all_providers_failed"
        );

        let body = ExhaustionBody {
            error: "all_providers_failed",
            providers_tried: &self.tried,
            last_error: self.last_error.as_ref().map(|(provider, err)| ExhaustionError {
                provider,
                error_type: err.kind.as_str(),
                error_msg: &err.message,
            }),
        };
        (StatusCode::BAD_GATEWAY, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct ExhaustionBody<'a> {
    error: &'static str,
    providers_tried: &'a [String],
    last_error: Option<ExhaustionError<'a>>,
}

#[derive(Serialize)]
struct ExhaustionError<'a> {
    provider: &'a str,
    error_type: &'static str,
    error_msg: &'a str,
}

/// Success verdict rendered back to the client: upstream status, filtered
/// headers, and the given body (buffered bytes or a relayed stream).
pub(crate) fn client_response(
    status: StatusCode,
    upstream_headers: &HeaderMap,
    body: Body,
) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = filter_response_headers(upstream_headers);
    response
}
