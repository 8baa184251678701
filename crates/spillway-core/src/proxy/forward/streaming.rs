//! Streaming forward path.
//!
//! Nothing is committed to the client until the upstream's response headers
//! carry a success verdict; only that phase runs under the attempt deadline.
//! Once the status line is sent the cascade can no longer fall over: a body
//! error is terminal. It is recorded against the breaker for observability
//! and the client stream is cut.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::HeaderMap;
use axum::response::Response;
use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::{client_response, Cascade, ForwardContext};
use crate::proxy::classify::{is_failure_status, AttemptError, ErrorKind};
use crate::proxy::headers::{build_target_url, prepare_request_headers};
use crate::proxy::registry::BreakerRegistry;
use crate::proxy::selector::AttemptPlan;
use crate::proxy::server::GatewayState;

pub async fn forward_streaming(
    state: &GatewayState,
    ctx: &ForwardContext,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let timeout = state.config.gateway.request_timeout();
    let plan = AttemptPlan::new(
        &state.registry,
        state.config.gateway.circuit_breaker.probe_probability,
        &mut rand::thread_rng(),
    );
    let mut cascade = Cascade::new();

    for index in plan {
        let provider = &state.config.providers[index];
        let breaker = state.registry.by_index(index);
        let url = build_target_url(&provider.base_url, &ctx.path, ctx.query.as_deref());
        let outbound_headers =
            prepare_request_headers(headers, &state.config.gateway.access_token, &provider.token);
        cascade.begin_attempt(ctx, &provider.name, &url);

        let started = Instant::now();
        let send = state
            .client
            .request(ctx.method.clone(), url.as_str())
            .headers(outbound_headers)
            .body(body.clone())
            .send();

        let outcome = match tokio::time::timeout(timeout, send).await {
            Ok(Ok(response)) => {
                let status = response.status();
                if is_failure_status(status) {
                    // Drop closes the upstream response before moving on.
                    Err(AttemptError::from_status(status))
                } else {
                    Ok(response)
                }
            },
            Ok(Err(err)) => Err(AttemptError::from_transport(&err)),
            Err(_elapsed) => Err(AttemptError::deadline(timeout)),
        };
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(response) => {
                breaker.record_success();
                tracing::info!(
                    req_id = %ctx.req_id,
                    provider = %provider.name,
                    status = response.status().as_u16(),
                    duration_ms,
                    "request_success"
                );
                let status = response.status();
                let resp_headers = response.headers().clone();
                let relayed = relay_stream(
                    response.bytes_stream(),
                    Arc::clone(&state.registry),
                    index,
                    ctx.req_id.clone(),
                );
                return client_response(status, &resp_headers, Body::from_stream(relayed));
            },
            Err(err) => cascade.record_failure(ctx, breaker, err, duration_ms),
        }
    }

    cascade.exhausted(ctx)
}

/// Relay the upstream body chunk-at-a-time. The first error updates the
/// provider's breaker and is surfaced as an `io::Error`, which aborts the
/// client body mid-stream; the headers are already committed, so there is
/// nothing else to fail over to.
fn relay_stream<S, E>(
    upstream: S,
    registry: Arc<BreakerRegistry>,
    index: usize,
    req_id: String,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + 'static,
{
    let mut failed = false;
    upstream.map(move |chunk| match chunk {
        Ok(bytes) => Ok(bytes),
        Err(err) => {
            if !failed {
                failed = true;
                let breaker = registry.by_index(index);
                breaker.record_failure();
                tracing::error!(
                    req_id = %req_id,
                    provider = breaker.name(),
                    error_type = ErrorKind::ConnectionError.as_str(),
                    error_msg = %err,
                    "request_failure"
                );
            }
            Err(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
        },
    })
}
