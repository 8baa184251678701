//! Buffered forward path.
//!
//! The whole attempt (dispatch and body read) runs under one deadline, and
//! nothing is committed to the client until a full response is in hand, so
//! every failure can fall over to the next provider.

use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::Response;
use bytes::Bytes;

use super::{client_response, Cascade, ForwardContext};
use crate::proxy::classify::{is_failure_status, AttemptError};
use crate::proxy::headers::{build_target_url, prepare_request_headers};
use crate::proxy::selector::AttemptPlan;
use crate::proxy::server::GatewayState;

pub async fn forward_buffered(
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
        let outcome = match tokio::time::timeout(
            timeout,
            dispatch(&state.client, ctx.method.clone(), &url, outbound_headers, body.clone()),
        )
        .await
        {
            Ok(Ok((status, resp_headers, resp_body))) => {
                if is_failure_status(status) {
                    Err(AttemptError::from_status(status))
                } else {
                    Ok((status, resp_headers, resp_body))
                }
            },
            Ok(Err(err)) => Err(AttemptError::from_transport(&err)),
            Err(_elapsed) => Err(AttemptError::deadline(timeout)),
        };
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok((status, resp_headers, resp_body)) => {
                breaker.record_success();
                tracing::info!(
                    req_id = %ctx.req_id,
                    provider = %provider.name,
                    status = status.as_u16(),
                    duration_ms,
                    "request_success"
                );
                return client_response(status, &resp_headers, Body::from(resp_body));
            },
            Err(err) => cascade.record_failure(ctx, breaker, err, duration_ms),
        }
    }

    cascade.exhausted(ctx)
}

/// One full buffered exchange: send, then read the body to completion.
async fn dispatch(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, HeaderMap, Bytes), reqwest::Error> {
    let response = client.request(method, url).headers(headers).body(body).send().await?;
    let status = response.status();
    let resp_headers = response.headers().clone();
    let resp_body = response.bytes().await?;
    Ok((status, resp_headers, resp_body))
}
