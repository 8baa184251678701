//! Classification of one upstream attempt into the success/failure verdict
//! the circuit breaker consumes.

use std::time::Duration;

use axum::http::StatusCode;

/// Failure label carried into log records and the exhaustion response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    ConnectionError,
    HttpError,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionError => "connection_error",
            ErrorKind::HttpError => "http_error",
            ErrorKind::Unknown => "unknown",
        }
    }
}

/// One failed attempt against one provider.
#[derive(Debug, Clone)]
pub struct AttemptError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl AttemptError {
    /// The per-attempt deadline fired.
    pub fn deadline(timeout: Duration) -> Self {
        Self {
            kind: ErrorKind::Timeout,
            message: format!("attempt deadline of {:.1}s exceeded", timeout.as_secs_f64()),
            status: None,
        }
    }

    /// A 5xx status from the upstream.
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            kind: ErrorKind::HttpError,
            message: format!("upstream returned HTTP {}", status.as_u16()),
            status: Some(status.as_u16()),
        }
    }

    /// A transport-level error: connect/TLS/DNS failures and client-side
    /// timeouts map to their labels, the rest is unknown.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_connect() {
            ErrorKind::ConnectionError
        } else {
            ErrorKind::Unknown
        };
        Self { kind, message: err.to_string(), status: None }
    }
}

/// Status >= 500 is a provider failure. Everything below, including every
/// 4xx, is a success verdict: client errors pass through verbatim instead
/// of masking a misconfigured request behind a failover.
pub fn is_failure_status(status: StatusCode) -> bool {
    status.as_u16() >= 500
}
