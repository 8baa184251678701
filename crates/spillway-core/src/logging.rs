//! Logging initialization.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global logger: newline-delimited JSON on stdout.
///
/// Event fields are flattened to the top level so that per-event extras
/// (provider, status, duration_ms, ...) land beside the message; the request
/// correlation id rides on the enclosing span. Rotation is left to the
/// process supervisor.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_target(false)
        .with_env_filter(filter)
        .init();
}
