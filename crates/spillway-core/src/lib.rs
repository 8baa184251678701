//! Spillway core: a transparent HTTP failover gateway.
//!
//! Clients address the gateway as if it were the upstream API. Per request,
//! the gateway verifies the inbound access token, picks the highest-priority
//! provider whose circuit breaker is closed, rewrites credentials, and
//! forwards the request verbatim. Upstream failures (transport errors and
//! 5xx responses) trip per-provider breakers and cascade to the next
//! provider; the last-priority provider is never skipped.

pub mod config;
pub mod error;
pub mod logging;
pub mod proxy;

pub use config::{load_config, GatewayConfig, Provider};
pub use error::{GatewayError, GatewayResult};
pub use proxy::{build_proxy_router, GatewayState};
