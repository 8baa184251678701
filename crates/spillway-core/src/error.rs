//! Unified error types for the gateway core.

use thiserror::Error;

/// Startup-path error type. Request-path failures never surface as `Err`;
/// they are classified per attempt and rendered as gateway responses.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client construction failed.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
