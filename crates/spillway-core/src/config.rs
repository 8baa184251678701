//! Gateway configuration: YAML schema, loading and validation.
//!
//! Configuration is loaded once at startup and passed by value into the
//! components that need it. There is no process-wide accessor.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{GatewayError, GatewayResult};

/// Environment variable naming the config file path.
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

const DEFAULT_CONFIG_PATH: &str = "./config.yaml";

/// One upstream provider. Providers are attempted in list order; index 0 is
/// the highest priority and the last entry is the never-skipped fallback.
#[derive(Debug, Clone, Deserialize)]
pub struct Provider {
    pub name: String,
    /// Scheme + host + optional base path, no trailing slash.
    pub base_url: String,
    /// Credential substituted for the gateway access token when forwarding.
    pub token: String,
}

/// Circuit breaker tuning shared by all providers.
#[derive(Debug, Clone, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that trip a breaker open.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds an open breaker stays open before auto-reset on inspection.
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout: f64,
    /// Chance that a request probes one currently-open provider first.
    #[serde(default = "default_probe_probability")]
    pub probe_probability: f64,
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.reset_timeout)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout: default_reset_timeout(),
            probe_probability: default_probe_probability(),
        }
    }
}

/// The `gateway:` section.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySection {
    /// Inbound access token. Empty disables the auth gate.
    #[serde(default)]
    pub access_token: String,
    /// Per-provider attempt deadline, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default)]
    pub circuit_breaker: BreakerConfig,
}

impl GatewaySection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            timeout: default_timeout(),
            circuit_breaker: BreakerConfig::default(),
        }
    }
}

/// Whole config file.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub gateway: GatewaySection,
    pub providers: Vec<Provider>,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout() -> f64 {
    600.0
}

fn default_probe_probability() -> f64 {
    0.05
}

fn default_timeout() -> f64 {
    60.0
}

impl GatewayConfig {
    /// Trailing-slash normalization for provider base URLs.
    fn normalize(&mut self) {
        for provider in &mut self.providers {
            while provider.base_url.ends_with('/') {
                provider.base_url.pop();
            }
        }
    }

    /// Semantic validation. Startup fails loudly on the first report.
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.providers.is_empty() {
            errors.push("at least one provider must be configured".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if provider.name.is_empty() {
                errors.push("provider name must be non-empty".to_string());
            } else if !seen.insert(provider.name.as_str()) {
                errors.push(format!("duplicate provider name '{}'", provider.name));
            }

            match url::Url::parse(&provider.base_url) {
                Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {},
                Ok(parsed) => errors.push(format!(
                    "provider '{}' has unsupported base_url scheme '{}'",
                    provider.name,
                    parsed.scheme()
                )),
                Err(e) => errors
                    .push(format!("provider '{}' has malformed base_url: {}", provider.name, e)),
            }
        }

        let breaker = &self.gateway.circuit_breaker;
        if breaker.failure_threshold < 1 {
            errors.push("circuit_breaker.failure_threshold must be >= 1".to_string());
        }
        if breaker.reset_timeout <= 0.0 {
            errors.push("circuit_breaker.reset_timeout must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&breaker.probe_probability) {
            errors.push("circuit_breaker.probe_probability must be within [0, 1]".to_string());
        }
        if self.gateway.timeout <= 0.0 {
            errors.push("gateway.timeout must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::Config(errors.join("; ")))
        }
    }
}

/// Load the config from `CONFIG_PATH` (default `./config.yaml`).
pub fn load_config() -> GatewayResult<GatewayConfig> {
    let path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_config_from(Path::new(&path))
}

/// Load and validate a config file from an explicit path.
pub fn load_config_from(path: &Path) -> GatewayResult<GatewayConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        GatewayError::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    let mut config: GatewayConfig = serde_yaml::from_str(&content)?;
    config.normalize();
    config.validate()?;
    Ok(config)
}
