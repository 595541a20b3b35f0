//! Configuration loading and constants.
//!
//! Loads the service configuration from a TOML file. `AppConfig` is the root
//! struct; `ServerConfig` describes the listener endpoint and shutdown policy,
//! `LoggingConfig` the log output format.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::http::Endpoint;

// =============================================================================
// Defaults
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "gracehold=debug,tower_http=debug";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Time allowed for in-flight connections to finish after an interrupt
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2000;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Listener and lifecycle settings
    pub server: ServerConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener endpoint and shutdown policy
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// `host:port` for TCP, or `unix:/path/to.sock` for a Unix domain socket
    pub address: String,
    /// PEM certificate chain; empty means plain HTTP
    #[serde(default)]
    pub tls_cert_file: String,
    /// PEM private key; empty means plain HTTP
    #[serde(default)]
    pub tls_key_file: String,
    /// Grace period for draining connections on shutdown, in milliseconds
    #[serde(default = "ServerConfig::default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Reload the certificate pair from disk on SIGHUP (TLS only)
    #[serde(default = "ServerConfig::default_reload_on_sighup")]
    pub reload_on_sighup: bool,
}

impl ServerConfig {
    /// Plain-HTTP configuration for `address` with default shutdown policy.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            tls_cert_file: String::new(),
            tls_key_file: String::new(),
            shutdown_grace_ms: Self::default_shutdown_grace_ms(),
            reload_on_sighup: Self::default_reload_on_sighup(),
        }
    }

    pub fn with_tls(mut self, cert: impl Into<String>, key: impl Into<String>) -> Self {
        self.tls_cert_file = cert.into();
        self.tls_key_file = key.into();
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// The endpoint descriptor this configuration serves.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(&self.address).with_tls(&self.tls_cert_file, &self.tls_key_file)
    }

    fn default_shutdown_grace_ms() -> u64 {
        DEFAULT_SHUTDOWN_GRACE_MS
    }

    fn default_reload_on_sighup() -> bool {
        true
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;

        if config.server.address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.address must not be empty".to_string(),
            ));
        }

        match config.logging.format.to_ascii_lowercase().as_str() {
            "text" | "json" => {}
            other => {
                return Err(ConfigError::Validation(format!(
                    "logging.format must be \"text\" or \"json\", got {other:?}"
                )))
            }
        }

        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
