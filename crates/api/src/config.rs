//! Application configuration
//!
//! Loaded in layers, later layers overriding earlier ones:
//!
//! 1. Compiled defaults
//! 2. Optional TOML file (`alert-bridge.toml`, or the path in `ALERT_BRIDGE_CONFIG`)
//! 3. `ALERT_BRIDGE__*` environment variables, `__` separating nested keys
//!    (e.g. `ALERT_BRIDGE__SERVER__LISTEN_ADDR=0.0.0.0:9093`)

use crate::rate_limit::RateLimitConfig;
use alerting::SubscriberConfig;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "alert-bridge.toml";

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive, e.g. `info` or `alerting=debug,info`
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub subscribers: Vec<SubscriberConfig>,
}

impl AppConfig {
    /// Load from `path` (if it exists) with environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(&path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("ALERT_BRIDGE").separator("__"))
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `ALERT_BRIDGE_CONFIG` or the default path
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("ALERT_BRIDGE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen_addr.trim().is_empty() {
            return Err(ConfigError::Message("server.listen_addr must not be empty".into()));
        }
        if self.rate_limit.per_second == 0 || self.rate_limit.burst_size == 0 {
            return Err(ConfigError::Message(
                "rate_limit.per_second and rate_limit.burst_size must be positive".into(),
            ));
        }
        for subscriber in &self.subscribers {
            if subscriber.name.trim().is_empty() {
                return Err(ConfigError::Message("subscriber name must not be empty".into()));
            }
        }
        Ok(())
    }
}
