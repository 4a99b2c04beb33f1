//! Configuration management using Figment
//!
//! Configuration is loaded once at startup and injected into the
//! [`Publisher`](crate::publisher::Publisher) and
//! [`LogFacade`](crate::response::LogFacade). Nothing in this crate reads the
//! environment while a request is being handled.
//!
//! Sources, lowest to highest precedence:
//! 1. Default values
//! 2. A TOML file (`./logbus.toml` for [`Config::load`], or an explicit path)
//! 3. Environment variables prefixed with `LOGBUS_` (`__` separates nesting,
//!    e.g. `LOGBUS_PUBLISH__FLUSH_TIMEOUT_MS=2000`)
//! 4. The fixed variables [`BROKER_ADDRESS_ENV`], [`ERROR_LOGS_ENV`],
//!    [`AUDIT_LOGS_ENV`], [`EVENT_LOGS_ENV`] and [`COMMUNICATION_LOGS_ENV`]

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Message bus address
pub const BROKER_ADDRESS_ENV: &str = "BROKER_ADDRESS";

/// Topic receiving error records
pub const ERROR_LOGS_ENV: &str = "ERROR_LOGS";

/// Topic receiving audit records
pub const AUDIT_LOGS_ENV: &str = "AUDIT_LOGS";

/// Topic receiving event records
pub const EVENT_LOGS_ENV: &str = "EVENT_LOGS";

/// Topic receiving communication records
pub const COMMUNICATION_LOGS_ENV: &str = "COMMUNICATION_LOGS";

/// Default config file looked up by [`Config::load`]
pub const DEFAULT_CONFIG_FILE: &str = "logbus.toml";

// Fixed variable name -> config key path
const FIXED_ENV_KEYS: [(&str, &str); 5] = [
    (BROKER_ADDRESS_ENV, "bus.url"),
    (ERROR_LOGS_ENV, "topics.error_logs"),
    (AUDIT_LOGS_ENV, "topics.audit_logs"),
    (EVENT_LOGS_ENV, "topics.event_logs"),
    (COMMUNICATION_LOGS_ENV, "topics.communication_logs"),
];

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// Message bus connection
    #[serde(default)]
    pub bus: BusConfig,

    /// Destination topics per record kind
    #[serde(default)]
    pub topics: TopicsConfig,

    /// Publish behaviour
    #[serde(default)]
    pub publish: PublishConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

/// NATS connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Server URL. Empty means unconfigured; the client rejects it on connect
    /// and records are dropped with a log line.
    #[serde(default)]
    pub url: String,

    /// Connection name reported to the server
    #[serde(default)]
    pub name: Option<String>,

    /// Max reconnection attempts once connected
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: usize,

    /// Retries for the initial connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between initial connection retries in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Publish through JetStream and wait for its acknowledgement.
    /// When false, publish on core NATS and flush.
    #[serde(default = "default_true")]
    pub jetstream: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            name: None,
            max_reconnects: default_max_reconnects(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            jetstream: true,
        }
    }
}

impl BusConfig {
    /// Base delay between connection retries
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Destination topic per record kind
///
/// An empty topic disables publishing for that kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicsConfig {
    #[serde(default)]
    pub error_logs: String,

    #[serde(default)]
    pub audit_logs: String,

    #[serde(default)]
    pub event_logs: String,

    #[serde(default)]
    pub communication_logs: String,
}

/// How the publisher waits for delivery
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    /// Block the caller until the delivery is confirmed or the flush timeout
    /// elapses
    #[default]
    AwaitDelivery,
    /// Hand the send to a background task bounded by the flush timeout
    Detached,
}

/// Publish behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Upper bound on waiting for a delivery acknowledgement, in milliseconds
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,

    /// Whether callers wait for the acknowledgement
    #[serde(default)]
    pub mode: PublishMode,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            flush_timeout_ms: default_flush_timeout_ms(),
            mode: PublishMode::default(),
        }
    }
}

impl PublishConfig {
    /// Flush timeout as a Duration
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

// Default value functions
fn default_service_name() -> String {
    "logbus".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_reconnects() -> usize {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

fn default_flush_timeout_ms() -> u64 {
    15_000
}

impl Config {
    /// Load configuration from `./logbus.toml` (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from a specific file and the environment
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
        } else {
            tracing::debug!("No configuration file at {}", path.display());
        }

        let config = Self::figment()
            .merge(Toml::file(path))
            .merge(Env::prefixed("LOGBUS_").split("__"))
            .merge(fixed_env())
            .extract()?;

        Ok(config)
    }

    /// Load configuration from the environment only
    pub fn from_env() -> Result<Self> {
        let config = Self::figment()
            .merge(Env::prefixed("LOGBUS_").split("__"))
            .merge(fixed_env())
            .extract()?;

        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new().merge(Serialized::defaults(Config::default()))
    }
}

/// Provider for the fixed, unprefixed variable names
fn fixed_env() -> Env {
    let names = FIXED_ENV_KEYS.map(|(name, _)| name);
    Env::raw()
        .only(&names)
        .map(|key| env_key_path(key.as_str()).into())
}

fn env_key_path(key: &str) -> &'static str {
    FIXED_ENV_KEYS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, path)| *path)
        .unwrap_or("unmapped")
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.name, "logbus");
        assert_eq!(config.service.log_level, "info");
        assert!(config.bus.url.is_empty());
        assert!(config.bus.jetstream);
        assert_eq!(config.publish.flush_timeout(), Duration::from_secs(15));
        assert_eq!(config.publish.mode, PublishMode::AwaitDelivery);
        assert_eq!(config.topics, TopicsConfig::default());
    }

    #[test]
    fn test_fixed_env_names_map_to_keys() {
        Jail::expect_with(|jail| {
            jail.set_env("BROKER_ADDRESS", "nats://bus.internal:4222");
            jail.set_env("ERROR_LOGS", "svc.errors");
            jail.set_env("AUDIT_LOGS", "svc.audit");

            let config = Config::from_env().map_err(|e| e.to_string())?;
            assert_eq!(config.bus.url, "nats://bus.internal:4222");
            assert_eq!(config.topics.error_logs, "svc.errors");
            assert_eq!(config.topics.audit_logs, "svc.audit");
            assert!(config.topics.event_logs.is_empty());
            Ok(())
        });
    }

    #[test]
    fn test_prefixed_env_overrides_nested_keys() {
        Jail::expect_with(|jail| {
            jail.set_env("LOGBUS_PUBLISH__FLUSH_TIMEOUT_MS", "250");
            jail.set_env("LOGBUS_PUBLISH__MODE", "detached");
            jail.set_env("LOGBUS_BUS__JETSTREAM", "false");

            let config = Config::from_env().map_err(|e| e.to_string())?;
            assert_eq!(config.publish.flush_timeout(), Duration::from_millis(250));
            assert_eq!(config.publish.mode, PublishMode::Detached);
            assert!(!config.bus.jetstream);
            Ok(())
        });
    }

    #[test]
    fn test_load_from_file_then_env() {
        Jail::expect_with(|jail| {
            let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
            let path = dir.path().join("logbus.toml");
            std::fs::write(
                &path,
                r#"
                [service]
                name = "orders"

                [bus]
                url = "nats://from-file:4222"

                [topics]
                error_logs = "file.errors"
                audit_logs = "file.audit"
                "#,
            )
            .map_err(|e| e.to_string())?;

            jail.set_env("AUDIT_LOGS", "env.audit");

            let config = Config::load_from(&path).map_err(|e| e.to_string())?;
            assert_eq!(config.service.name, "orders");
            assert_eq!(config.bus.url, "nats://from-file:4222");
            assert_eq!(config.topics.error_logs, "file.errors");
            assert_eq!(config.topics.audit_logs, "env.audit");
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::load_from("does-not-exist.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.service.name, "logbus");
            assert_eq!(config.publish.flush_timeout_ms, 15_000);
            Ok(())
        });
    }

    #[test]
    fn test_env_key_path_is_case_insensitive() {
        assert_eq!(env_key_path("error_logs"), "topics.error_logs");
        assert_eq!(env_key_path("BROKER_ADDRESS"), "bus.url");
        assert_eq!(env_key_path("OTHER"), "unmapped");
    }
}
