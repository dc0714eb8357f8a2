//! Channel service configuration.
//!
//! Configuration is loaded from environment variables. Library users can
//! build [`RuntimeConfig`] and [`ChannelConfig`] directly; both default to the
//! same values the environment loader uses.

use crate::backend::BackendKind;
use common::config::ObservabilityConfig;
use common::types::ChannelId;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8082";

/// Default endpoint actor mailbox capacity.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Default registry actor mailbox capacity.
pub const DEFAULT_REGISTRY_MAILBOX_CAPACITY: usize = 1000;

/// Default capacity of a channel's published-event broadcast.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Default capacity of the runtime's actor-removed broadcast.
pub const DEFAULT_LIFECYCLE_CAPACITY: usize = 1024;

/// Default time actor removal waits for lifecycle listeners, in milliseconds.
pub const DEFAULT_REMOVAL_ACK_TIMEOUT_MS: u64 = 5000;

/// Default service instance ID prefix.
pub const DEFAULT_SERVICE_ID_PREFIX: &str = "channel-service";

/// Default log filter for the binary.
pub const DEFAULT_LOG_FILTER: &str = "channel_service=debug,tower_http=debug";

/// Settings for the local actor runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Mailbox capacity of every registered endpoint actor.
    pub mailbox_capacity: usize,
    /// Capacity of the actor-removed notification broadcast.
    pub lifecycle_capacity: usize,
    /// Upper bound on how long `remove_actors` waits for lifecycle listeners
    /// to handle a removal.
    pub removal_ack_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            lifecycle_capacity: DEFAULT_LIFECYCLE_CAPACITY,
            removal_ack_timeout: Duration::from_millis(DEFAULT_REMOVAL_ACK_TIMEOUT_MS),
        }
    }
}

/// Settings for channels and the channel registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Mailbox capacity of the registry actor.
    pub registry_mailbox_capacity: usize,
    /// Capacity of each channel's published-event broadcast.
    pub event_capacity: usize,
    /// Backend used when a channel is created without one.
    pub default_backend: BackendKind,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            registry_mailbox_capacity: DEFAULT_REGISTRY_MAILBOX_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            default_backend: BackendKind::InMemory,
        }
    }
}

/// Channel service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this service instance.
    pub service_id: String,

    /// Health endpoint bind address (default: "0.0.0.0:8082").
    pub health_bind_address: String,

    /// Local runtime settings.
    pub runtime: RuntimeConfig,

    /// Channel and registry settings.
    pub channels: ChannelConfig,

    /// Channels created at startup.
    pub bootstrap_channels: Vec<ChannelId>,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let service_id = vars.get("CHANNEL_SERVICE_ID").cloned().unwrap_or_else(|| {
            format!("{DEFAULT_SERVICE_ID_PREFIX}-{}", uuid::Uuid::new_v4())
        });

        let health_bind_address = vars
            .get("CHANNEL_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let runtime = RuntimeConfig {
            mailbox_capacity: parse_capacity(
                vars,
                "CHANNEL_MAILBOX_CAPACITY",
                DEFAULT_MAILBOX_CAPACITY,
            )?,
            lifecycle_capacity: parse_capacity(
                vars,
                "CHANNEL_LIFECYCLE_CAPACITY",
                DEFAULT_LIFECYCLE_CAPACITY,
            )?,
            removal_ack_timeout: parse_millis(
                vars,
                "CHANNEL_REMOVAL_ACK_TIMEOUT_MS",
                DEFAULT_REMOVAL_ACK_TIMEOUT_MS,
            )?,
        };

        // Unknown backend names fall back to in-memory inside BackendKind::parse_or_default
        let default_backend = vars
            .get("CHANNEL_BACKEND")
            .map_or(BackendKind::InMemory, |name| {
                BackendKind::parse_or_default(name)
            });

        let channels = ChannelConfig {
            registry_mailbox_capacity: parse_capacity(
                vars,
                "CHANNEL_REGISTRY_MAILBOX_CAPACITY",
                DEFAULT_REGISTRY_MAILBOX_CAPACITY,
            )?,
            event_capacity: parse_capacity(vars, "CHANNEL_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY)?,
            default_backend,
        };

        let bootstrap_channels = vars
            .get("CHANNEL_BOOTSTRAP")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(ChannelId::new)
                    .collect()
            })
            .unwrap_or_default();

        let json_logs = match vars.get("CHANNEL_LOG_JSON").map(String::as_str) {
            None | Some("" | "0" | "false") => false,
            Some("1" | "true") => true,
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "CHANNEL_LOG_JSON must be true or false, got '{other}'"
                )))
            }
        };

        let observability = ObservabilityConfig {
            log_level: vars
                .get("CHANNEL_LOG_LEVEL")
                .cloned()
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            json_logs,
        };

        Ok(Config {
            service_id,
            health_bind_address,
            runtime,
            channels,
            bootstrap_channels,
            observability,
        })
    }
}

/// Parse a non-zero capacity, falling back to `default` when unset.
///
/// Tokio channels reject a zero capacity, so zero is an invalid value here.
fn parse_capacity(
    vars: &HashMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    match vars.get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(0) => Err(ConfigError::InvalidValue(format!(
                "{key} must be greater than zero"
            ))),
            Ok(value) => Ok(value),
            Err(_) => Err(ConfigError::InvalidValue(format!(
                "{key} must be a positive integer, got '{raw}'"
            ))),
        },
    }
}

/// Parse a non-zero duration in milliseconds, falling back to `default`.
fn parse_millis(
    vars: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let millis = match vars.get(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(0) | Err(_) => {
                return Err(ConfigError::InvalidValue(format!(
                    "{key} must be a positive number of milliseconds, got '{raw}'"
                )))
            }
            Ok(value) => value,
        },
    };
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([("CHANNEL_SERVICE_ID".to_string(), "svc-test".to_string())])
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&HashMap::new()).unwrap();

        assert!(config.service_id.starts_with("channel-service-"));
        assert_eq!(config.health_bind_address, DEFAULT_HEALTH_BIND_ADDRESS);
        assert_eq!(config.runtime, RuntimeConfig::default());
        assert_eq!(config.channels, ChannelConfig::default());
        assert!(config.bootstrap_channels.is_empty());
        assert!(!config.observability.json_logs);
        assert_eq!(config.observability.log_level, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_from_vars_custom_values() {
        let mut vars = base_vars();
        vars.insert("CHANNEL_HEALTH_BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("CHANNEL_MAILBOX_CAPACITY".to_string(), "32".to_string());
        vars.insert("CHANNEL_LIFECYCLE_CAPACITY".to_string(), "64".to_string());
        vars.insert("CHANNEL_REGISTRY_MAILBOX_CAPACITY".to_string(), "10".to_string());
        vars.insert("CHANNEL_EVENT_CAPACITY".to_string(), "16".to_string());
        vars.insert("CHANNEL_LOG_JSON".to_string(), "true".to_string());
        vars.insert("CHANNEL_REMOVAL_ACK_TIMEOUT_MS".to_string(), "250".to_string());

        let config = Config::from_vars(&vars).unwrap();

        assert_eq!(config.service_id, "svc-test");
        assert_eq!(config.health_bind_address, "127.0.0.1:9000");
        assert_eq!(config.runtime.mailbox_capacity, 32);
        assert_eq!(config.runtime.lifecycle_capacity, 64);
        assert_eq!(
            config.runtime.removal_ack_timeout,
            Duration::from_millis(250)
        );
        assert_eq!(config.channels.registry_mailbox_capacity, 10);
        assert_eq!(config.channels.event_capacity, 16);
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut vars = base_vars();
        vars.insert("CHANNEL_MAILBOX_CAPACITY".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_zero_removal_ack_timeout_rejected() {
        let mut vars = base_vars();
        vars.insert("CHANNEL_REMOVAL_ACK_TIMEOUT_MS".to_string(), "0".to_string());

        let err = Config::from_vars(&vars).unwrap_err();
        assert!(err.to_string().contains("CHANNEL_REMOVAL_ACK_TIMEOUT_MS"));
    }

    #[test]
    fn test_non_numeric_capacity_rejected() {
        let mut vars = base_vars();
        vars.insert("CHANNEL_EVENT_CAPACITY".to_string(), "lots".to_string());

        let err = Config::from_vars(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
        assert!(err.to_string().contains("CHANNEL_EVENT_CAPACITY"));
    }

    #[test]
    fn test_bootstrap_channels_parsed() {
        let mut vars = base_vars();
        vars.insert("CHANNEL_BOOTSTRAP".to_string(), "room1, room2,,lobby ".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(
            config.bootstrap_channels,
            vec![
                ChannelId::new("room1"),
                ChannelId::new("room2"),
                ChannelId::new("lobby")
            ]
        );
    }

    #[test]
    fn test_unknown_backend_falls_back_to_memory() {
        let mut vars = base_vars();
        vars.insert("CHANNEL_BACKEND".to_string(), "cassandra".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.channels.default_backend, BackendKind::InMemory);
    }

    #[test]
    fn test_invalid_log_json_rejected() {
        let mut vars = base_vars();
        vars.insert("CHANNEL_LOG_JSON".to_string(), "maybe".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
