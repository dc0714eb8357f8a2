//! Common configuration types for channel service components.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default log filter when neither `RUST_LOG` nor a configured level is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log filter directive (e.g. `info`, `channel_service=debug`)
    pub log_level: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
        }
    }
}

/// Failure to install the global tracing subscriber.
#[derive(Debug, Error)]
#[error("Failed to initialize tracing: {0}")]
pub struct TracingInitError(String);

impl ObservabilityConfig {
    /// Install the global tracing subscriber.
    ///
    /// `RUST_LOG` takes precedence over the configured `log_level`.
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber is already installed.
    pub fn init_tracing(&self) -> Result<(), TracingInitError> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.log_level))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

        let registry = tracing_subscriber::registry().with(filter);

        let result = if self.json_logs {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
        } else {
            registry.with(tracing_subscriber::fmt::layer()).try_init()
        };

        result.map_err(|e| TracingInitError(e.to_string()))
    }
}
