//! # Structured Logging
//!
//! Subscriber setup for embedders that do not bring their own. The library
//! itself only emits `tracing` events; calling [`init_logging`] is optional.

use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::{LocalplaneError, Result};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive, overridable through `RUST_LOG`.
    pub level: String,
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

/// Install a global `tracing` subscriber. Fails if one is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let builder = fmt().with_env_filter(filter).with_target(true);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| {
        LocalplaneError::config_with_source("failed to install tracing subscriber", e)
    })
}
