//! Process-wide tracing subscriber setup.
//!
//! Library code logs through both the `log` facade and `tracing`; `log`
//! records are forwarded into the subscriber by `tracing-log`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::{LogFormat, LoggingConfig};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{directive}': {message}")]
    InvalidFilter { directive: String, message: String },

    #[error("Failed to install subscriber: {0}")]
    Install(String),
}

/// Builds the filter from `RUST_LOG`, falling back to the configured level.
pub fn build_filter(default_directive: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_directive).map_err(|e| LoggingError::InvalidFilter {
            directive: default_directive.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Installs the global subscriber. Call once, at process start.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    tracing_log::LogTracer::init().map_err(|e| LoggingError::Install(e.to_string()))?;

    let filter = build_filter(&config.level)?;
    let registry = Registry::default().with(filter);

    let result = match config.format {
        LogFormat::Pretty => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().with_target(true)))
        }
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_current_span(true)),
        ),
    };

    result.map_err(|e| LoggingError::Install(e.to_string()))
}
