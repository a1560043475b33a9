//! Telemetry error types.

use thiserror::Error;

/// Errors raised while installing telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The filter directive is invalid or a subscriber is already installed.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),
}
