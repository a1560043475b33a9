//! # Keel Telemetry
//!
//! Logging for keel services over `tracing-subscriber`.
//!
//! - [`logging::init_logging`] installs an env-filtered JSON or pretty
//!   formatter
//! - [`logging::LogConfig`] can be built from the `logging` section of a
//!   [`keel_config::WebConfig`]

#![doc(html_root_url = "https://docs.rs/keel-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
