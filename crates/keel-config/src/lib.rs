//! Typed configuration for keel.
//!
//! [`WebConfig`] holds the listen address, debug flag, one section per
//! middleware stage, CORS data for the host, and logging. [`ConfigLoader`]
//! layers defaults, a TOML file and environment overrides, then validates.
//!
//! # Configuration File Format
//!
//! ```toml
//! [web]
//! listen = "0.0.0.0:20808"
//! debug = false
//!
//! [web.trace]
//! targetHeader = "x-request-id"
//!
//! [web.auth]
//! enabled = true
//! whitelist = ["^/public", "^/health"]
//! sessionIdKey = "kt-session-id"
//! sessionExpireInHours = 24
//!
//! [web.acl]
//! enabled = true
//!
//! [web.audit]
//! enabled = true
//!
//! [web.logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! The `[web]` prefix is optional; a document without a `web` table is
//! read as the web configuration itself.

#![doc(html_root_url = "https://docs.rs/keel-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;

pub use config::*;
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
