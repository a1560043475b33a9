//! Configuration sections.
//!
//! Keys use camelCase in files (`sessionIdKey`, `targetHeader`), and every
//! section rejects unknown keys.

use crate::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:20808";
/// Default request identifier header.
pub const DEFAULT_TARGET_HEADER: &str = "x-request-id";
/// Default session token key.
pub const DEFAULT_SESSION_ID_KEY: &str = "kt-session-id";
/// Default anonymous session lifetime.
pub const DEFAULT_SESSION_EXPIRE_HOURS: u32 = 24;
/// Upper bound for `auth.sessionExpireInHours`.
pub const MAX_SESSION_EXPIRE_HOURS: u32 = 720;
/// Upper bound for `cors.maxAge`.
pub const MAX_CORS_MAX_AGE: u32 = 86_400;

/// Web server configuration.
///
/// ```
/// use keel_config::WebConfig;
///
/// let config = WebConfig::default();
/// assert_eq!(config.listen, "0.0.0.0:20808");
/// assert_eq!(config.auth.session_id_key, "kt-session-id");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct WebConfig {
    /// Listen address.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Debug mode.
    #[serde(default)]
    pub debug: bool,

    /// Trace stage.
    #[serde(default)]
    pub trace: TraceSection,

    /// Auth stage.
    #[serde(default)]
    pub auth: AuthSection,

    /// ACL stage.
    #[serde(default)]
    pub acl: AclSection,

    /// Audit stage.
    #[serde(default)]
    pub audit: AuditSection,

    /// CORS settings, applied by the host.
    #[serde(default)]
    pub cors: CorsSection,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            debug: false,
            trace: TraceSection::default(),
            auth: AuthSection::default(),
            acl: AclSection::default(),
            audit: AuditSection::default(),
            cors: CorsSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl WebConfig {
    /// Parses the listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|_| {
            ConfigError::invalid_value("listen", format!("invalid socket address: {}", self.listen))
        })
    }

    /// Validates value ranges and patterns.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;

        if self.auth.session_expire_in_hours > MAX_SESSION_EXPIRE_HOURS {
            return Err(ConfigError::invalid_value(
                "auth.sessionExpireInHours",
                format!("must be at most {MAX_SESSION_EXPIRE_HOURS}"),
            ));
        }

        for pattern in &self.auth.whitelist {
            if let Err(e) = Regex::new(pattern) {
                return Err(ConfigError::invalid_value(
                    "auth.whitelist",
                    format!("{pattern}: {e}"),
                ));
            }
        }

        if self.cors.max_age > MAX_CORS_MAX_AGE {
            return Err(ConfigError::invalid_value(
                "cors.maxAge",
                format!("must be at most {MAX_CORS_MAX_AGE}"),
            ));
        }

        Ok(())
    }
}

/// Trace stage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct TraceSection {
    /// Header carrying the request identifier.
    #[serde(default = "default_target_header")]
    pub target_header: String,
}

impl Default for TraceSection {
    fn default() -> Self {
        Self {
            target_header: default_target_header(),
        }
    }
}

/// Auth stage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AuthSection {
    /// Whether a session is required outside the whitelist.
    #[serde(default)]
    pub enabled: bool,

    /// Path regexes that may proceed without a session.
    #[serde(default)]
    pub whitelist: Vec<String>,

    /// Header and query parameter carrying the token.
    #[serde(default = "default_session_id_key")]
    pub session_id_key: String,

    /// Lifetime of anonymous sessions.
    #[serde(default = "default_session_expire_hours")]
    pub session_expire_in_hours: u32,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            enabled: false,
            whitelist: Vec::new(),
            session_id_key: default_session_id_key(),
            session_expire_in_hours: default_session_expire_hours(),
        }
    }
}

/// ACL stage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AclSection {
    /// Whether permissions are enforced.
    #[serde(default)]
    pub enabled: bool,
}

/// Audit stage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuditSection {
    /// Whether records are flushed.
    #[serde(default)]
    pub enabled: bool,
}

/// CORS settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CorsSection {
    /// Whether CORS headers are sent.
    #[serde(default)]
    pub enabled: bool,
    /// Allowed origins.
    #[serde(default)]
    pub allow_origins: Vec<String>,
    /// Allowed methods.
    #[serde(default)]
    pub allow_methods: Vec<String>,
    /// Allowed request headers.
    #[serde(default)]
    pub allow_headers: Vec<String>,
    /// Response headers exposed to scripts.
    #[serde(default)]
    pub expose_headers: Vec<String>,
    /// Whether credentials are allowed.
    #[serde(default)]
    pub allow_credentials: bool,
    /// Preflight cache lifetime in seconds.
    #[serde(default)]
    pub max_age: u32,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable output.
    Pretty,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Filter directive, e.g. `info` or `keel=debug,info`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_target_header() -> String {
    DEFAULT_TARGET_HEADER.to_string()
}

fn default_session_id_key() -> String {
    DEFAULT_SESSION_ID_KEY.to_string()
}

fn default_session_expire_hours() -> u32 {
    DEFAULT_SESSION_EXPIRE_HOURS
}

fn default_log_level() -> String {
    "info".to_string()
}
