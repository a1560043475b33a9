//! Middleware configuration errors.

use keel_core::session::MAX_SESSION_EXPIRE_HOURS;
use thiserror::Error;

/// Errors raised while building middleware stages.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    /// A whitelist entry is not a valid regular expression.
    #[error("whitelist path {pattern} is not a valid regex: {source}")]
    InvalidWhitelist {
        /// The offending pattern.
        pattern: String,
        /// The regex compile error.
        #[source]
        source: regex::Error,
    },

    /// A configured header name is not a valid HTTP header name.
    #[error("invalid header name: {0}")]
    InvalidHeaderName(String),

    /// The anonymous session lifetime is outside the accepted range.
    #[error("session expiry of {0} hours is outside 0..={max}", max = MAX_SESSION_EXPIRE_HOURS)]
    InvalidSessionExpiry(i64),

    /// ACL was enabled without a permission loader.
    #[error("ACL permission loader not set")]
    MissingPermissionLoader,
}
