//! Server and registration errors.

use keel_config::ConfigError;
use keel_middleware::MiddlewareError;
use std::net::SocketAddr;
use thiserror::Error;

/// A handler or route that cannot be registered.
///
/// Raised before any request is served.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// More than two inputs.
    #[error("'{handler}' not valid: takes {count} inputs, expected 0, 1 (context or payload) or 2 (context, payload)")]
    TooManyInputs {
        /// Handler name.
        handler: String,
        /// Declared input count.
        count: usize,
    },

    /// Two inputs, but the first is not the request context.
    #[error("'{handler}' not valid: the first of two inputs must be the request context")]
    ContextNotFirst {
        /// Handler name.
        handler: String,
    },

    /// Two inputs, but the second is not a payload.
    #[error("'{handler}' not valid: the second of two inputs must be a payload")]
    PayloadNotSecond {
        /// Handler name.
        handler: String,
    },

    /// No outputs, or more than two.
    #[error("'{handler}' not valid: returns {count} outputs, expected 1 (error) or 2 (data, error)")]
    OutputCount {
        /// Handler name.
        handler: String,
        /// Declared output count.
        count: usize,
    },

    /// The last output is not an error.
    #[error("'{handler}' not valid: the last output must be an error")]
    LastOutputNotError {
        /// Handler name.
        handler: String,
    },

    /// Two outputs, but the first is not data.
    #[error("'{handler}' not valid: the first of two outputs must be data")]
    DataNotFirst {
        /// Handler name.
        handler: String,
    },

    /// A route pattern that cannot be parsed.
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern as given.
        pattern: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The same method and pattern were registered twice.
    #[error("duplicate route {method} {pattern}")]
    DuplicateRoute {
        /// HTTP method.
        method: String,
        /// Route pattern.
        pattern: String,
    },
}

/// Errors from building or running a [`Web`](crate::Web) instance.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A route could not be registered.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// A middleware stage rejected its configuration.
    #[error(transparent)]
    Middleware(#[from] MiddlewareError),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The listen address does not parse.
    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An I/O error while serving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_messages_name_the_handler() {
        let err = RegistrationError::TooManyInputs {
            handler: "create_order".into(),
            count: 3,
        };
        assert!(err.to_string().starts_with("'create_order' not valid"));
    }

    #[test]
    fn test_registration_converts_into_server_error() {
        let err: ServerError = RegistrationError::DuplicateRoute {
            method: "GET".into(),
            pattern: "/orders".into(),
        }
        .into();
        assert_eq!(err.to_string(), "duplicate route GET /orders");
    }
}
