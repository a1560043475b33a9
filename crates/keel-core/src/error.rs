//! Error types for keel.
//!
//! [`WebError`] is what business functions, middleware stages, and
//! callbacks return. It has four kinds, matching the four classification
//! rules applied by [`crate::envelope::classify`]:
//!
//! | Kind | HTTP status | Envelope code |
//! |---|---|---|
//! | [`WebError::Biz`] | 200 | the error's own code |
//! | [`WebError::Validation`] | 200 | [`code::BAD_REQUEST`] |
//! | [`WebError::Http`] | the carried status | [`code::http_status_to_code`] |
//! | [`WebError::Internal`] | 200 | [`code::INTERNAL_SERVER`] |
//!
//! `anyhow::Error` converts into [`WebError::Internal`], so business code can
//! use `?` on arbitrary fallible calls and have the failure classified as an
//! unclassified server error.

use crate::code;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Result type alias using [`WebError`].
pub type WebResult<T> = Result<T, WebError>;

/// Numeric tag logged alongside server-side failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrCategory {
    /// No error, or an error of unknown shape.
    Default = 0,
    /// A [`BizError`].
    Business = 1,
    /// A validation failure.
    Validation = 2,
    /// A status-bearing transport error.
    Transport = 3,
    /// Anything else.
    Generic = 4,
}

impl ErrCategory {
    /// Returns the numeric tag.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }
}

/// An error that already carries its business code.
///
/// # Example
///
/// ```
/// use keel_core::{code, BizError};
///
/// let err = BizError::not_found().with_msg_text("no such user");
/// assert_eq!(err.code, code::NOT_FOUND);
/// assert_eq!(err.msg, "no such user");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BizError {
    /// Business code.
    pub code: i32,
    /// Message shown to the client (unless redacted).
    pub msg: String,
    /// Optional payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl BizError {
    /// Creates an error with the default text for `code`.
    #[must_use]
    pub fn new(code: i32) -> Self {
        Self {
            code,
            msg: code::code_text(code).to_string(),
            data: None,
        }
    }

    /// Creates an error with an explicit message.
    #[must_use]
    pub fn with_msg(code: i32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: None,
        }
    }

    /// A success value carrying `data`.
    #[must_use]
    pub fn ok(data: impl Serialize) -> Self {
        Self {
            code: code::OK,
            msg: code::code_text(code::OK).to_string(),
            data: Some(serde_json::to_value(data).unwrap_or(serde_json::Value::Null)),
        }
    }

    /// Replaces the message.
    #[must_use]
    pub fn with_msg_text(mut self, msg: impl Into<String>) -> Self {
        self.msg = msg.into();
        self
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }

    /// `4400`.
    #[must_use]
    pub fn bad_request() -> Self {
        Self::new(code::BAD_REQUEST)
    }

    /// `4401`.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(code::UNAUTHORIZED)
    }

    /// `4403`.
    #[must_use]
    pub fn forbidden() -> Self {
        Self::new(code::FORBIDDEN)
    }

    /// `4404`.
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(code::NOT_FOUND)
    }

    /// `4409`.
    #[must_use]
    pub fn duplicate() -> Self {
        Self::new(code::DUPLICATE_ADD)
    }

    /// `4422`.
    #[must_use]
    pub fn invalid_params() -> Self {
        Self::new(code::INVALID_PARAMS)
    }

    /// `2000`.
    #[must_use]
    pub fn opt() -> Self {
        Self::new(code::OPT_ERR)
    }

    /// `6000`.
    #[must_use]
    pub fn internal() -> Self {
        Self::new(code::INTERNAL_ERR)
    }

    /// `6001`.
    #[must_use]
    pub fn record_create() -> Self {
        Self::new(code::RECORD_CREATE_ERR)
    }

    /// `6002`.
    #[must_use]
    pub fn record_update() -> Self {
        Self::new(code::RECORD_UPDATE_ERR)
    }

    /// `6003`.
    #[must_use]
    pub fn record_retrieve() -> Self {
        Self::new(code::RECORD_RETRIEVE_ERR)
    }

    /// `6004`.
    #[must_use]
    pub fn record_delete() -> Self {
        Self::new(code::RECORD_DELETE_ERR)
    }
}

impl fmt::Display for BizError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.msg)
    }
}

impl std::error::Error for BizError {}

/// Field-specific validation errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrors {
    /// Map of field path to list of error messages.
    pub fields: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    /// Creates a new empty `FieldErrors`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set holding a single field error.
    #[must_use]
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Adds an error for a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Merges `other` into `self`, prefixing its field paths with `prefix`.
    pub fn merge_prefixed(&mut self, prefix: &str, other: Self) {
        for (field, messages) in other.fields {
            let key = if field.is_empty() {
                prefix.to_string()
            } else {
                format!("{prefix}.{field}")
            };
            self.fields.entry(key).or_default().extend(messages);
        }
    }

    /// Returns `true` if there are no field errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the number of fields with errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// One-line rendering, `field: message; field: message`.
    #[must_use]
    pub fn summary(&self) -> String {
        self.fields
            .iter()
            .flat_map(|(field, messages)| {
                messages.iter().map(move |m| {
                    if field.is_empty() {
                        m.clone()
                    } else {
                        format!("{field}: {m}")
                    }
                })
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

impl std::error::Error for FieldErrors {}

/// Standard error type for keel.
#[derive(Error, Debug)]
pub enum WebError {
    /// A business outcome that carries its own code.
    #[error("{0}")]
    Biz(BizError),

    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(FieldErrors),

    /// A status-bearing transport error, e.g. an unknown route.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status to send.
        status: StatusCode,
        /// Human-readable error message.
        message: String,
    },

    /// Unclassified server failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl WebError {
    /// Creates a business error with the default text for `code`.
    #[must_use]
    pub fn biz(code: i32) -> Self {
        Self::Biz(BizError::new(code))
    }

    /// Creates a business error with an explicit message.
    #[must_use]
    pub fn biz_msg(code: i32, msg: impl Into<String>) -> Self {
        Self::Biz(BizError::with_msg(code, msg))
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }

    /// Creates a transport-level error.
    #[must_use]
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// `4401` with the default text.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::Biz(BizError::unauthorized())
    }

    /// `4403` with the default text.
    #[must_use]
    pub fn forbidden() -> Self {
        Self::Biz(BizError::forbidden())
    }

    /// Returns the category tag of this error.
    #[must_use]
    pub const fn category(&self) -> ErrCategory {
        match self {
            Self::Biz(_) => ErrCategory::Business,
            Self::Validation(_) => ErrCategory::Validation,
            Self::Http { .. } => ErrCategory::Transport,
            Self::Internal { .. } => ErrCategory::Generic,
        }
    }

    /// Renders the error and its source chain on one line, for logs.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Internal {
                message,
                source: Some(source),
            } => format!("{message}: {source:#}"),
            other => other.to_string(),
        }
    }
}

impl From<BizError> for WebError {
    fn from(err: BizError) -> Self {
        Self::Biz(err)
    }
}

impl From<FieldErrors> for WebError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<anyhow::Error> for WebError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<std::convert::Infallible> for WebError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_biz_error_default_text() {
        let err = BizError::forbidden();
        assert_eq!(err.code, code::FORBIDDEN);
        assert_eq!(err.msg, "Forbidden");
        assert_eq!(err.to_string(), "[4403] Forbidden");
    }

    #[test]
    fn test_biz_error_with_data() {
        let err = BizError::duplicate().with_data(serde_json::json!({"id": 7}));
        assert_eq!(err.data, Some(serde_json::json!({"id": 7})));
    }

    #[test]
    fn test_categories() {
        assert_eq!(WebError::biz(code::NOT_FOUND).category(), ErrCategory::Business);
        assert_eq!(
            WebError::validation(FieldErrors::single("name", "required")).category(),
            ErrCategory::Validation
        );
        assert_eq!(
            WebError::http(StatusCode::NOT_FOUND, "missing").category(),
            ErrCategory::Transport
        );
        assert_eq!(WebError::internal("boom").category(), ErrCategory::Generic);
        assert_eq!(ErrCategory::Generic.tag(), 4);
    }

    #[test]
    fn test_anyhow_converts_to_internal() {
        let err: WebError = anyhow::anyhow!("disk full").context("writing order").into();
        assert!(matches!(err, WebError::Internal { .. }));
        assert!(err.detail().contains("disk full"));
    }

    #[test]
    fn test_field_errors_summary() {
        let mut errors = FieldErrors::new();
        errors.add("name", "required");
        errors.add("age", "must be positive");
        assert_eq!(errors.summary(), "age: must be positive; name: required");
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_field_errors_merge_prefixed() {
        let mut errors = FieldErrors::new();
        errors.merge_prefixed("[1]", FieldErrors::single("name", "required"));
        errors.merge_prefixed("[2]", FieldErrors::single("", "empty"));
        assert_eq!(errors.fields["[1].name"], vec!["required".to_string()]);
        assert_eq!(errors.fields["[2]"], vec!["empty".to_string()]);
    }

    #[test]
    fn test_field_errors_into_result() {
        assert!(FieldErrors::new().into_result().is_ok());
        let err = FieldErrors::single("sku", "required").into_result().unwrap_err();
        assert_eq!(err.len(), 1);
    }
}
