//! Binding error types.

use keel_core::{code, WebError};
use thiserror::Error;

/// Error raised while binding request data into a payload.
///
/// Every variant is a client input error. Converting into [`WebError`]
/// yields a `4400` business error whose message starts with `Bad Request:`.
///
/// # Example
///
/// ```rust
/// use keel_core::{code, WebError};
/// use keel_extract::BindError;
///
/// let err = BindError::UnsupportedMediaType("text/plain".into());
/// let web: WebError = err.into();
/// assert_eq!(web.to_string(), "[4400] Bad Request: unsupported content type 'text/plain'");
/// ```
#[derive(Debug, Error)]
pub enum BindError {
    /// The JSON body did not deserialize into the payload.
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    /// The form body did not deserialize into the payload.
    #[error("invalid form body: {0}")]
    Form(#[source] serde_urlencoded::de::Error),

    /// Query or path parameters did not deserialize into the payload.
    #[error("invalid parameters: {0}")]
    Params(#[source] serde_urlencoded::de::Error),

    /// Path and query parameters could not be merged.
    #[error("failed to merge parameters: {0}")]
    Merge(#[from] serde_urlencoded::ser::Error),

    /// The body has a content type no binder understands.
    #[error("unsupported content type '{0}'")]
    UnsupportedMediaType(String),
}

impl From<BindError> for WebError {
    fn from(err: BindError) -> Self {
        WebError::biz_msg(code::BAD_REQUEST, format!("Bad Request: {err}"))
    }
}
