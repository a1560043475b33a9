//! Response envelope and error classification.
//!
//! Every response body produced by keel is an [`Envelope`]:
//!
//! ```json
//! {"code": 0, "msg": "Success", "data": {"a": 1}}
//! {"code": 4401, "msg": "Unauthorized or session expired"}
//! ```
//!
//! [`classify`] maps a [`WebError`] to an HTTP status and an envelope, and
//! [`redact`] replaces the message of any code at or above
//! [`code::INTERNAL_SERVER`]. Redaction is a pure function of the code, so
//! applying it twice gives the same envelope as applying it once.

use crate::code;
use crate::error::{ErrCategory, WebError};
use crate::types::Response;
use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use http_body_util::Full;
use serde::{Deserialize, Serialize};

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// The uniform `{code, msg, data}` response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Business code; `0` is success.
    pub code: i32,
    /// Message.
    pub msg: String,
    /// Payload. `Some(Value::Null)` serialises as `null`; `None` omits the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Envelope {
    /// A success envelope. A missing payload is sent as `"data": null`.
    #[must_use]
    pub fn success(data: Option<serde_json::Value>) -> Self {
        Self {
            code: code::OK,
            msg: code::code_text(code::OK).to_string(),
            data: Some(data.unwrap_or(serde_json::Value::Null)),
        }
    }

    /// An error envelope without payload.
    #[must_use]
    pub fn error(code: i32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: None,
        }
    }

    /// Returns `true` if this envelope reports success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == code::OK
    }
}

/// Summary of the error behind an error response.
///
/// Attached to the response extensions by [`error_response`] so that outer
/// layers (audit, the global error handler) can see what happened without
/// parsing the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorOutcome {
    /// Envelope code that was sent.
    pub code: i32,
    /// Category tag of the original error.
    pub category: ErrCategory,
    /// Unredacted message.
    pub message: String,
    /// Error rendered with its source chain.
    pub detail: String,
}

impl ErrorOutcome {
    /// Returns `true` if the outcome should be logged as a server failure.
    #[must_use]
    pub const fn is_server_failure(&self) -> bool {
        code::is_redacted(self.code)
    }
}

/// Maps an error to its HTTP status and unredacted envelope.
#[must_use]
pub fn classify(err: &WebError) -> (StatusCode, Envelope) {
    match err {
        WebError::Biz(biz) => (
            StatusCode::OK,
            Envelope {
                code: biz.code,
                msg: biz.msg.clone(),
                data: biz.data.clone(),
            },
        ),
        WebError::Validation(errors) => (
            StatusCode::OK,
            Envelope::error(code::BAD_REQUEST, format!("Bad Request: {errors}")),
        ),
        WebError::Http { status, message } => (
            *status,
            Envelope::error(code::http_status_to_code(status.as_u16()), message.clone()),
        ),
        WebError::Internal { message, .. } => (
            StatusCode::OK,
            Envelope::error(code::INTERNAL_SERVER, message.clone()),
        ),
    }
}

/// Replaces the message of server-failure envelopes.
#[must_use]
pub fn redact(mut envelope: Envelope) -> Envelope {
    if code::is_redacted(envelope.code) {
        envelope.msg = code::REDACTED_MESSAGE.to_string();
    }
    envelope
}

/// Classifies, redacts, and renders an error as a JSON response.
///
/// The response carries an [`ErrorOutcome`] extension.
#[must_use]
pub fn error_response(err: &WebError) -> Response {
    let (status, envelope) = classify(err);
    let outcome = ErrorOutcome {
        code: envelope.code,
        category: err.category(),
        message: envelope.msg.clone(),
        detail: err.detail(),
    };
    let mut response = envelope_response(status, &redact(envelope));
    response.extensions_mut().insert(outcome);
    response
}

/// Renders a success envelope.
#[must_use]
pub fn success_response(data: Option<serde_json::Value>) -> Response {
    envelope_response(StatusCode::OK, &Envelope::success(data))
}

/// Renders an envelope with the given status.
#[must_use]
pub fn envelope_response(status: StatusCode, envelope: &Envelope) -> Response {
    match serde_json::to_vec(envelope) {
        Ok(body) => json_body(status, body),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialise envelope");
            json_body(
                StatusCode::OK,
                format!(
                    r#"{{"code":{},"msg":"{}"}}"#,
                    code::INTERNAL_SERVER,
                    code::REDACTED_MESSAGE
                )
                .into_bytes(),
            )
        }
    }
}

/// Renders an arbitrary serialisable value as a bare JSON response.
pub fn json_response<T: Serialize + ?Sized>(value: &T) -> Result<Response, WebError> {
    let body = serde_json::to_vec(value)
        .map_err(|e| WebError::internal_with_source("failed to serialise response", e))?;
    Ok(json_body(StatusCode::OK, body))
}

fn json_body(status: StatusCode, body: Vec<u8>) -> Response {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(JSON_CONTENT_TYPE),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BizError, FieldErrors};
    use http_body_util::BodyExt;
    use proptest::prelude::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_success_with_payload() {
        let response = success_response(Some(serde_json::json!({"a": 1})));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"code": 0, "msg": "Success", "data": {"a": 1}})
        );
    }

    #[tokio::test]
    async fn test_success_without_payload_sends_null() {
        let response = success_response(None);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"code": 0, "msg": "Success", "data": null})
        );
    }

    #[test]
    fn test_classify_business_error() {
        let (status, envelope) = classify(&BizError::not_found().into());
        assert_eq!(status, StatusCode::OK);
        assert_eq!(envelope.code, code::NOT_FOUND);
        assert_eq!(envelope.msg, "Record not found");
    }

    #[test]
    fn test_classify_validation_error() {
        let err = WebError::validation(FieldErrors::single("name", "required"));
        let (status, envelope) = classify(&err);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(envelope.code, code::BAD_REQUEST);
        assert_eq!(envelope.msg, "Bad Request: name: required");
    }

    #[test]
    fn test_classify_transport_error() {
        let err = WebError::http(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        let (status, envelope) = classify(&err);
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(envelope.code, 4405);
    }

    #[test]
    fn test_classify_internal_error() {
        let (status, envelope) = classify(&WebError::internal("db down"));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(envelope.code, code::INTERNAL_SERVER);
        assert_eq!(envelope.msg, "db down");
    }

    #[tokio::test]
    async fn test_error_response_redacts_and_records_outcome() {
        let response = error_response(&WebError::internal("db password is hunter2"));
        let outcome = response.extensions().get::<ErrorOutcome>().cloned().unwrap();
        assert_eq!(outcome.code, code::INTERNAL_SERVER);
        assert_eq!(outcome.category, ErrCategory::Generic);
        assert!(outcome.is_server_failure());
        assert_eq!(outcome.message, "db password is hunter2");

        let body = body_json(response).await;
        assert_eq!(body["msg"], code::REDACTED_MESSAGE);
        assert!(body.get("data").is_none());
    }

    #[test]
    fn test_client_errors_pass_through() {
        let envelope = redact(Envelope::error(code::INVALID_PARAMS, "age: too young"));
        assert_eq!(envelope.msg, "age: too young");
    }

    #[test]
    fn test_redaction_is_idempotent() {
        let once = redact(Envelope::error(code::INTERNAL_SERVER, "stack trace"));
        let twice = redact(once.clone());
        assert_eq!(once, twice);
        assert_eq!(twice.msg, code::REDACTED_MESSAGE);
    }

    proptest! {
        #[test]
        fn redaction_idempotent_for_any_code(c in -10_000i32..10_000, msg in ".*") {
            let once = redact(Envelope::error(c, msg.clone()));
            let twice = redact(once.clone());
            prop_assert_eq!(&once, &twice);
            if c >= code::INTERNAL_SERVER {
                prop_assert_eq!(once.msg.as_str(), code::REDACTED_MESSAGE);
            } else {
                prop_assert_eq!(once.msg, msg);
            }
        }
    }
}
