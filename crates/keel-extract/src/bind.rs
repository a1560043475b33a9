//! Binding request data into payloads.
//!
//! [`bind`] picks its source from the request:
//!
//! | Body | Content type | Source |
//! |------|--------------|--------|
//! | empty | any | path parameters, then the query string (sequences bind to `[]`) |
//! | non-empty | `application/json` | path parameters, then the JSON body |
//! | non-empty | `application/x-www-form-urlencoded` | path parameters, then the form body |
//! | non-empty | anything else | [`BindError::UnsupportedMediaType`] |
//!
//! A field set by the body overrides a path parameter of the same name.

use crate::error::BindError;
use crate::payload::{Payload, PayloadKind};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, Uri};
use http_body_util::{BodyExt, Full};
use serde_json::Value;

const MIME_JSON: &str = "application/json";
const MIME_FORM: &str = "application/x-www-form-urlencoded";

/// The raw request body, kept in the request store when duplicate binding
/// is allowed so later stages can read it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBody(pub Bytes);

/// Everything a binder may read from a request.
#[derive(Debug, Clone)]
pub struct BindContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    path_params: Vec<(String, String)>,
}

impl BindContext {
    /// Creates a binding context.
    #[must_use]
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        path_params: Vec<(String, String)>,
    ) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
            path_params,
        }
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the request body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the path parameters captured by the router.
    #[must_use]
    pub fn path_params(&self) -> &[(String, String)] {
        &self.path_params
    }

    /// Returns the media type of the body, lower-cased and without
    /// parameters.
    #[must_use]
    pub fn media_type(&self) -> Option<String> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
    }
}

/// Reads a buffered body into bytes.
pub async fn collect_body(body: Full<Bytes>) -> Bytes {
    match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(never) => match never {},
    }
}

/// Binds request data into a payload of type `P`.
pub fn bind<P: Payload>(ctx: &BindContext) -> Result<P, BindError> {
    if ctx.body.is_empty() {
        return match P::KIND {
            PayloadKind::Sequence => Ok(serde_json::from_slice(b"[]")?),
            PayloadKind::Value | PayloadKind::Boxed => bind_params(ctx),
        };
    }

    match ctx.media_type().as_deref() {
        Some(MIME_JSON) => bind_json(ctx),
        Some(MIME_FORM) => bind_form(ctx),
        Some(other) => Err(BindError::UnsupportedMediaType(other.to_string())),
        None => Err(BindError::UnsupportedMediaType("none".to_string())),
    }
}

/// Binds a JSON body, filling fields it leaves unset from path parameters.
///
/// Numeric and boolean parameters are tried as JSON scalars first, then as
/// strings.
fn bind_json<P: Payload>(ctx: &BindContext) -> Result<P, BindError> {
    if ctx.path_params.is_empty() || P::KIND == PayloadKind::Sequence {
        return Ok(serde_json::from_slice(&ctx.body)?);
    }

    let mut body: Value = serde_json::from_slice(&ctx.body)?;
    let Some(fields) = body.as_object_mut() else {
        return Ok(serde_json::from_value(body)?);
    };
    let mut typed = fields.clone();
    for (name, value) in &ctx.path_params {
        if !fields.contains_key(name) {
            typed.insert(name.clone(), scalar(value));
            fields.insert(name.clone(), Value::String(value.clone()));
        }
    }

    match serde_json::from_value(Value::Object(typed)) {
        Ok(payload) => Ok(payload),
        Err(err) => serde_json::from_value(body).map_err(|_| BindError::Json(err)),
    }
}

fn scalar(value: &str) -> Value {
    serde_json::from_str::<Value>(value)
        .ok()
        .filter(|v| v.is_number() || v.is_boolean())
        .unwrap_or_else(|| Value::String(value.to_string()))
}

/// Binds a form body, filling fields it leaves unset from path parameters.
fn bind_form<P: Payload>(ctx: &BindContext) -> Result<P, BindError> {
    if ctx.path_params.is_empty() {
        return serde_urlencoded::from_bytes(&ctx.body).map_err(BindError::Form);
    }

    let fields: Vec<(String, String)> =
        serde_urlencoded::from_bytes(&ctx.body).map_err(BindError::Form)?;
    let merged = serde_urlencoded::to_string(with_missing(fields, &ctx.path_params))?;
    serde_urlencoded::from_str(&merged).map_err(BindError::Form)
}

/// Binds path parameters and the query string. Path parameters win when a
/// name appears in both.
fn bind_params<P: Payload>(ctx: &BindContext) -> Result<P, BindError> {
    let query = ctx.uri.query().unwrap_or_default();
    if ctx.path_params.is_empty() {
        return serde_urlencoded::from_str(query).map_err(BindError::Params);
    }

    let query_pairs: Vec<(String, String)> =
        serde_urlencoded::from_str(query).map_err(BindError::Params)?;
    let merged = serde_urlencoded::to_string(with_missing(ctx.path_params.clone(), &query_pairs))?;
    serde_urlencoded::from_str(&merged).map_err(BindError::Params)
}

/// Appends the `extra` pairs whose names `pairs` does not already hold.
fn with_missing(
    mut pairs: Vec<(String, String)>,
    extra: &[(String, String)],
) -> Vec<(String, String)> {
    let missing: Vec<(String, String)> = extra
        .iter()
        .filter(|(name, _)| !pairs.iter().any(|(p, _)| p == name))
        .cloned()
        .collect();
    pairs.extend(missing);
    pairs
}
