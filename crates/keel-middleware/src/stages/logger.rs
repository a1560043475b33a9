//! Access-log middleware.
//!
//! Logs a `<<<<<<<<<<` line when a request arrives and a `>>>>>>>>>>` line
//! when its response leaves, both carrying the client address, method and
//! path with query:
//!
//! ```text
//! <<<<<<<<<< 10.0.0.7 | POST /orders?dry=1
//! >>>>>>>>>> 10.0.0.7 | 200 | 1.204ms | POST /orders?dry=1
//! ```
//!
//! The response line is `info` for statuses 200 through 300 and `warn`
//! otherwise. Headers and bodies of the selected content types follow at
//! `debug`; headers named in [`LoggerMiddlewareBuilder::hide_headers`] are
//! masked. Installed with [`PipelineBuilder::layer`](crate::PipelineBuilder::layer)
//! it runs inside the trace span, so every line carries the request id.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::skipper::{self, Skipper};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use http_body_util::{BodyExt, Full};
use keel_core::{Request, Response};
use std::collections::HashSet;
use std::time::Instant;

/// Content types whose bodies can be dumped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// `application/x-www-form-urlencoded`
    Form,
    /// `multipart/form-data`
    MultipartForm,
    /// `application/json`
    Json,
    /// `text/html`
    Html,
    /// `text/plain`
    TextPlain,
    /// `text/xml`
    Xml,
    /// `application/javascript`
    JavaScript,
    /// Any content type.
    All,
}

impl BodyKind {
    fn matches(self, content_type: &str) -> bool {
        let mime = match self {
            Self::All => return true,
            Self::Form => "application/x-www-form-urlencoded",
            Self::MultipartForm => "multipart/form-data",
            Self::Json => "application/json",
            Self::Html => "text/html",
            Self::TextPlain => "text/plain",
            Self::Xml => "text/xml",
            Self::JavaScript => "application/javascript",
        };
        content_type.contains(mime)
    }
}

const DEFAULT_BODY_KINDS: [BodyKind; 3] = [BodyKind::Form, BodyKind::Xml, BodyKind::Json];

/// Middleware that writes access logs.
#[derive(Clone)]
pub struct LoggerMiddleware {
    skipper: Skipper,
    request_headers: bool,
    request_body: bool,
    response_headers: bool,
    response_body: bool,
    body_kinds: Vec<BodyKind>,
    hidden: HashSet<String>,
}

impl LoggerMiddleware {
    /// Creates the middleware logging headers and form, XML and JSON bodies.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder.
    #[must_use]
    pub fn builder() -> LoggerMiddlewareBuilder {
        LoggerMiddlewareBuilder::default()
    }

    fn dumps(&self, headers: &HeaderMap) -> bool {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        self.body_kinds.iter().any(|kind| kind.matches(content_type))
    }
}

impl Default for LoggerMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LoggerMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerMiddleware")
            .field("request_headers", &self.request_headers)
            .field("request_body", &self.request_body)
            .field("response_headers", &self.response_headers)
            .field("response_body", &self.response_body)
            .field("body_kinds", &self.body_kinds)
            .field("hidden", &self.hidden)
            .finish_non_exhaustive()
    }
}

impl Middleware for LoggerMiddleware {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let view = ctx.view(&request);
            if (self.skipper)(&view) {
                return next.run(ctx, request).await;
            }

            let begin = Instant::now();
            let client_ip = view.client_ip();
            let method = request.method().clone();
            let url = view.path_and_query().to_string();
            tracing::info!("<<<<<<<<<< {client_ip} | {method} {url}");

            if self.request_headers {
                log_headers(request.headers(), &self.hidden);
            }
            let mut request = request;
            if self.request_body && self.dumps(request.headers()) {
                let (parts, body) = request.into_parts();
                let bytes = buffer(body).await;
                log_body(&bytes, parts.headers.get(CONTENT_TYPE).is_some_and(is_json));
                request = Request::from_parts(parts, Full::new(bytes));
            }

            let mut response = next.run(ctx, request).await;

            let status = response.status();
            let latency = begin.elapsed();
            if is_success(status) {
                tracing::info!(
                    ">>>>>>>>>> {client_ip} | {:3} | {latency:?} | {method} {url}",
                    status.as_u16()
                );
            } else {
                tracing::warn!(
                    ">>>>>>>>>> {client_ip} | {:3} | {latency:?} | {method} {url}",
                    status.as_u16()
                );
            }

            if self.response_headers {
                log_headers(response.headers(), &self.hidden);
            }
            if self.response_body && self.dumps(response.headers()) {
                let (parts, body) = response.into_parts();
                let bytes = buffer(body).await;
                log_body(&bytes, false);
                response = Response::from_parts(parts, Full::new(bytes));
            }
            response
        })
    }
}

/// Builder for [`LoggerMiddleware`].
pub struct LoggerMiddlewareBuilder {
    skipper: Skipper,
    request_headers: bool,
    request_body: bool,
    response_headers: bool,
    response_body: bool,
    body_kinds: Vec<BodyKind>,
    hidden: HashSet<String>,
}

impl Default for LoggerMiddlewareBuilder {
    fn default() -> Self {
        Self {
            skipper: skipper::never(),
            request_headers: true,
            request_body: true,
            response_headers: true,
            response_body: true,
            body_kinds: DEFAULT_BODY_KINDS.to_vec(),
            hidden: HashSet::new(),
        }
    }
}

impl LoggerMiddlewareBuilder {
    /// Bypasses logging for requests matching `skipper`.
    #[must_use]
    pub fn skipper(mut self, skipper: Skipper) -> Self {
        self.skipper = skipper;
        self
    }

    /// Logs request headers.
    #[must_use]
    pub fn request_headers(mut self, enabled: bool) -> Self {
        self.request_headers = enabled;
        self
    }

    /// Dumps request bodies of the selected content types.
    #[must_use]
    pub fn request_body(mut self, enabled: bool) -> Self {
        self.request_body = enabled;
        self
    }

    /// Logs response headers.
    #[must_use]
    pub fn response_headers(mut self, enabled: bool) -> Self {
        self.response_headers = enabled;
        self
    }

    /// Dumps response bodies of the selected content types.
    #[must_use]
    pub fn response_body(mut self, enabled: bool) -> Self {
        self.response_body = enabled;
        self
    }

    /// Replaces the content types whose bodies are dumped.
    ///
    /// An empty list keeps the default of form, XML and JSON.
    #[must_use]
    pub fn body_kinds(mut self, kinds: impl IntoIterator<Item = BodyKind>) -> Self {
        let kinds: Vec<BodyKind> = kinds.into_iter().collect();
        if !kinds.is_empty() {
            self.body_kinds = kinds;
        }
        self
    }

    /// Masks the values of the named headers, matched case-insensitively.
    #[must_use]
    pub fn hide_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.hidden
            .extend(names.into_iter().map(|n| n.as_ref().to_ascii_lowercase()));
        self
    }

    /// Builds the middleware.
    #[must_use]
    pub fn build(self) -> LoggerMiddleware {
        LoggerMiddleware {
            skipper: self.skipper,
            request_headers: self.request_headers,
            request_body: self.request_body,
            response_headers: self.response_headers,
            response_body: self.response_body,
            body_kinds: self.body_kinds,
            hidden: self.hidden,
        }
    }
}

fn is_success(status: StatusCode) -> bool {
    (200..=300).contains(&status.as_u16())
}

fn is_json(value: &http::HeaderValue) -> bool {
    value.to_str().is_ok_and(|v| v.contains("application/json"))
}

async fn buffer(body: Full<Bytes>) -> Bytes {
    match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(never) => match never {},
    }
}

fn log_headers(headers: &HeaderMap, hidden: &HashSet<String>) {
    let lines = header_lines(headers, hidden);
    if lines.is_empty() {
        return;
    }
    tracing::debug!("Headers:");
    for line in lines {
        tracing::debug!("{line}");
    }
}

/// Renders headers as `  name : value` lines. Hidden values are masked,
/// and dropped entirely when they are 8 characters or shorter.
fn header_lines(headers: &HeaderMap, hidden: &HashSet<String>) -> Vec<String> {
    headers
        .keys()
        .filter_map(|name| {
            let value = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()))
                .collect::<Vec<_>>()
                .join(" ");
            if !hidden.contains(name.as_str()) {
                return Some(format!("  {name} : {value}"));
            }
            (value.chars().count() > 8).then(|| format!("  {name} : {}", mask(&value)))
        })
        .collect()
}

fn log_body(bytes: &Bytes, compact_json: bool) {
    if bytes.is_empty() {
        return;
    }
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if compact_json {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) {
            text = value.to_string();
        }
    }
    tracing::debug!("Body:");
    for line in text.lines() {
        tracing::debug!("{line}");
    }
}

/// Masks the middle of a secret, keeping a few characters at each end.
///
/// ```text
/// a          → *
/// ab         → a*
/// abcdef     → a****f
/// abcdefghij → abc****hij
/// longer     → first four, stars, last four
/// ```
#[must_use]
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let (head, tail) = match chars.len() {
        0 => return String::new(),
        1 => return "*".to_string(),
        2 => (1, 0),
        3..=6 => (1, 1),
        7..=10 => (3, 3),
        _ => (4, 4),
    };
    let stars = chars.len() - head - tail;
    let mut masked: String = chars[..head].iter().collect();
    masked.push_str(&"*".repeat(stars));
    masked.extend(&chars[chars.len() - tail..]);
    masked
}
