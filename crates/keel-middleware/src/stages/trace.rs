//! Trace middleware.
//!
//! Assigns every request an identifier and a span tagged with it. The
//! identifier is taken from the configured request header when the client
//! sent one; otherwise a new one is generated (see
//! [`keel_core::trace::generate_trace_id`]). The identifier is echoed back
//! on every response, including short-circuited ones.

use crate::context::MiddlewareContext;
use crate::error::MiddlewareError;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::skipper::{self, Skipper};
use http::header::{HeaderName, HeaderValue};
use keel_core::trace::{generate_trace_id, DEFAULT_TRACE_HEADER};
use keel_core::{Pool, Request, RequestView, Response, TraceInfo};
use std::sync::Arc;
use tracing::Instrument;

/// Produces identifiers for requests that arrive without one.
pub type TraceIdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Called with every assigned identifier before the request moves on.
pub type TraceIdHook = Arc<dyn Fn(&RequestView, &str) + Send + Sync>;

/// Middleware that attaches [`TraceInfo`] to the request.
#[derive(Clone)]
pub struct TraceMiddleware {
    header: HeaderName,
    pool: Pool<TraceInfo>,
    skipper: Skipper,
    generator: TraceIdGenerator,
    hook: Option<TraceIdHook>,
}

impl TraceMiddleware {
    /// Creates the middleware reading and writing `x-request-id`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: HeaderName::from_static(DEFAULT_TRACE_HEADER),
            pool: Pool::new(),
            skipper: skipper::never(),
            generator: Arc::new(generate_trace_id),
            hook: None,
        }
    }

    /// Creates the middleware using a custom header name.
    pub fn with_header(header: &str) -> Result<Self, MiddlewareError> {
        let header = HeaderName::from_bytes(header.trim().to_ascii_lowercase().as_bytes())
            .map_err(|_| MiddlewareError::InvalidHeaderName(header.to_string()))?;
        Ok(Self {
            header,
            ..Self::new()
        })
    }

    /// Bypasses the stage for requests matching `skipper`.
    #[must_use]
    pub fn skipper(mut self, skipper: Skipper) -> Self {
        self.skipper = skipper;
        self
    }

    /// Replaces the identifier generator.
    #[must_use]
    pub fn generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.generator = Arc::new(generator);
        self
    }

    /// Sets a hook run with every assigned identifier.
    #[must_use]
    pub fn on_trace_id<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RequestView, &str) + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// The header carrying the identifier.
    #[must_use]
    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    /// The pool backing [`TraceInfo`] values.
    #[must_use]
    pub fn pool(&self) -> &Pool<TraceInfo> {
        &self.pool
    }

    fn incoming_id(&self, request: &Request) -> Option<String> {
        request
            .headers()
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ToString::to_string)
    }
}

impl Default for TraceMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TraceMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceMiddleware")
            .field("header", &self.header)
            .field("has_hook", &self.hook.is_some())
            .finish_non_exhaustive()
    }
}

impl Middleware for TraceMiddleware {
    fn name(&self) -> &'static str {
        "trace"
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

            let id = self
                .incoming_id(&request)
                .unwrap_or_else(|| (self.generator)());
            if let Some(hook) = &self.hook {
                hook(&view, &id);
            }
            let span = tracing::info_span!(
                "request",
                trace_id = %id,
                method = %request.method(),
                path = %request.uri().path(),
            );

            let guard = self.pool.acquire_with(|info| {
                info.id.push_str(&id);
                info.logger = span.clone();
            });
            ctx.attach_trace(guard.share());

            let mut response = next.run(ctx, request).instrument(span).await;

            ctx.detach_trace();
            drop(guard);

            if let Ok(value) = HeaderValue::from_str(&id) {
                response.headers_mut().insert(self.header.clone(), value);
            }
            response
        })
    }
}
