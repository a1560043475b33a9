//! Audit middleware.
//!
//! Every request gets an [`AuditRecord`] initialised with the session's user
//! id, the client address and user agent, and the start time, whether or not
//! auditing is enabled. When enabled and not skipped, the stage waits for
//! the downstream stages, records the error they reported (if any), and
//! passes the finished record to the flush callback.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::skipper::{self, Skipper};
use chrono::Local;
use keel_core::{
    AuditCell, AuditRecord, ErrorOutcome, Pool, Request, RequestView, Response, WebError,
};
use std::sync::Arc;

/// Future returned by a [`FlushFn`].
pub type FlushFuture = BoxFuture<'static, Result<(), WebError>>;

/// Receives the finished record of an audited request.
pub type FlushFn = Arc<dyn Fn(&RequestView, &AuditRecord) -> FlushFuture + Send + Sync>;

/// Middleware that attaches an [`AuditRecord`] and flushes it.
pub struct AuditMiddleware {
    enabled: bool,
    skipper: Skipper,
    flush: Option<FlushFn>,
    pool: Pool<AuditCell>,
}

impl AuditMiddleware {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> AuditMiddlewareBuilder {
        AuditMiddlewareBuilder::default()
    }

    /// The pool backing audit records.
    #[must_use]
    pub fn pool(&self) -> &Pool<AuditCell> {
        &self.pool
    }
}

impl std::fmt::Debug for AuditMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditMiddleware")
            .field("enabled", &self.enabled)
            .field("has_flush", &self.flush.is_some())
            .finish_non_exhaustive()
    }
}

impl Middleware for AuditMiddleware {
    fn name(&self) -> &'static str {
        "audit"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let view = ctx.view(&request);
            let user_id = ctx
                .session()
                .map(|s| s.user_id.clone())
                .unwrap_or_default();

            let guard = self.pool.acquire_with(|cell| {
                cell.get_mut()
                    .start(user_id, view.client_ip(), view.user_agent(), Local::now());
            });
            ctx.attach_audit(guard.share());

            let audited = self.enabled && !(self.skipper)(&view);
            let response = next.run(ctx, request).await;

            if audited {
                let record = {
                    let mut record = guard.lock();
                    let already_recorded = !record.errors().is_empty();
                    if let Some(outcome) = response.extensions().get::<ErrorOutcome>() {
                        if !already_recorded {
                            record.with_error(outcome.detail.clone());
                        }
                    }
                    record.clone()
                };
                if let Some(flush) = &self.flush {
                    if let Err(err) = flush(&view, &record).await {
                        tracing::warn!(
                            error = %err.detail(),
                            path = %view.path(),
                            "audit flush failed"
                        );
                    }
                }
            }

            ctx.detach_audit();
            drop(guard);
            response
        })
    }
}

/// Builder for [`AuditMiddleware`].
pub struct AuditMiddlewareBuilder {
    enabled: bool,
    skipper: Skipper,
    flush: Option<FlushFn>,
}

impl Default for AuditMiddlewareBuilder {
    fn default() -> Self {
        Self {
            enabled: false,
            skipper: skipper::never(),
            flush: None,
        }
    }
}

impl AuditMiddlewareBuilder {
    /// Enables or disables auditing.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the skip predicate.
    #[must_use]
    pub fn skipper(mut self, skipper: Skipper) -> Self {
        self.skipper = skipper;
        self
    }

    /// Sets the flush callback.
    #[must_use]
    pub fn flush<F>(mut self, flush: F) -> Self
    where
        F: Fn(&RequestView, &AuditRecord) -> BoxFuture<'static, Result<(), WebError>>
            + Send
            + Sync
            + 'static,
    {
        self.flush = Some(Arc::new(flush));
        self
    }

    /// Builds the middleware.
    #[must_use]
    pub fn build(self) -> AuditMiddleware {
        AuditMiddleware {
            enabled: self.enabled,
            skipper: self.skipper,
            flush: self.flush,
            pool: Pool::new(),
        }
    }
}
