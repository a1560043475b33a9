//! Fixed-order middleware pipeline.
//!
//! The four core stages always run in this order, whichever order they
//! were registered in:
//!
//! 1. **Trace** - Assign or propagate the request identifier
//! 2. **Auth** - Resolve the session (authenticated or anonymous)
//! 3. **ACL** - Load and match permissions
//! 4. **Audit** - Record identity, timing and outcome
//!
//! Any number of additional stages can be appended with
//! [`PipelineBuilder::layer`]; they run after the core stages, in
//! registration order, right before the handler.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use keel_core::{Request, Response};
use std::sync::Arc;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The fixed-order middleware pipeline.
///
/// # Example
///
/// ```ignore
/// use keel_middleware::pipeline::Pipeline;
/// use keel_middleware::stages::{AuditMiddleware, AuthMiddleware, TraceMiddleware};
///
/// let pipeline = Pipeline::builder()
///     .trace(TraceMiddleware::new())
///     .auth(AuthMiddleware::builder().build()?)
///     .audit(AuditMiddleware::builder().build())
///     .build();
///
/// let response = pipeline.process(ctx, request, handler).await;
/// ```
pub struct Pipeline {
    stages: Vec<(Stage, BoxedMiddleware)>,
    layers: Vec<BoxedMiddleware>,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Processes a request through the entire pipeline.
    ///
    /// The request flows through every stage in order, then to the handler.
    pub async fn process<H>(
        &self,
        mut ctx: MiddlewareContext,
        request: Request,
        handler: H,
    ) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'static,
    {
        self.run(&mut ctx, request, handler).await
    }

    /// Like [`process`](Self::process), but borrows the context so the
    /// caller can inspect it afterwards.
    pub async fn run<'a, H>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        handler: H,
    ) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        let next = self.build_chain(handler);
        next.run(ctx, request).await
    }

    /// Builds the middleware chain for a request.
    fn build_chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        let mut next = Next::handler(handler);

        for middleware in self.layers.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }

        for (_, middleware) in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }

        next
    }

    /// Returns the names of all middleware stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages
            .iter()
            .map(|(_, mw)| mw.name())
            .chain(self.layers.iter().map(|mw| mw.name()))
            .collect()
    }

    /// Returns the core stages installed, in execution order.
    #[must_use]
    pub fn stages(&self) -> Vec<Stage> {
        self.stages.iter().map(|(stage, _)| *stage).collect()
    }

    /// Returns the number of middleware stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len() + self.layers.len()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Builder for constructing a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    trace: Option<BoxedMiddleware>,
    auth: Option<BoxedMiddleware>,
    acl: Option<BoxedMiddleware>,
    audit: Option<BoxedMiddleware>,
    layers: Vec<BoxedMiddleware>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the trace stage.
    #[must_use]
    pub fn trace<M: Middleware>(mut self, middleware: M) -> Self {
        self.trace = Some(Arc::new(middleware));
        self
    }

    /// Installs the auth stage.
    #[must_use]
    pub fn auth<M: Middleware>(mut self, middleware: M) -> Self {
        self.auth = Some(Arc::new(middleware));
        self
    }

    /// Installs the ACL stage.
    #[must_use]
    pub fn acl<M: Middleware>(mut self, middleware: M) -> Self {
        self.acl = Some(Arc::new(middleware));
        self
    }

    /// Installs the audit stage.
    #[must_use]
    pub fn audit<M: Middleware>(mut self, middleware: M) -> Self {
        self.audit = Some(Arc::new(middleware));
        self
    }

    /// Appends a stage that runs after the core stages.
    #[must_use]
    pub fn layer<M: Middleware>(mut self, middleware: M) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        let stages = [
            (Stage::Trace, self.trace),
            (Stage::Auth, self.auth),
            (Stage::Acl, self.acl),
            (Stage::Audit, self.audit),
        ]
        .into_iter()
        .filter_map(|(stage, mw)| mw.map(|mw| (stage, mw)))
        .collect();

        Pipeline {
            stages,
            layers: self.layers,
        }
    }
}

/// Core middleware stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Stage 1: Request identifier and logger
    Trace = 1,
    /// Stage 2: Session resolution
    Auth = 2,
    /// Stage 3: Permission check
    Acl = 3,
    /// Stage 4: Audit trail
    Audit = 4,
}

impl Stage {
    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Auth => "auth",
            Self::Acl => "acl",
            Self::Audit => "audit",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Stage; 4] {
        [Self::Trace, Self::Auth, Self::Acl, Self::Audit]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Request as HttpRequest, Response as HttpResponse, StatusCode};
    use http_body_util::Full;

    struct OrderTrackingMiddleware {
        name: &'static str,
        order: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    impl Middleware for OrderTrackingMiddleware {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                self.order.lock().unwrap().push(self.name);
                next.run(ctx, request).await
            })
        }
    }

    fn tracker(
        name: &'static str,
        order: &Arc<std::sync::Mutex<Vec<&'static str>>>,
    ) -> OrderTrackingMiddleware {
        OrderTrackingMiddleware {
            name,
            order: Arc::clone(order),
        }
    }

    fn request() -> Request {
        HttpRequest::builder()
            .uri("/test")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn ok(_ctx: &mut MiddlewareContext, _req: Request) -> BoxFuture<'static, Response> {
        Box::pin(async {
            HttpResponse::builder()
                .status(StatusCode::OK)
                .body(Full::new(Bytes::from("OK")))
                .unwrap()
        })
    }

    #[tokio::test]
    async fn test_core_stages_run_in_fixed_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        // Registered out of order on purpose.
        let pipeline = Pipeline::builder()
            .layer(tracker("custom", &order))
            .audit(tracker("audit", &order))
            .acl(tracker("acl", &order))
            .trace(tracker("trace", &order))
            .auth(tracker("auth", &order))
            .build();

        let response = pipeline
            .process(MiddlewareContext::new(), request(), ok)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            *order.lock().unwrap(),
            vec!["trace", "auth", "acl", "audit", "custom"]
        );
        assert_eq!(
            pipeline.stages(),
            vec![Stage::Trace, Stage::Auth, Stage::Acl, Stage::Audit]
        );
        assert_eq!(pipeline.stage_count(), 5);
    }

    #[tokio::test]
    async fn test_empty_pipeline() {
        let pipeline = Pipeline::builder().build();
        let response = pipeline
            .process(MiddlewareContext::new(), request(), ok)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(pipeline.stage_count(), 0);
    }

    #[test]
    fn test_stage_ordering() {
        assert!(Stage::Trace < Stage::Auth);
        assert!(Stage::Auth < Stage::Acl);
        assert!(Stage::Acl < Stage::Audit);
        assert_eq!(Stage::all().map(Stage::name), ["trace", "auth", "acl", "audit"]);
    }
}
