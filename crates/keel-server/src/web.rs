//! The web instance.
//!
//! [`WebBuilder`] collects configuration, middleware callbacks and routes;
//! [`Web`] runs requests through them:
//!
//! ```text
//! body limit → router → Trace → Auth → ACL → Audit → layers → handler → global error handler
//! ```
//!
//! Oversized bodies, unknown paths and unknown methods still pass through
//! the pipeline to an endpoint that rejects them, so they get a request
//! identifier and are subject to authentication like any other request.

use crate::error::{RegistrationError, ServerError};
use crate::error_handler;
use crate::handler::{panic_message, wrap_with, Handler, RouteHandler, WrapOptions, PANIC_MESSAGE};
use crate::router::{RouteMatch, Router};
use futures_util::FutureExt;
use http::{Method, StatusCode};
use hyper::body::Body as _;
use keel_config::WebConfig;
use keel_core::envelope::error_response;
use keel_core::{
    AuditRecord, AuthSession, BoxFuture, Permission, Request, RequestView, Response, SessionInfo,
    WebError,
};
use keel_extract::{SharedValidator, Validator};
use keel_middleware::stages::{
    AclMiddleware, AclMiddlewareBuilder, AuditMiddleware, AuditMiddlewareBuilder, AuthMiddleware,
    AuthMiddlewareBuilder, TraceMiddleware,
};
use keel_middleware::{Middleware, MiddlewareContext, Pipeline, PipelineBuilder, Skipper};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Default request body limit.
pub const DEFAULT_BODY_LIMIT: usize = 4 * 1024 * 1024;

/// Default time allowed for connections to finish after shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// A configured pipeline and route table.
pub struct Web {
    pub(crate) config: WebConfig,
    pipeline: Pipeline,
    router: Router,
    pub(crate) body_limit: usize,
    pub(crate) shutdown_timeout: Duration,
}

impl Web {
    /// Starts building a web instance.
    #[must_use]
    pub fn builder() -> WebBuilder {
        WebBuilder::new()
    }

    /// The configuration the instance was built from.
    #[must_use]
    pub fn config(&self) -> &WebConfig {
        &self.config
    }

    /// The middleware pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The route table.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Largest accepted request body, in bytes.
    #[must_use]
    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    /// Runs one request through the pipeline and router.
    pub async fn call(&self, request: Request) -> Response {
        if request.body().size_hint().lower() > self.body_limit as u64 {
            return self.reject(request, StatusCode::PAYLOAD_TOO_LARGE).await;
        }

        let status = match self.router.find(request.method(), request.uri().path()) {
            RouteMatch::Found { handler, params } => {
                return self.dispatch(request, handler, params).await;
            }
            RouteMatch::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RouteMatch::NotFound => StatusCode::NOT_FOUND,
        };
        self.reject(request, status).await
    }

    /// Runs a request through the pipeline to an endpoint that fails with
    /// `status`.
    pub(crate) async fn reject(&self, request: Request, status: StatusCode) -> Response {
        self.dispatch(request, rejecting(status), Vec::new()).await
    }

    async fn dispatch(
        &self,
        request: Request,
        handler: RouteHandler,
        params: Vec<(String, String)>,
    ) -> Response {
        let path = request.uri().path().to_string();
        let mut ctx = MiddlewareContext::new();
        ctx.set_path_params(params);
        let commit = ctx.commit_slot().clone();

        let endpoint =
            move |ctx: &mut MiddlewareContext, request: Request| -> BoxFuture<'static, Response> {
                let handle = ctx.to_request_context(&request);
                handler(handle, request)
            };

        let response = AssertUnwindSafe(self.pipeline.run(&mut ctx, request, endpoint))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                tracing::error!(
                    panic = %panic_message(panic.as_ref()),
                    path = %path,
                    "request panicked"
                );
                error_response(&WebError::internal(PANIC_MESSAGE))
            });

        error_handler::finish(&commit, &path, response)
    }
}

impl std::fmt::Debug for Web {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Web")
            .field("listen", &self.config.listen)
            .field("pipeline", &self.pipeline)
            .field("router", &self.router)
            .field("body_limit", &self.body_limit)
            .finish_non_exhaustive()
    }
}

fn rejecting(status: StatusCode) -> RouteHandler {
    let message = match status {
        StatusCode::PAYLOAD_TOO_LARGE => "Request Entity Too Large",
        other => other.canonical_reason().unwrap_or("Bad Request"),
    };
    Arc::new(
        move |_ctx: keel_core::RequestContext, _request: Request| -> BoxFuture<'static, Response> {
            let response = error_response(&WebError::http(status, message));
            Box::pin(std::future::ready(response))
        },
    )
}

/// Builder for [`Web`].
///
/// Stage switches and names come from the [`WebConfig`]; callbacks are set
/// here. Registration errors are reported by [`build`](Self::build).
///
/// # Example
///
/// ```rust
/// use keel_config::WebConfig;
/// use keel_core::WebError;
/// use keel_server::Web;
///
/// async fn health() -> Result<&'static str, WebError> {
///     Ok("ok")
/// }
///
/// let web = Web::builder()
///     .config(WebConfig::default())
///     .get("/health", health)
///     .build()
///     .unwrap();
/// assert_eq!(web.router().len(), 1);
/// ```
pub struct WebBuilder {
    config: WebConfig,
    auth: AuthMiddlewareBuilder,
    acl: AclMiddlewareBuilder,
    audit: AuditMiddlewareBuilder,
    pipeline: PipelineBuilder,
    router: Router,
    errors: Vec<RegistrationError>,
    validator: Option<SharedValidator>,
    body_limit: usize,
    shutdown_timeout: Duration,
}

impl Default for WebBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WebBuilder {
    /// Creates a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: WebConfig::default(),
            auth: AuthMiddleware::builder(),
            acl: AclMiddleware::builder(),
            audit: AuditMiddleware::builder(),
            pipeline: Pipeline::builder(),
            router: Router::new(),
            errors: Vec::new(),
            validator: None,
            body_limit: DEFAULT_BODY_LIMIT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: WebConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the session lookup.
    #[must_use]
    pub fn session_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(&RequestView, &str) -> BoxFuture<'static, Result<Arc<dyn SessionInfo>, WebError>>
            + Send
            + Sync
            + 'static,
    {
        self.auth = self.auth.loader(loader);
        self
    }

    /// Sets the hook run before permissions are loaded.
    #[must_use]
    pub fn acl_before<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RequestView, &AuthSession) -> BoxFuture<'static, Result<(), WebError>>
            + Send
            + Sync
            + 'static,
    {
        self.acl = self.acl.before(hook);
        self
    }

    /// Sets the permission loader.
    #[must_use]
    pub fn permission_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(
                &RequestView,
                &AuthSession,
            ) -> BoxFuture<'static, Result<Vec<Arc<dyn Permission>>, WebError>>
            + Send
            + Sync
            + 'static,
    {
        self.acl = self.acl.loader(loader);
        self
    }

    /// Sets the ACL skip predicate.
    #[must_use]
    pub fn acl_skipper(mut self, skipper: Skipper) -> Self {
        self.acl = self.acl.skipper(skipper);
        self
    }

    /// Sets the audit flush callback.
    #[must_use]
    pub fn audit_flush<F>(mut self, flush: F) -> Self
    where
        F: Fn(&RequestView, &AuditRecord) -> BoxFuture<'static, Result<(), WebError>>
            + Send
            + Sync
            + 'static,
    {
        self.audit = self.audit.flush(flush);
        self
    }

    /// Sets the audit skip predicate.
    #[must_use]
    pub fn audit_skipper(mut self, skipper: Skipper) -> Self {
        self.audit = self.audit.skipper(skipper);
        self
    }

    /// Appends a middleware that runs after the core stages.
    #[must_use]
    pub fn layer<M: Middleware>(mut self, middleware: M) -> Self {
        self.pipeline = self.pipeline.layer(middleware);
        self
    }

    /// Sets the validator used by handlers registered afterwards through
    /// [`handle`](Self::handle) and the method shorthands.
    #[must_use]
    pub fn validator(mut self, validator: impl Validator) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Sets the largest accepted request body.
    #[must_use]
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Sets how long shutdown waits for open connections.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Registers an already wrapped handler.
    #[must_use]
    pub fn route(mut self, method: Method, pattern: &str, handler: RouteHandler) -> Self {
        if let Err(err) = self.router.route(method, pattern, handler) {
            self.errors.push(err);
        }
        self
    }

    /// Wraps and registers a business function.
    #[must_use]
    pub fn handle<H, M>(self, method: Method, pattern: &str, handler: H) -> Self
    where
        H: Handler<M>,
        M: 'static,
    {
        let options = match &self.validator {
            Some(validator) => WrapOptions::new().shared_validator(Arc::clone(validator)),
            None => WrapOptions::new(),
        };
        self.handle_with(method, pattern, handler, options)
    }

    /// Wraps and registers a business function with explicit options.
    #[must_use]
    pub fn handle_with<H, M>(
        self,
        method: Method,
        pattern: &str,
        handler: H,
        options: WrapOptions,
    ) -> Self
    where
        H: Handler<M>,
        M: 'static,
    {
        self.route(method, pattern, wrap_with(handler, options))
    }

    /// Registers a `GET` handler.
    #[must_use]
    pub fn get<H: Handler<M>, M: 'static>(self, pattern: &str, handler: H) -> Self {
        self.handle(Method::GET, pattern, handler)
    }

    /// Registers a `POST` handler.
    #[must_use]
    pub fn post<H: Handler<M>, M: 'static>(self, pattern: &str, handler: H) -> Self {
        self.handle(Method::POST, pattern, handler)
    }

    /// Registers a `PUT` handler.
    #[must_use]
    pub fn put<H: Handler<M>, M: 'static>(self, pattern: &str, handler: H) -> Self {
        self.handle(Method::PUT, pattern, handler)
    }

    /// Registers a `DELETE` handler.
    #[must_use]
    pub fn delete<H: Handler<M>, M: 'static>(self, pattern: &str, handler: H) -> Self {
        self.handle(Method::DELETE, pattern, handler)
    }

    /// Validates the configuration, builds the stages and returns the
    /// instance.
    pub fn build(self) -> Result<Web, ServerError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err.into());
        }
        self.config.validate()?;

        let config = self.config;
        let trace = TraceMiddleware::with_header(&config.trace.target_header)?;
        let auth = self
            .auth
            .enabled(config.auth.enabled)
            .whitelist(config.auth.whitelist.iter().cloned())
            .session_id_key(config.auth.session_id_key.clone())
            .session_expire_hours(i64::from(config.auth.session_expire_in_hours))
            .build()?;
        let acl = self.acl.enabled(config.acl.enabled).build()?;
        let audit = self.audit.enabled(config.audit.enabled).build();

        let pipeline = self
            .pipeline
            .trace(trace)
            .auth(auth)
            .acl(acl)
            .audit(audit)
            .build();

        tracing::info!(
            listen = %config.listen,
            stages = ?pipeline.stage_names(),
            routes = self.router.len(),
            "web instance built"
        );

        Ok(Web {
            config,
            pipeline,
            router: self.router,
            body_limit: self.body_limit,
            shutdown_timeout: self.shutdown_timeout,
        })
    }
}

impl std::fmt::Debug for WebBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebBuilder")
            .field("config", &self.config)
            .field("router", &self.router)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}
