//! ACL middleware.
//!
//! Every request gets an [`AclDecision`], reset to empty. When the stage is
//! enabled and the skipper does not bypass the request, the optional
//! `before` hook runs, then the permission loader is called once, and the
//! returned permissions are matched against the request. An empty matched
//! set is answered with `Forbidden`.

use crate::context::MiddlewareContext;
use crate::error::MiddlewareError;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::skipper::{self, Skipper};
use keel_core::envelope::error_response;
use keel_core::{
    AclDecision, AuthSession, Permission, Pool, Request, RequestView, Response, WebError,
};
use std::sync::Arc;

/// Future returned by a [`PermissionLoader`].
pub type PermissionFuture = BoxFuture<'static, Result<Vec<Arc<dyn Permission>>, WebError>>;

/// Loads the permissions held by the caller.
pub type PermissionLoader =
    Arc<dyn Fn(&RequestView, &AuthSession) -> PermissionFuture + Send + Sync>;

/// Future returned by a [`BeforeHook`].
pub type HookFuture = BoxFuture<'static, Result<(), WebError>>;

/// Runs before the permission loader; an error short-circuits the request.
pub type BeforeHook = Arc<dyn Fn(&RequestView, &AuthSession) -> HookFuture + Send + Sync>;

/// Middleware that attaches an [`AclDecision`] and enforces it.
pub struct AclMiddleware {
    enabled: bool,
    skipper: Skipper,
    before: Option<BeforeHook>,
    loader: Option<PermissionLoader>,
    pool: Pool<AclDecision>,
}

impl AclMiddleware {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> AclMiddlewareBuilder {
        AclMiddlewareBuilder::default()
    }

    /// The pool backing [`AclDecision`] values.
    #[must_use]
    pub fn pool(&self) -> &Pool<AclDecision> {
        &self.pool
    }

    async fn evaluate(
        &self,
        view: &RequestView,
        session: &AuthSession,
    ) -> Result<Option<Vec<Arc<dyn Permission>>>, WebError> {
        if !self.enabled || (self.skipper)(view) {
            return Ok(None);
        }
        if let Some(before) = &self.before {
            before(view, session).await?;
        }
        match &self.loader {
            Some(loader) => loader(view, session).await.map(Some),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for AclMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AclMiddleware")
            .field("enabled", &self.enabled)
            .field("has_before", &self.before.is_some())
            .field("has_loader", &self.loader.is_some())
            .finish_non_exhaustive()
    }
}

impl Middleware for AclMiddleware {
    fn name(&self) -> &'static str {
        "acl"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let view = ctx.view(&request);
            let anonymous = AuthSession::default();
            let session = ctx.session().unwrap_or(&anonymous);

            let permissions = match self.evaluate(&view, session).await {
                Ok(permissions) => permissions,
                Err(err) => return error_response(&err),
            };
            let evaluated = permissions.is_some();

            let guard = self.pool.acquire_with(|decision| {
                if let Some(permissions) = permissions {
                    decision.evaluate(permissions, &view);
                }
            });

            if evaluated && !guard.is_allowed() {
                tracing::debug!(
                    path = %view.path(),
                    user_id = %session.user_id,
                    loaded = guard.all.len(),
                    "no permission matched"
                );
                return error_response(&WebError::forbidden());
            }

            ctx.attach_acl(guard.share());
            let response = next.run(ctx, request).await;
            ctx.detach_acl();
            drop(guard);
            response
        })
    }
}

/// Builder for [`AclMiddleware`].
pub struct AclMiddlewareBuilder {
    enabled: bool,
    skipper: Skipper,
    before: Option<BeforeHook>,
    loader: Option<PermissionLoader>,
}

impl Default for AclMiddlewareBuilder {
    fn default() -> Self {
        Self {
            enabled: false,
            skipper: skipper::never(),
            before: None,
            loader: None,
        }
    }
}

impl AclMiddlewareBuilder {
    /// Enables or disables permission checks.
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

    /// Sets the hook run before the loader.
    #[must_use]
    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RequestView, &AuthSession) -> BoxFuture<'static, Result<(), WebError>>
            + Send
            + Sync
            + 'static,
    {
        self.before = Some(Arc::new(hook));
        self
    }

    /// Sets the permission loader.
    #[must_use]
    pub fn loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(
                &RequestView,
                &AuthSession,
            ) -> BoxFuture<'static, Result<Vec<Arc<dyn Permission>>, WebError>>
            + Send
            + Sync
            + 'static,
    {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Builds the middleware. Fails if enabled without a loader.
    pub fn build(self) -> Result<AclMiddleware, MiddlewareError> {
        if self.enabled && self.loader.is_none() {
            return Err(MiddlewareError::MissingPermissionLoader);
        }
        Ok(AclMiddleware {
            enabled: self.enabled,
            skipper: self.skipper,
            before: self.before,
            loader: self.loader,
            pool: Pool::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Method, Request as HttpRequest, Response as HttpResponse, StatusCode};
    use http_body_util::{BodyExt, Full};
    use keel_core::{code, BizError, RoutePermission};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request(method: Method, uri: &str) -> Request {
        HttpRequest::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn matched(ctx: &mut MiddlewareContext, _req: Request) -> BoxFuture<'static, Response> {
        let names = ctx
            .acl()
            .map(|acl| acl.matched_names().join(","))
            .unwrap_or_else(|| "none".into());
        Box::pin(async move {
            HttpResponse::builder()
                .status(StatusCode::OK)
                .body(Full::new(Bytes::from(names)))
                .unwrap()
        })
    }

    async fn run(mw: &AclMiddleware, req: Request) -> String {
        let mut ctx = MiddlewareContext::new();
        let response = mw.process(&mut ctx, req, Next::handler(matched)).await;
        assert!(ctx.acl().is_none());
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn counting_loader(
        calls: Arc<AtomicUsize>,
    ) -> impl Fn(&RequestView, &AuthSession) -> PermissionFuture + Send + Sync + 'static {
        move |_view: &RequestView, _session: &AuthSession| -> PermissionFuture {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {
                Ok(vec![
                    Arc::new(RoutePermission::new("orders:read", Method::GET, "/orders"))
                        as Arc<dyn Permission>,
                    Arc::new(RoutePermission::new("users:read", Method::GET, "/users"))
                        as Arc<dyn Permission>,
                ])
            })
        }
    }

    fn envelope_code(body: &str) -> i64 {
        serde_json::from_str::<serde_json::Value>(body).unwrap()["code"]
            .as_i64()
            .unwrap()
    }

    #[tokio::test]
    async fn test_matching_permission_allows() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mw = AclMiddleware::builder()
            .enabled(true)
            .loader(counting_loader(Arc::clone(&calls)))
            .build()
            .unwrap();

        let body = run(&mw, request(Method::GET, "/orders/1")).await;
        assert_eq!(body, "orders:read");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_match_is_forbidden() {
        let mw = AclMiddleware::builder()
            .enabled(true)
            .loader(counting_loader(Arc::default()))
            .build()
            .unwrap();

        let body = run(&mw, request(Method::DELETE, "/orders/1")).await;
        assert_eq!(envelope_code(&body), i64::from(code::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_disabled_bypasses_with_empty_decision() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mw = AclMiddleware::builder()
            .loader(counting_loader(Arc::clone(&calls)))
            .build()
            .unwrap();

        assert_eq!(run(&mw, request(Method::DELETE, "/x")).await, "");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_skipped_path_bypasses() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mw = AclMiddleware::builder()
            .enabled(true)
            .skipper(skipper::path_prefixes(["/health"]))
            .loader(counting_loader(Arc::clone(&calls)))
            .build()
            .unwrap();

        assert_eq!(run(&mw, request(Method::GET, "/health")).await, "");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_before_hook_error_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mw = AclMiddleware::builder()
            .enabled(true)
            .before(|_view, _session| {
                Box::pin(async { Err(BizError::with_msg(code::OPT_ERR, "maintenance").into()) })
            })
            .loader(counting_loader(Arc::clone(&calls)))
            .build()
            .unwrap();

        let body = run(&mw, request(Method::GET, "/orders")).await;
        assert_eq!(envelope_code(&body), i64::from(code::OPT_ERR));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_loader_error_short_circuits() {
        let mw = AclMiddleware::builder()
            .enabled(true)
            .loader(|_view, _session| Box::pin(async { Err(WebError::internal("acl store down")) }))
            .build()
            .unwrap();

        let body = run(&mw, request(Method::GET, "/orders")).await;
        assert_eq!(envelope_code(&body), i64::from(code::INTERNAL_SERVER));
    }

    #[tokio::test]
    async fn test_decision_reset_between_requests() {
        let mw = AclMiddleware::builder()
            .enabled(true)
            .skipper(skipper::path_prefixes(["/health"]))
            .loader(counting_loader(Arc::default()))
            .build()
            .unwrap();

        assert_eq!(run(&mw, request(Method::GET, "/orders")).await, "orders:read");
        assert_eq!(mw.pool().idle(), 1);
        assert_eq!(run(&mw, request(Method::GET, "/health")).await, "");
    }

    #[test]
    fn test_enabled_without_loader_is_an_error() {
        let err = AclMiddleware::builder().enabled(true).build().unwrap_err();
        assert!(matches!(err, MiddlewareError::MissingPermissionLoader));
    }
}
