//! End-to-end pipeline integration tests.
//!
//! These tests drive requests through all four core stages together:
//!
//! 1. Trace - identifier echoed on every response
//! 2. Auth - whitelist and session lookup
//! 3. ACL - permission matching
//! 4. Audit - record initialisation and flush

use bytes::Bytes;
use chrono::{DateTime, Duration, Local};
use http::{Method, Request as HttpRequest, Response as HttpResponse, StatusCode};
use http_body_util::{BodyExt, Full};
use keel_core::trace::DEFAULT_TRACE_HEADER;
use keel_core::{
    code, AuditRecord, AuthSession, Permission, RequestView, RoutePermission, SessionInfo,
    WebError,
};
use keel_middleware::stages::{
    AclMiddleware, AuditMiddleware, AuthMiddleware, TraceMiddleware, DEFAULT_SESSION_ID_KEY,
};
use keel_middleware::{BoxFuture, MiddlewareContext, Pipeline, Request, Response};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Account {
    id: String,
    admin: bool,
}

impl SessionInfo for Account {
    fn user_id(&self) -> &str {
        &self.id
    }

    fn expire_at(&self) -> DateTime<Local> {
        Local::now() + Duration::hours(2)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn load_session(
    _view: &RequestView,
    token: &str,
) -> BoxFuture<'static, Result<Arc<dyn SessionInfo>, WebError>> {
    let token = token.to_string();
    Box::pin(async move {
        match token.as_str() {
            "admin-token" => Ok(Arc::new(Account {
                id: "root".into(),
                admin: true,
            }) as Arc<dyn SessionInfo>),
            "user-token" => Ok(Arc::new(Account {
                id: "bob".into(),
                admin: false,
            }) as Arc<dyn SessionInfo>),
            _ => Err(WebError::unauthorized()),
        }
    })
}

fn load_permissions(
    _view: &RequestView,
    session: &AuthSession,
) -> BoxFuture<'static, Result<Vec<Arc<dyn Permission>>, WebError>> {
    let admin = session.info::<Account>().is_some_and(|a| a.admin);
    Box::pin(async move {
        let mut permissions: Vec<Arc<dyn Permission>> = vec![Arc::new(RoutePermission::new(
            "orders:read",
            Method::GET,
            "/orders",
        ))];
        if admin {
            permissions.push(Arc::new(RoutePermission::any_method("admin", "/")));
        }
        Ok(permissions)
    })
}

struct Harness {
    pipeline: Pipeline,
    flushed: Arc<Mutex<Vec<AuditRecord>>>,
    handler_calls: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Self {
        let flushed: Arc<Mutex<Vec<AuditRecord>>> = Arc::default();
        let sink = Arc::clone(&flushed);
        let pipeline = Pipeline::builder()
            .trace(TraceMiddleware::new())
            .auth(
                AuthMiddleware::builder()
                    .enabled(true)
                    .whitelist(["^/public", "^/orders/feed"])
                    .loader(load_session)
                    .build()
                    .unwrap(),
            )
            .acl(
                AclMiddleware::builder()
                    .enabled(true)
                    .skipper(keel_middleware::skipper::path_prefixes(["/public"]))
                    .loader(load_permissions)
                    .build()
                    .unwrap(),
            )
            .audit(
                AuditMiddleware::builder()
                    .enabled(true)
                    .flush(move |_view, record| {
                        sink.lock().push(record.clone());
                        Box::pin(async { Ok(()) })
                    })
                    .build(),
            )
            .build();
        Self {
            pipeline,
            flushed,
            handler_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    async fn send(&self, request: Request) -> (StatusCode, http::HeaderMap, serde_json::Value) {
        let calls = Arc::clone(&self.handler_calls);
        let response = self
            .pipeline
            .process(MiddlewareContext::new(), request, move |ctx, _req| {
                calls.fetch_add(1, Ordering::SeqCst);
                let body = serde_json::json!({
                    "code": 0,
                    "msg": "Success",
                    "data": {
                        "user": ctx.session().map(|s| s.user_id.clone()),
                        "anonymous": ctx.session().map(|s| s.is_anonymous),
                        "trace": ctx.trace_id(),
                        "matched": ctx.acl().map(|a| a.matched.len()),
                    }
                });
                Box::pin(async move {
                    HttpResponse::builder()
                        .status(StatusCode::OK)
                        .body(Full::new(Bytes::from(body.to_string())))
                        .unwrap()
                })
            })
            .await;
        into_json(response).await
    }
}

async fn into_json(response: Response) -> (StatusCode, http::HeaderMap, serde_json::Value) {
    let (parts, body) = response.into_parts();
    let bytes = body.collect().await.unwrap().to_bytes();
    (parts.status, parts.headers, serde_json::from_slice(&bytes).unwrap())
}

fn request(method: Method, uri: &str, token: Option<&str>) -> Request {
    let mut builder = HttpRequest::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(DEFAULT_SESSION_ID_KEY, token);
    }
    builder.body(Full::new(Bytes::new())).unwrap()
}

#[tokio::test]
async fn test_authenticated_request_reaches_handler() {
    let harness = Harness::new();
    let (status, headers, body) = harness
        .send(request(Method::GET, "/orders/1", Some("user-token")))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["user"], "bob");
    assert_eq!(body["data"]["anonymous"], false);
    assert_eq!(body["data"]["matched"], 1);
    assert_eq!(
        body["data"]["trace"],
        headers[DEFAULT_TRACE_HEADER].to_str().unwrap()
    );
}

#[tokio::test]
async fn test_whitelisted_path_without_token_is_never_unauthorized() {
    let harness = Harness::new();
    for uri in ["/public", "/public/docs", "/orders/feed?page=2"] {
        let (_, _, body) = harness.send(request(Method::GET, uri, None)).await;
        assert_ne!(body["code"], code::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn test_other_paths_without_token_are_unauthorized() {
    let harness = Harness::new();
    for uri in ["/orders", "/admin/users", "/"] {
        let (status, headers, body) = harness.send(request(Method::GET, uri, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], code::UNAUTHORIZED, "{uri}");
        assert!(headers.contains_key(DEFAULT_TRACE_HEADER));
    }
    assert_eq!(harness.handler_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unmatched_permissions_are_forbidden() {
    let harness = Harness::new();
    let (_, _, body) = harness
        .send(request(Method::DELETE, "/orders/1", Some("user-token")))
        .await;

    assert_eq!(body["code"], code::FORBIDDEN);
    assert_eq!(body["msg"], "Forbidden");
    assert_eq!(harness.handler_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_admin_matches_everything() {
    let harness = Harness::new();
    let (_, _, body) = harness
        .send(request(Method::DELETE, "/orders/1", Some("admin-token")))
        .await;

    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["matched"], 1);
}

#[tokio::test]
async fn test_audit_flushes_only_requests_reaching_it() {
    let harness = Harness::new();
    harness
        .send(request(Method::GET, "/orders", Some("user-token")))
        .await;
    harness.send(request(Method::GET, "/orders", None)).await;

    let flushed = harness.flushed.lock();
    assert_eq!(flushed.len(), 1);
    assert_eq!(flushed[0].user_id(), "bob");
}

#[tokio::test]
async fn test_anonymous_identity_reaches_audit() {
    let harness = Harness::new();
    let (_, _, body) = harness.send(request(Method::GET, "/public", None)).await;

    assert_eq!(body["data"]["anonymous"], true);
    let flushed = harness.flushed.lock();
    assert!(flushed[0].user_id().starts_with("ANONYMOUS_"));
}

#[tokio::test]
async fn test_context_is_clean_after_pipeline() {
    let harness = Harness::new();
    let mut ctx = MiddlewareContext::new();
    harness
        .pipeline
        .run(
            &mut ctx,
            request(Method::GET, "/orders", Some("user-token")),
            |_ctx, _req| Box::pin(async { Response::new(Full::new(Bytes::new())) }),
        )
        .await;

    assert!(ctx.trace().is_none());
    assert!(ctx.session().is_none());
    assert!(ctx.acl().is_none());
    assert!(ctx.audit().is_none());
}
