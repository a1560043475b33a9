//! Middleware context types.
//!
//! The [`MiddlewareContext`] carries state through the middleware pipeline.
//! Each stage attaches the entity it owns (trace info, session, ACL
//! decision, audit record) before calling the next stage and detaches it
//! after the next stage has returned. The handler adapter turns the context
//! into a [`RequestContext`] for the business function.

use keel_core::{
    AclDecision, AuditCell, AuthSession, CommitSlot, RequestContext, RequestStore, RequestView,
    TraceInfo,
};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Context that flows through the middleware pipeline.
///
/// # Example
///
/// ```
/// use keel_middleware::context::MiddlewareContext;
/// use keel_core::AuthSession;
/// use std::sync::Arc;
///
/// let mut ctx = MiddlewareContext::new();
/// ctx.attach_session(Arc::new(AuthSession {
///     user_id: "alice".into(),
///     ..AuthSession::default()
/// }));
/// assert_eq!(ctx.session().unwrap().user_id, "alice");
///
/// ctx.detach_session();
/// assert!(ctx.session().is_none());
/// ```
#[derive(Debug)]
pub struct MiddlewareContext {
    trace: Option<Arc<TraceInfo>>,
    session: Option<Arc<AuthSession>>,
    acl: Option<Arc<AclDecision>>,
    audit: Option<Arc<AuditCell>>,

    /// Path parameters matched by the router.
    path_params: Vec<(String, String)>,

    /// Values shared with the handler and with callbacks.
    store: RequestStore,

    /// Response committed directly by a handler.
    commit: CommitSlot,

    /// When the request started processing.
    started_at: Instant,

    /// Type-erased extension data private to middleware.
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MiddlewareContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trace: None,
            session: None,
            acl: None,
            audit: None,
            path_params: Vec::new(),
            store: RequestStore::new(),
            commit: CommitSlot::new(),
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Captures a [`RequestView`] of `request` sharing this context's store.
    #[must_use]
    pub fn view<B>(&self, request: &http::Request<B>) -> RequestView {
        RequestView::from_request(request, self.store.clone())
    }

    /// Trace info, if the trace stage ran.
    #[must_use]
    pub fn trace(&self) -> Option<&TraceInfo> {
        self.trace.as_deref()
    }

    /// Request identifier, or empty.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        self.trace().map_or("", TraceInfo::id)
    }

    /// Attaches trace info. Only the trace stage should call this.
    pub fn attach_trace(&mut self, trace: Arc<TraceInfo>) {
        self.trace = Some(trace);
    }

    /// Detaches trace info.
    pub fn detach_trace(&mut self) -> Option<Arc<TraceInfo>> {
        self.trace.take()
    }

    /// Session, if the auth stage ran.
    #[must_use]
    pub fn session(&self) -> Option<&AuthSession> {
        self.session.as_deref()
    }

    /// Attaches the session. Only the auth stage should call this.
    pub fn attach_session(&mut self, session: Arc<AuthSession>) {
        self.session = Some(session);
    }

    /// Detaches the session.
    pub fn detach_session(&mut self) -> Option<Arc<AuthSession>> {
        self.session.take()
    }

    /// ACL decision, if the ACL stage ran.
    #[must_use]
    pub fn acl(&self) -> Option<&AclDecision> {
        self.acl.as_deref()
    }

    /// Attaches the ACL decision. Only the ACL stage should call this.
    pub fn attach_acl(&mut self, acl: Arc<AclDecision>) {
        self.acl = Some(acl);
    }

    /// Detaches the ACL decision.
    pub fn detach_acl(&mut self) -> Option<Arc<AclDecision>> {
        self.acl.take()
    }

    /// Audit record, if the audit stage ran.
    #[must_use]
    pub fn audit(&self) -> Option<&AuditCell> {
        self.audit.as_deref()
    }

    /// Attaches the audit record. Only the audit stage should call this.
    pub fn attach_audit(&mut self, audit: Arc<AuditCell>) {
        self.audit = Some(audit);
    }

    /// Detaches the audit record.
    pub fn detach_audit(&mut self) -> Option<Arc<AuditCell>> {
        self.audit.take()
    }

    /// Path parameters matched by the router.
    #[must_use]
    pub fn path_params(&self) -> &[(String, String)] {
        &self.path_params
    }

    /// Sets the matched path parameters.
    pub fn set_path_params(&mut self, params: Vec<(String, String)>) {
        self.path_params = params;
    }

    /// The request store.
    #[must_use]
    pub fn store(&self) -> &RequestStore {
        &self.store
    }

    /// The commit slot.
    #[must_use]
    pub fn commit_slot(&self) -> &CommitSlot {
        &self.commit
    }

    /// Returns when the request started processing.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension value.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }

    /// Builds the handle given to business functions.
    ///
    /// The handle shares the attached entities, store and commit slot.
    #[must_use]
    pub fn to_request_context<B>(&self, request: &http::Request<B>) -> RequestContext {
        RequestContext::builder(request.method().clone(), request.uri().clone())
            .path_params(self.path_params.clone())
            .trace(self.trace.clone())
            .session(self.session.clone())
            .acl(self.acl.clone())
            .audit(self.audit.clone())
            .store(self.store.clone())
            .commit_slot(self.commit.clone())
            .build()
    }
}

impl Default for MiddlewareContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_detach_entities() {
        let mut ctx = MiddlewareContext::new();
        ctx.attach_trace(Arc::new(TraceInfo {
            id: "t-1".into(),
            logger: tracing::Span::none(),
        }));
        ctx.attach_acl(Arc::new(AclDecision::default()));
        ctx.attach_audit(Arc::new(AuditCell::default()));
        assert_eq!(ctx.trace_id(), "t-1");
        assert!(ctx.acl().is_some());

        assert!(ctx.detach_trace().is_some());
        assert!(ctx.detach_acl().is_some());
        assert!(ctx.detach_audit().is_some());
        assert_eq!(ctx.trace_id(), "");
        assert!(ctx.audit().is_none());
    }

    #[test]
    fn test_request_context_shares_entities() {
        let mut ctx = MiddlewareContext::new();
        let audit = Arc::new(AuditCell::default());
        ctx.attach_audit(Arc::clone(&audit));
        ctx.set_path_params(vec![("id".into(), "9".into())]);
        let request = http::Request::builder()
            .uri("/orders/9")
            .body(())
            .unwrap();

        let handle = ctx.to_request_context(&request);
        handle.with_audit(|r| r.set_resource_id("order-9"));
        handle.insert_extension(7u16);

        assert_eq!(audit.lock().resource_id(), "order-9");
        assert_eq!(*ctx.store().get::<u16>().unwrap(), 7);
        assert_eq!(handle.path_param("id"), Some("9"));
    }

    #[test]
    fn test_extensions() {
        #[derive(Debug, PartialEq)]
        struct Marker(u8);

        let mut ctx = MiddlewareContext::new();
        ctx.set_extension(Marker(1));
        assert!(ctx.has_extension::<Marker>());
        assert_eq!(ctx.get_extension::<Marker>(), Some(&Marker(1)));
        assert_eq!(ctx.remove_extension::<Marker>(), Some(Marker(1)));
        assert!(!ctx.has_extension::<Marker>());
    }
}
