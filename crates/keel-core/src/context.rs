//! Handler-facing request context.
//!
//! [`RequestContext`] is what a business function receives when it asks for
//! the request context. It is an owned, cheaply cloneable handle so that
//! business futures can be `'static`; it shares the pooled entities attached
//! by the middleware stages rather than copying them.

use crate::acl::AclDecision;
use crate::audit::{AuditCell, AuditRecord};
use crate::error::WebError;
use crate::session::AuthSession;
use crate::store::RequestStore;
use crate::trace::TraceInfo;
use crate::types::Response;
use http::{Method, Uri};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

#[derive(Default)]
enum CommitState {
    #[default]
    Open,
    Committed(Response),
    Delivered,
}

/// Slot for a response written directly by a handler.
///
/// A response can be committed once. Whoever writes the final response
/// (the handler adapter or the global error handler) takes it out of the
/// slot instead of writing its own.
#[derive(Clone, Default)]
pub struct CommitSlot {
    state: Arc<Mutex<CommitState>>,
}

impl CommitSlot {
    /// Creates an open slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits `response`. Fails if a response was already committed.
    pub fn commit(&self, response: Response) -> Result<(), WebError> {
        let mut state = self.state.lock();
        match *state {
            CommitState::Open => {
                *state = CommitState::Committed(response);
                Ok(())
            }
            CommitState::Committed(_) | CommitState::Delivered => {
                Err(WebError::internal("response already committed"))
            }
        }
    }

    /// Returns `true` once a response has been committed.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        !matches!(*self.state.lock(), CommitState::Open)
    }

    /// Takes the committed response, if it has not been taken yet.
    pub fn take(&self) -> Option<Response> {
        let mut state = self.state.lock();
        match std::mem::take(&mut *state) {
            CommitState::Committed(response) => {
                *state = CommitState::Delivered;
                Some(response)
            }
            CommitState::Delivered => {
                *state = CommitState::Delivered;
                None
            }
            CommitState::Open => None,
        }
    }
}

impl fmt::Debug for CommitSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match *self.state.lock() {
            CommitState::Open => "open",
            CommitState::Committed(_) => "committed",
            CommitState::Delivered => "delivered",
        };
        f.debug_tuple("CommitSlot").field(&state).finish()
    }
}

/// Payload bound by the handler adapter, cached for later readers.
#[derive(Debug)]
pub struct CachedPayload<T>(pub Arc<T>);

struct Inner {
    method: Method,
    uri: Uri,
    path_params: Vec<(String, String)>,
    trace: Option<Arc<TraceInfo>>,
    session: Option<Arc<AuthSession>>,
    acl: Option<Arc<AclDecision>>,
    audit: Option<Arc<AuditCell>>,
    store: RequestStore,
    commit: CommitSlot,
}

/// Per-request context handed to business functions.
///
/// # Example
///
/// ```
/// use keel_core::RequestContext;
///
/// let ctx = RequestContext::builder(http::Method::GET, "/orders/7".parse().unwrap())
///     .path_param("id", "7")
///     .build();
/// assert_eq!(ctx.path(), "/orders/7");
/// assert_eq!(ctx.path_param("id"), Some("7"));
/// assert!(ctx.session().is_none());
/// ```
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

impl RequestContext {
    /// Starts building a context for a request.
    #[must_use]
    pub fn builder(method: Method, uri: Uri) -> RequestContextBuilder {
        RequestContextBuilder {
            inner: Inner {
                method,
                uri,
                path_params: Vec::new(),
                trace: None,
                session: None,
                acl: None,
                audit: None,
                store: RequestStore::new(),
                commit: CommitSlot::new(),
            },
        }
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    /// Request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    /// Request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.inner.uri.path()
    }

    /// Value of the `{name}` segment matched by the router.
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.inner
            .path_params
            .iter()
            .find_map(|(k, v)| (k == name).then_some(v.as_str()))
    }

    /// All path parameters, in pattern order.
    #[must_use]
    pub fn path_params(&self) -> &[(String, String)] {
        &self.inner.path_params
    }

    /// Trace info attached by the trace stage.
    #[must_use]
    pub fn trace(&self) -> Option<&TraceInfo> {
        self.inner.trace.as_deref()
    }

    /// Request identifier, or empty if tracing is not installed.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        self.trace().map_or("", TraceInfo::id)
    }

    /// The request span, or the current span if tracing is not installed.
    #[must_use]
    pub fn logger(&self) -> tracing::Span {
        self.trace()
            .map_or_else(tracing::Span::current, |t| t.logger().clone())
    }

    /// Session attached by the auth stage.
    #[must_use]
    pub fn session(&self) -> Option<&AuthSession> {
        self.inner.session.as_deref()
    }

    /// ACL decision attached by the ACL stage.
    #[must_use]
    pub fn acl(&self) -> Option<&AclDecision> {
        self.inner.acl.as_deref()
    }

    /// Audit record attached by the audit stage.
    #[must_use]
    pub fn audit(&self) -> Option<&AuditCell> {
        self.inner.audit.as_deref()
    }

    /// Runs `f` on the audit record, if one is attached.
    pub fn with_audit<R>(&self, f: impl FnOnce(&mut AuditRecord) -> R) -> Option<R> {
        self.audit().map(|cell| f(&mut cell.lock()))
    }

    /// The payload cached by the handler adapter, if it is a `T`.
    #[must_use]
    pub fn cached_payload<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner
            .store
            .get::<CachedPayload<T>>()
            .map(|cached| Arc::clone(&cached.0))
    }

    /// Returns a value from the request store.
    #[must_use]
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner.store.get::<T>()
    }

    /// Puts a value into the request store.
    pub fn insert_extension<T: Send + Sync + 'static>(&self, value: T) {
        self.inner.store.insert(value);
    }

    /// The request store.
    #[must_use]
    pub fn store(&self) -> &RequestStore {
        &self.inner.store
    }

    /// Commits a response written by the handler itself.
    pub fn commit(&self, response: Response) -> Result<(), WebError> {
        self.inner.commit.commit(response)
    }

    /// Returns `true` if a response was committed.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.inner.commit.is_committed()
    }

    /// The commit slot.
    #[must_use]
    pub fn commit_slot(&self) -> &CommitSlot {
        &self.inner.commit
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.inner.method)
            .field("uri", &self.inner.uri)
            .field("trace_id", &self.trace_id())
            .field("user_id", &self.session().map(|s| s.user_id.as_str()))
            .finish_non_exhaustive()
    }
}

/// Builder for [`RequestContext`].
pub struct RequestContextBuilder {
    inner: Inner,
}

impl RequestContextBuilder {
    /// Adds a matched path parameter.
    #[must_use]
    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.path_params.push((name.into(), value.into()));
        self
    }

    /// Sets all matched path parameters.
    #[must_use]
    pub fn path_params(mut self, params: Vec<(String, String)>) -> Self {
        self.inner.path_params = params;
        self
    }

    /// Attaches trace info.
    #[must_use]
    pub fn trace(mut self, trace: Option<Arc<TraceInfo>>) -> Self {
        self.inner.trace = trace;
        self
    }

    /// Attaches the session.
    #[must_use]
    pub fn session(mut self, session: Option<Arc<AuthSession>>) -> Self {
        self.inner.session = session;
        self
    }

    /// Attaches the ACL decision.
    #[must_use]
    pub fn acl(mut self, acl: Option<Arc<AclDecision>>) -> Self {
        self.inner.acl = acl;
        self
    }

    /// Attaches the audit record.
    #[must_use]
    pub fn audit(mut self, audit: Option<Arc<AuditCell>>) -> Self {
        self.inner.audit = audit;
        self
    }

    /// Shares an existing request store.
    #[must_use]
    pub fn store(mut self, store: RequestStore) -> Self {
        self.inner.store = store;
        self
    }

    /// Shares an existing commit slot.
    #[must_use]
    pub fn commit_slot(mut self, commit: CommitSlot) -> Self {
        self.inner.commit = commit;
        self
    }

    /// Builds the context.
    #[must_use]
    pub fn build(self) -> RequestContext {
        RequestContext {
            inner: Arc::new(self.inner),
        }
    }
}
