//! Auth middleware.
//!
//! Resolves an [`AuthSession`] for every request:
//!
//! 1. Start from an anonymous session with a generated pseudo-identity.
//! 2. Read the token from the `kt-session-id` header (configurable), falling
//!    back to a query parameter of the same name.
//! 3. With a token and a session loader, call the loader; success turns the
//!    session into an authenticated one.
//!
//! A request whose URI matches a whitelist pattern tolerates a missing
//! token or a failed lookup and proceeds anonymously. Any other request
//! fails with `Unauthorized` before reaching the handler. With auth
//! disabled every request is treated as whitelisted.

use crate::context::MiddlewareContext;
use crate::error::MiddlewareError;
use crate::middleware::{BoxFuture, Middleware, Next};
use chrono::{Duration, Local};
use keel_core::envelope::error_response;
use keel_core::session::{DEFAULT_SESSION_EXPIRE_HOURS, MAX_SESSION_EXPIRE_HOURS};
use keel_core::{AuthSession, Pool, Request, RequestView, Response, SessionInfo, WebError};
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

/// Default name of the header and query parameter carrying the token.
pub const DEFAULT_SESSION_ID_KEY: &str = "kt-session-id";

/// Looks up the session behind a token.
pub type SessionLoader = Arc<
    dyn Fn(&RequestView, &str) -> BoxFuture<'static, Result<Arc<dyn SessionInfo>, WebError>>
        + Send
        + Sync,
>;

/// Middleware that attaches an [`AuthSession`] to the request.
pub struct AuthMiddleware {
    enabled: bool,
    whitelist: Vec<Regex>,
    session_id_key: String,
    session_expire: Duration,
    loader: Option<SessionLoader>,
    pool: Pool<AuthSession>,
}

impl AuthMiddleware {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> AuthMiddlewareBuilder {
        AuthMiddlewareBuilder::default()
    }

    /// The pool backing [`AuthSession`] values.
    #[must_use]
    pub fn pool(&self) -> &Pool<AuthSession> {
        &self.pool
    }

    /// Returns `true` if `uri` is exempt from mandatory authentication.
    #[must_use]
    pub fn is_whitelisted(&self, uri: &str) -> bool {
        !self.enabled || self.whitelist.iter().any(|re| re.is_match(uri))
    }

    fn token(&self, view: &RequestView) -> Option<String> {
        view.header(&self.session_id_key)
            .map(ToString::to_string)
            .or_else(|| view.query_param(&self.session_id_key))
            .filter(|token| !token.is_empty())
    }

    async fn resolve(&self, view: &RequestView) -> Result<AuthSession, WebError> {
        let whitelisted = self.is_whitelisted(view.path_and_query());

        let mut session = AuthSession::default();
        session.make_anonymous(Local::now(), self.session_expire);
        session.client_ip = view.client_ip();
        session.client_ua = view.user_agent();

        let Some(token) = self.token(view) else {
            if whitelisted {
                return Ok(session);
            }
            tracing::debug!(path = %view.path(), "no session token");
            return Err(WebError::unauthorized());
        };
        session.session_id.clone_from(&token);

        if let Some(loader) = &self.loader {
            match loader(view, &token).await {
                Ok(info) => session.authenticate(info),
                Err(err) if whitelisted => {
                    tracing::debug!(error = %err, "session lookup failed on whitelisted path");
                }
                Err(err) => {
                    tracing::debug!(error = %err, path = %view.path(), "session lookup failed");
                    return Err(WebError::unauthorized());
                }
            }
        }
        Ok(session)
    }
}

impl std::fmt::Debug for AuthMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthMiddleware")
            .field("enabled", &self.enabled)
            .field("whitelist", &self.whitelist)
            .field("session_id_key", &self.session_id_key)
            .field("has_loader", &self.loader.is_some())
            .finish_non_exhaustive()
    }
}

impl Middleware for AuthMiddleware {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let view = ctx.view(&request);
            let resolved = match self.resolve(&view).await {
                Ok(resolved) => resolved,
                Err(err) => return error_response(&err),
            };

            let guard = self.pool.acquire_with(|session| {
                session.is_anonymous = resolved.is_anonymous;
                session.user_id.push_str(&resolved.user_id);
                session.session_id.push_str(&resolved.session_id);
                session.expire_at = resolved.expire_at;
                session.client_ip.push_str(&resolved.client_ip);
                session.client_ua.push_str(&resolved.client_ua);
                session.session_info = resolved.session_info;
            });
            ctx.attach_session(guard.share());

            let response = next.run(ctx, request).await;

            ctx.detach_session();
            drop(guard);
            response
        })
    }
}

/// Builder for [`AuthMiddleware`].
pub struct AuthMiddlewareBuilder {
    enabled: bool,
    whitelist: Vec<String>,
    session_id_key: String,
    session_expire_hours: i64,
    loader: Option<SessionLoader>,
}

impl Default for AuthMiddlewareBuilder {
    fn default() -> Self {
        Self {
            enabled: false,
            whitelist: Vec::new(),
            session_id_key: DEFAULT_SESSION_ID_KEY.to_string(),
            session_expire_hours: DEFAULT_SESSION_EXPIRE_HOURS,
            loader: None,
        }
    }
}

impl AuthMiddlewareBuilder {
    /// Enables or disables mandatory authentication.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Adds whitelist patterns, matched against the request path and query.
    #[must_use]
    pub fn whitelist<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Sets the header and query parameter name carrying the token.
    ///
    /// A blank key keeps the default.
    #[must_use]
    pub fn session_id_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.trim().is_empty() {
            self.session_id_key = key.trim().to_string();
        }
        self
    }

    /// Sets the lifetime of anonymous sessions, at most
    /// [`MAX_SESSION_EXPIRE_HOURS`].
    #[must_use]
    pub fn session_expire_hours(mut self, hours: i64) -> Self {
        self.session_expire_hours = hours;
        self
    }

    /// Sets the session loader.
    #[must_use]
    pub fn loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(&RequestView, &str) -> BoxFuture<'static, Result<Arc<dyn SessionInfo>, WebError>>
            + Send
            + Sync
            + 'static,
    {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Compiles the whitelist and builds the middleware.
    pub fn build(self) -> Result<AuthMiddleware, MiddlewareError> {
        if !(0..=MAX_SESSION_EXPIRE_HOURS).contains(&self.session_expire_hours) {
            return Err(MiddlewareError::InvalidSessionExpiry(self.session_expire_hours));
        }

        let mut seen = HashSet::new();
        let mut whitelist = Vec::new();
        for pattern in self.whitelist {
            if !seen.insert(pattern.clone()) {
                continue;
            }
            let re = Regex::new(&pattern)
                .map_err(|source| MiddlewareError::InvalidWhitelist { pattern, source })?;
            whitelist.push(re);
        }

        Ok(AuthMiddleware {
            enabled: self.enabled,
            whitelist,
            session_id_key: self.session_id_key,
            session_expire: Duration::hours(self.session_expire_hours),
            loader: self.loader,
            pool: Pool::new(),
        })
    }
}
