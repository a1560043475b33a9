//! Access-control decision of a request.

use crate::pool::Reset;
use crate::view::RequestView;
use http::Method;
use std::fmt;
use std::sync::Arc;

/// A permission that may or may not apply to a request.
pub trait Permission: Send + Sync + fmt::Debug {
    /// Name of the permission, used in logs.
    fn name(&self) -> &str;

    /// Returns `true` if this permission grants access to `request`.
    fn matches(&self, request: &RequestView) -> bool;
}

/// Permission granting a method (or any method) on a path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePermission {
    name: String,
    method: Option<Method>,
    path_prefix: String,
}

impl RoutePermission {
    /// Grants every method under `path_prefix`.
    #[must_use]
    pub fn any_method(name: impl Into<String>, path_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: None,
            path_prefix: path_prefix.into(),
        }
    }

    /// Grants `method` under `path_prefix`.
    #[must_use]
    pub fn new(name: impl Into<String>, method: Method, path_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: Some(method),
            path_prefix: path_prefix.into(),
        }
    }
}

impl Permission for RoutePermission {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, request: &RequestView) -> bool {
        self.method.as_ref().map_or(true, |m| m == request.method())
            && request.path().starts_with(&self.path_prefix)
    }
}

/// Permissions loaded for a request and the subset that matched it.
///
/// When ACL evaluation ran, an empty `matched` set means the request is
/// forbidden.
#[derive(Debug, Clone, Default)]
pub struct AclDecision {
    /// Every permission the loader returned.
    pub all: Vec<Arc<dyn Permission>>,
    /// Permissions whose predicate matched the request.
    pub matched: Vec<Arc<dyn Permission>>,
}

impl AclDecision {
    /// Replaces `all` with `permissions` and recomputes `matched`.
    pub fn evaluate(&mut self, permissions: Vec<Arc<dyn Permission>>, request: &RequestView) {
        self.matched.clear();
        self.matched.extend(permissions.iter().filter(|p| p.matches(request)).cloned());
        self.all = permissions;
    }

    /// Returns `true` if at least one permission matched.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        !self.matched.is_empty()
    }

    /// Names of the matched permissions.
    #[must_use]
    pub fn matched_names(&self) -> Vec<&str> {
        self.matched.iter().map(|p| p.name()).collect()
    }
}

impl Reset for AclDecision {
    fn reset(&mut self) {
        self.all.clear();
        self.matched.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RequestStore;

    fn view(method: Method, uri: &str) -> RequestView {
        let request = http::Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .unwrap();
        RequestView::from_request(&request, RequestStore::new())
    }

    #[test]
    fn test_route_permission_matching() {
        let read = RoutePermission::new("orders:read", Method::GET, "/orders");
        assert!(read.matches(&view(Method::GET, "/orders/1")));
        assert!(!read.matches(&view(Method::DELETE, "/orders/1")));
        assert!(!read.matches(&view(Method::GET, "/users")));
        assert!(RoutePermission::any_method("all", "/").matches(&view(Method::PUT, "/x")));
    }

    #[test]
    fn test_evaluate_collects_matches() {
        let mut decision = AclDecision::default();
        decision.evaluate(
            vec![
                Arc::new(RoutePermission::new("orders:read", Method::GET, "/orders")),
                Arc::new(RoutePermission::new("users:read", Method::GET, "/users")),
            ],
            &view(Method::GET, "/orders"),
        );
        assert_eq!(decision.all.len(), 2);
        assert_eq!(decision.matched_names(), vec!["orders:read"]);
        assert!(decision.is_allowed());
    }

    #[test]
    fn test_no_match_is_not_allowed() {
        let mut decision = AclDecision::default();
        decision.evaluate(
            vec![Arc::new(RoutePermission::new("users:read", Method::GET, "/users"))],
            &view(Method::GET, "/orders"),
        );
        assert!(!decision.all.is_empty());
        assert!(!decision.is_allowed());
    }
}
