//! Route table.
//!
//! Patterns are absolute paths whose segments are either literals or
//! `{name}` parameters. A path matches a pattern with the same number of
//! segments; when several patterns match, the one with the most literal
//! segments wins, so `/orders/latest` beats `/orders/{id}`.
//!
//! ```rust
//! use keel_server::router::{RouteMatch, Router};
//! use keel_server::handler::wrap;
//! use keel_core::WebError;
//! use http::Method;
//!
//! async fn get_order() -> Result<(), WebError> {
//!     Ok(())
//! }
//!
//! let mut router = Router::new();
//! router.route(Method::GET, "/orders/{id}", wrap(get_order)).unwrap();
//!
//! match router.find(&Method::GET, "/orders/42") {
//!     RouteMatch::Found { params, .. } => assert_eq!(params, vec![("id".into(), "42".into())]),
//!     _ => panic!("route not found"),
//! }
//! assert!(matches!(router.find(&Method::POST, "/orders/42"), RouteMatch::MethodNotAllowed));
//! assert!(matches!(router.find(&Method::GET, "/users"), RouteMatch::NotFound));
//! ```

use crate::error::RegistrationError;
use crate::handler::RouteHandler;
use http::Method;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
}

struct Route {
    method: Method,
    pattern: String,
    segments: Vec<Segment>,
    handler: RouteHandler,
}

impl Route {
    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Static(_)))
            .count()
    }

    fn matches(&self, parts: &[&str]) -> Option<Vec<(String, String)>> {
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = Vec::new();
        for (segment, actual) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Static(expected) if expected == actual => {}
                Segment::Static(_) => return None,
                Segment::Param(name) => params.push((name.clone(), (*actual).to_string())),
            }
        }
        Some(params)
    }
}

/// Result of a route lookup.
pub enum RouteMatch {
    /// A route matched.
    Found {
        /// The route handler.
        handler: RouteHandler,
        /// Captured parameters, in pattern order.
        params: Vec<(String, String)>,
    },
    /// The path is known but not for this method.
    MethodNotAllowed,
    /// No route has this path.
    NotFound,
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found { params, .. } => f.debug_struct("Found").field("params", params).finish(),
            Self::MethodNotAllowed => f.write_str("MethodNotAllowed"),
            Self::NotFound => f.write_str("NotFound"),
        }
    }
}

/// Method and path router.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `method` and `pattern`.
    pub fn route(
        &mut self,
        method: Method,
        pattern: &str,
        handler: RouteHandler,
    ) -> Result<(), RegistrationError> {
        let segments = parse_pattern(pattern)?;
        if self
            .routes
            .iter()
            .any(|r| r.method == method && same_shape(&r.segments, &segments))
        {
            return Err(RegistrationError::DuplicateRoute {
                method: method.to_string(),
                pattern: pattern.to_string(),
            });
        }
        tracing::debug!(method = %method, pattern, "route registered");
        self.routes.push(Route {
            method,
            pattern: pattern.to_string(),
            segments,
            handler,
        });
        Ok(())
    }

    /// Looks up the handler for a request.
    #[must_use]
    pub fn find(&self, method: &Method, path: &str) -> RouteMatch {
        let parts = split_path(path);
        let mut path_known = false;
        let mut best: Option<(&Route, Vec<(String, String)>)> = None;

        for route in &self.routes {
            let Some(params) = route.matches(&parts) else {
                continue;
            };
            path_known = true;
            if route.method != *method {
                continue;
            }
            let better = best
                .as_ref()
                .map_or(true, |(current, _)| route.literal_count() > current.literal_count());
            if better {
                best = Some((route, params));
            }
        }

        match best {
            Some((route, params)) => RouteMatch::Found {
                handler: route.handler.clone(),
                params,
            },
            None if path_known => RouteMatch::MethodNotAllowed,
            None => RouteMatch::NotFound,
        }
    }

    /// Registered `(method, pattern)` pairs, in registration order.
    #[must_use]
    pub fn routes(&self) -> Vec<(Method, &str)> {
        self.routes
            .iter()
            .map(|r| (r.method.clone(), r.pattern.as_str()))
            .collect()
    }

    /// Number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes())
            .finish()
    }
}

// Parameter names do not distinguish routes.
fn same_shape(a: &[Segment], b: &[Segment]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|pair| match pair {
            (Segment::Static(x), Segment::Static(y)) => x == y,
            (Segment::Param(_), Segment::Param(_)) => true,
            _ => false,
        })
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn parse_pattern(pattern: &str) -> Result<Vec<Segment>, RegistrationError> {
    let invalid = |reason| RegistrationError::InvalidPattern {
        pattern: pattern.to_string(),
        reason,
    };
    if !pattern.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }

    let mut names: Vec<&str> = Vec::new();
    split_path(pattern)
        .into_iter()
        .map(|part| {
            match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some("") => Err(invalid("empty parameter name")),
                Some(name) if names.contains(&name) => Err(invalid("repeated parameter name")),
                Some(name) => {
                    names.push(name);
                    Ok(Segment::Param(name.to_string()))
                }
                None if part.contains(['{', '}']) => Err(invalid("unbalanced braces")),
                None => Ok(Segment::Static(part.to_string())),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::wrap;
    use keel_core::WebError;

    async fn noop() -> Result<(), WebError> {
        Ok(())
    }

    fn found_params(m: RouteMatch) -> Vec<(String, String)> {
        match m {
            RouteMatch::Found { params, .. } => params,
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn test_static_and_param_routes() {
        let mut router = Router::new();
        router.route(Method::GET, "/orders", wrap(noop)).unwrap();
        router
            .route(Method::GET, "/orders/{id}/items/{item}", wrap(noop))
            .unwrap();

        assert!(found_params(router.find(&Method::GET, "/orders")).is_empty());
        assert_eq!(
            found_params(router.find(&Method::GET, "/orders/7/items/3")),
            vec![("id".into(), "7".into()), ("item".into(), "3".into())]
        );
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn test_trailing_slash_is_ignored() {
        let mut router = Router::new();
        router.route(Method::GET, "/orders", wrap(noop)).unwrap();
        assert!(matches!(
            router.find(&Method::GET, "/orders/"),
            RouteMatch::Found { .. }
        ));
    }

    #[test]
    fn test_literal_beats_param() {
        let mut router = Router::new();
        router.route(Method::GET, "/orders/{id}", wrap(noop)).unwrap();
        router.route(Method::GET, "/orders/latest", wrap(noop)).unwrap();
        assert!(found_params(router.find(&Method::GET, "/orders/latest")).is_empty());
        assert_eq!(found_params(router.find(&Method::GET, "/orders/9")).len(), 1);
    }

    #[test]
    fn test_method_not_allowed_and_not_found() {
        let mut router = Router::new();
        router.route(Method::POST, "/orders", wrap(noop)).unwrap();
        assert!(matches!(
            router.find(&Method::GET, "/orders"),
            RouteMatch::MethodNotAllowed
        ));
        assert!(matches!(
            router.find(&Method::GET, "/users"),
            RouteMatch::NotFound
        ));
    }

    #[test]
    fn test_rejects_duplicates() {
        let mut router = Router::new();
        router.route(Method::GET, "/orders/{id}", wrap(noop)).unwrap();
        let err = router
            .route(Method::GET, "/orders/{order}", wrap(noop))
            .unwrap_err();
        assert_eq!(err.to_string(), "duplicate route GET /orders/{order}");
        assert!(router.route(Method::PUT, "/orders/{id}", wrap(noop)).is_ok());
    }

    #[test]
    fn test_rejects_bad_patterns() {
        let mut router = Router::new();
        for pattern in ["orders", "/orders/{}", "/a/{id}/{id}", "/a/{id"] {
            assert!(
                matches!(
                    router.route(Method::GET, pattern, wrap(noop)),
                    Err(RegistrationError::InvalidPattern { .. })
                ),
                "{pattern}"
            );
        }
        assert!(router.is_empty());
    }
}
