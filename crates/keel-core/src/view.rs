//! Read-only snapshot of the inbound request.
//!
//! Callbacks (session lookup, permission loading, audit flush) receive a
//! [`RequestView`] instead of the request itself. The view owns copies of
//! the method, URI and headers, so it remains usable after the request body
//! has been handed to the next stage.

use crate::store::RequestStore;
use http::{HeaderMap, Method, Uri};
use std::net::SocketAddr;

/// Peer address of the connection, recorded by the server as a request
/// extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

/// Snapshot of request metadata.
#[derive(Debug, Clone)]
pub struct RequestView {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    peer_addr: Option<SocketAddr>,
    store: RequestStore,
}

impl RequestView {
    /// Captures the metadata of `request`.
    #[must_use]
    pub fn from_request<B>(request: &http::Request<B>, store: RequestStore) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
            peer_addr: request.extensions().get::<PeerAddr>().map(|p| p.0),
            store,
        }
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Request path, without the query.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Path and query as received.
    #[must_use]
    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map_or_else(|| self.uri.path(), |pq| pq.as_str())
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the first query parameter named `name`.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.uri.query()?;
        serde_urlencoded::from_str::<Vec<(String, String)>>(query)
            .ok()?
            .into_iter()
            .find_map(|(k, v)| (k == name).then_some(v))
    }

    /// Peer address of the connection, if known.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Client IP: first `x-forwarded-for` entry, then `x-real-ip`, then the
    /// peer address. Empty when none is known.
    #[must_use]
    pub fn client_ip(&self) -> String {
        if let Some(forwarded) = self.header("x-forwarded-for") {
            if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
                return first.to_string();
            }
        }
        if let Some(real) = self.header("x-real-ip").map(str::trim) {
            if !real.is_empty() {
                return real.to_string();
            }
        }
        self.peer_addr
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default()
    }

    /// `User-Agent` header, or empty.
    #[must_use]
    pub fn user_agent(&self) -> String {
        self.header(http::header::USER_AGENT.as_str())
            .unwrap_or_default()
            .to_string()
    }

    /// The request's value store.
    #[must_use]
    pub fn store(&self) -> &RequestStore {
        &self.store
    }
}
