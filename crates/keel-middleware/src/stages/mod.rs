//! Core middleware stages.
//!
//! These run in a fixed order (see [`crate::pipeline::Stage`]):
//!
//! 1. [`trace`] - Request identifier and span
//! 2. [`auth`] - Session resolution against an injected loader
//! 3. [`acl`] - Permission loading and matching
//! 4. [`audit`] - Audit record and flush
//!
//! [`logger`] writes access logs and is installed as an extra layer.

pub mod acl;
pub mod audit;
pub mod auth;
pub mod logger;
pub mod trace;

pub use acl::{
    AclMiddleware, AclMiddlewareBuilder, BeforeHook, HookFuture, PermissionFuture, PermissionLoader,
};
pub use audit::{AuditMiddleware, AuditMiddlewareBuilder, FlushFn, FlushFuture};
pub use auth::{AuthMiddleware, AuthMiddlewareBuilder, SessionLoader, DEFAULT_SESSION_ID_KEY};
pub use logger::{BodyKind, LoggerMiddleware, LoggerMiddlewareBuilder};
pub use trace::{TraceIdGenerator, TraceIdHook, TraceMiddleware};
