//! # Keel Core
//!
//! Core types for the keel request pipeline.
//!
//! - [`code`] - Business error codes and the status-to-code mapping
//! - [`WebError`] / [`BizError`] - Error types returned by handlers and stages
//! - [`envelope`] - The `{code, msg, data}` envelope, classification and redaction
//! - [`Pool`] - Free-list pool for per-request entities
//! - [`TraceInfo`], [`AuthSession`], [`AclDecision`], [`AuditRecord`] - Pooled
//!   per-request entities
//! - [`RequestContext`] - Handle given to business functions
//! - [`RequestView`] - Request snapshot given to callbacks

#![doc(html_root_url = "https://docs.rs/keel-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod acl;
pub mod audit;
pub mod code;
mod context;
pub mod envelope;
mod error;
pub mod pool;
pub mod session;
mod store;
pub mod trace;
mod types;
mod view;

pub use acl::{AclDecision, Permission, RoutePermission};
pub use audit::{AuditCell, AuditRecord};
pub use context::{CachedPayload, CommitSlot, RequestContext, RequestContextBuilder};
pub use envelope::{Envelope, ErrorOutcome};
pub use error::{BizError, ErrCategory, FieldErrors, WebError, WebResult};
pub use pool::{Pool, Pooled, Reset};
pub use session::{AuthSession, SessionInfo};
pub use store::RequestStore;
pub use trace::TraceInfo;
pub use types::{BoxFuture, Request, Response};
pub use view::{PeerAddr, RequestView};
