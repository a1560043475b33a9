//! # Keel Middleware
//!
//! Per-request middleware pipeline for keel.
//!
//! ```text
//! Request → Trace → Auth → ACL → Audit → Handler
//! ```
//!
//! | Stage | Middleware | Attaches | Short-circuits with |
//! |-------|------------|----------|---------------------|
//! | 1 | [`TraceMiddleware`](stages::TraceMiddleware) | `TraceInfo` | never |
//! | 2 | [`AuthMiddleware`](stages::AuthMiddleware) | `AuthSession` | `Unauthorized` (4401) |
//! | 3 | [`AclMiddleware`](stages::AclMiddleware) | `AclDecision` | `Forbidden` (4403), hook or loader error |
//! | 4 | [`AuditMiddleware`](stages::AuditMiddleware) | `AuditRecord` | never |
//!
//! Every entity comes from a per-stage [`keel_core::Pool`], is reset on
//! acquire and on release, and is detached from the context only after the
//! downstream stages have returned.
//!
//! ## Example
//!
//! ```
//! use keel_middleware::pipeline::{Pipeline, Stage};
//!
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 4);
//! assert_eq!(stages[0].name(), "trace");
//! assert_eq!(stages[3].name(), "audit");
//! ```

#![doc(html_root_url = "https://docs.rs/keel-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod error;
pub mod middleware;
pub mod pipeline;
pub mod skipper;
pub mod stages;

pub use context::MiddlewareContext;
pub use error::MiddlewareError;
pub use keel_core::{Request, Response};
pub use middleware::{BoxFuture, Endpoint, Middleware, Next};
pub use pipeline::{Pipeline, PipelineBuilder, Stage};
pub use skipper::Skipper;
