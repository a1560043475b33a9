//! # Keel
//!
//! Turns plain async business functions into HTTP handlers that speak a
//! uniform `{code, msg, data}` envelope, behind a fixed
//! Trace → Auth → ACL → Audit pipeline:
//!
//! ```text
//! Request → Trace → Auth → ACL → Audit → [layers] → adapter → business fn
//!                                                                  ↓
//! Response ← global error handler ← envelope / committed response ←┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keel::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct CreateOrder {
//!     sku: String,
//! }
//!
//! impl Payload for CreateOrder {}
//!
//! async fn create(ctx: RequestContext, req: CreateOrder) -> Result<String, WebError> {
//!     ctx.with_audit(|record| record.set_resource_id(req.sku.clone()));
//!     Ok(req.sku)
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().with_optional_file("web.toml")?.load()?;
//!     init_logging(&LogConfig::from(&config.logging))?;
//!
//!     Web::builder()
//!         .config(config)
//!         .post("/orders", create)
//!         .build()?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/keel/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use keel_config as config;
pub use keel_core as core;
pub use keel_extract as extract;
pub use keel_middleware as middleware;
pub use keel_server as server;
pub use keel_telemetry as telemetry;

/// Common imports.
///
/// ```rust
/// use keel::prelude::*;
///
/// let err = WebError::biz_msg(code::NOT_FOUND, "no such order");
/// assert_eq!(err.to_string(), "[4404] no such order");
/// ```
pub mod prelude {
    pub use keel_config::{ConfigLoader, WebConfig};
    pub use keel_core::{
        code, AclDecision, AuditRecord, AuthSession, BizError, BoxFuture, FieldErrors, Permission,
        RequestContext, RequestView, RoutePermission, SessionInfo, WebError, WebResult,
    };
    pub use keel_extract::{validator_fn, Payload, PayloadKind, Validator};
    pub use keel_middleware::skipper::{self, Skipper};
    pub use keel_middleware::stages::LoggerMiddleware;
    pub use keel_middleware::Middleware;
    pub use keel_server::{
        wrap, wrap_with, DynHandler, DynReturn, InputKind, OutputKind, Signature, Web, WebBuilder,
        WrapOptions,
    };
    pub use keel_telemetry::{init_logging, LogConfig};
}
