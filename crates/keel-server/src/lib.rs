//! # Keel Server
//!
//! Handler adapter, router and HTTP host for keel.
//!
//! - [`handler`] - Turns business functions into route handlers
//! - [`router`] - Method and path pattern matching
//! - [`error_handler`] - Last-resort response handling and failure logging
//! - [`Web`] / [`WebBuilder`] - Pipeline, routes and configuration in one place
//! - [`shutdown`] - Shutdown signal and connection tracking
//!
//! ## Example
//!
//! ```rust,no_run
//! use keel_config::ConfigLoader;
//! use keel_core::{RequestContext, WebError};
//! use keel_server::Web;
//!
//! async fn whoami(ctx: RequestContext) -> Result<String, WebError> {
//!     Ok(ctx.trace_id().to_string())
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().with_optional_file("web.toml")?.load()?;
//!     Web::builder()
//!         .config(config)
//!         .get("/whoami", whoami)
//!         .build()?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/keel-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod error_handler;
pub mod handler;
pub mod router;
mod server;
pub mod shutdown;
mod web;

pub use error::{RegistrationError, ServerError};
pub use handler::{
    wrap, wrap_with, DynArgs, DynHandler, DynReturn, Handler, InputKind, Invocation, OutputKind,
    RouteHandler, Signature, WrapOptions, PANIC_MESSAGE,
};
pub use router::{RouteMatch, Router};
pub use shutdown::ShutdownSignal;
pub use web::{Web, WebBuilder, DEFAULT_BODY_LIMIT, DEFAULT_SHUTDOWN_TIMEOUT};
