//! # Keel Extract
//!
//! Request binding and validation for keel handlers.
//!
//! A handler's input is a [`Payload`]: a deserializable type with optional
//! validation rules. The handler adapter binds it with [`bind`], then runs
//! it through a [`Validator`]. Binding failures become `4400` business
//! errors, validation failures `4422` ones, and neither reaches the
//! business function.
//!
//! ## Example
//!
//! ```rust
//! use bytes::Bytes;
//! use http::{HeaderMap, Method};
//! use keel_extract::{bind, BindContext, DefaultValidator, Payload, Validator};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Page {
//!     page: u32,
//! }
//!
//! impl Payload for Page {}
//!
//! let ctx = BindContext::new(
//!     Method::GET,
//!     "/orders?page=3".parse().unwrap(),
//!     HeaderMap::new(),
//!     Bytes::new(),
//!     Vec::new(),
//! );
//!
//! let page: Page = bind(&ctx).unwrap();
//! assert_eq!(page.page, 3);
//! assert!(DefaultValidator.validate(&page).is_ok());
//! ```

#![doc(html_root_url = "https://docs.rs/keel-extract/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod bind;
mod error;
mod payload;
mod validate;

pub use bind::{bind, collect_body, BindContext, RawBody};
pub use error::BindError;
pub use payload::{Payload, PayloadKind};
pub use validate::{
    invalid_params, validator_fn, DefaultValidator, FnValidator, SharedValidator, Validatable,
    Validator,
};
