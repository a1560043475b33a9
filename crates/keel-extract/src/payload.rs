//! Payload types a handler can receive.
//!
//! A payload is any type that can be deserialized from the request and
//! validated. [`PayloadKind`] records its shape, which decides what an
//! empty request binds to.

use keel_core::FieldErrors;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// Shape of a payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// A plain value, bound from the body or from query and path parameters.
    Value,
    /// A boxed value, bound like [`PayloadKind::Value`].
    Boxed,
    /// A sequence; an empty body binds to an empty sequence.
    Sequence,
}

impl PayloadKind {
    /// Short name used in registration errors and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Boxed => "boxed",
            Self::Sequence => "sequence",
        }
    }
}

/// A type that can be bound from a request and validated.
///
/// Implement it for request structs, overriding [`Payload::validate`] when
/// the struct has rules beyond what deserialization enforces.
///
/// # Example
///
/// ```rust
/// use keel_core::FieldErrors;
/// use keel_extract::Payload;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct CreateOrder {
///     sku: String,
///     quantity: u32,
/// }
///
/// impl Payload for CreateOrder {
///     fn validate(&self) -> Result<(), FieldErrors> {
///         if self.quantity == 0 {
///             return Err(FieldErrors::single("quantity", "must be positive"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Payload: DeserializeOwned + Send + Sync + 'static {
    /// Shape of this payload.
    const KIND: PayloadKind = PayloadKind::Value;

    /// Checks the bound value.
    fn validate(&self) -> Result<(), FieldErrors> {
        Ok(())
    }
}

impl<T: Payload> Payload for Box<T> {
    const KIND: PayloadKind = PayloadKind::Boxed;

    fn validate(&self) -> Result<(), FieldErrors> {
        (**self).validate()
    }
}

impl<T: Payload> Payload for Vec<T> {
    const KIND: PayloadKind = PayloadKind::Sequence;

    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        for (index, item) in self.iter().enumerate() {
            if let Err(item_errors) = item.validate() {
                errors.merge_prefixed(&format!("[{index}]"), item_errors);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Payload for serde_json::Value {}

impl Payload for HashMap<String, String> {}
