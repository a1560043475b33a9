//! Pluggable payload validation.
//!
//! The handler adapter validates every bound payload through a
//! [`Validator`]. [`DefaultValidator`] runs the payload's own
//! [`Payload::validate`] rules; applications can install their own
//! validator to add cross-cutting checks. A custom validator sees the
//! payload as a [`Validatable`] trait object and may downcast it.

use crate::payload::Payload;
use keel_core::{code, FieldErrors, WebError};
use std::any::Any;
use std::sync::Arc;

/// A bound payload as seen by a [`Validator`].
pub trait Validatable: Send + Sync {
    /// Runs the payload's own rules.
    fn validate_fields(&self) -> Result<(), FieldErrors>;

    /// Returns the payload for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Rust type name of the payload.
    fn type_name(&self) -> &'static str;
}

impl<P: Payload> Validatable for P {
    fn validate_fields(&self) -> Result<(), FieldErrors> {
        self.validate()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<P>()
    }
}

impl dyn Validatable + '_ {
    /// Returns the payload as `T` if it has that type.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Validates bound payloads.
pub trait Validator: Send + Sync + 'static {
    /// Returns the field errors found in `payload`.
    fn validate(&self, payload: &dyn Validatable) -> Result<(), FieldErrors>;
}

/// Shared validator handle.
pub type SharedValidator = Arc<dyn Validator>;

/// Validator that runs each payload's own rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValidator;

impl Validator for DefaultValidator {
    fn validate(&self, payload: &dyn Validatable) -> Result<(), FieldErrors> {
        payload.validate_fields()
    }
}

/// Validator backed by a closure. Build one with [`validator_fn`].
pub struct FnValidator<F>(F);

impl<F> Validator for FnValidator<F>
where
    F: Fn(&dyn Validatable) -> Result<(), FieldErrors> + Send + Sync + 'static,
{
    fn validate(&self, payload: &dyn Validatable) -> Result<(), FieldErrors> {
        (self.0)(payload)
    }
}

/// Wraps a closure as a [`Validator`].
///
/// # Example
///
/// ```rust
/// use keel_core::FieldErrors;
/// use keel_extract::{validator_fn, Validatable, Validator};
///
/// let strict = validator_fn(|payload: &dyn Validatable| {
///     payload.validate_fields()?;
///     match payload.downcast_ref::<serde_json::Value>() {
///         Some(value) if value.is_null() => Err(FieldErrors::single("", "payload required")),
///         _ => Ok(()),
///     }
/// });
///
/// assert!(strict.validate(&serde_json::Value::Null).is_err());
/// assert!(strict.validate(&serde_json::json!({"a": 1})).is_ok());
/// ```
pub fn validator_fn<F>(f: F) -> FnValidator<F>
where
    F: Fn(&dyn Validatable) -> Result<(), FieldErrors> + Send + Sync + 'static,
{
    FnValidator(f)
}

/// The error returned to the client when validation fails.
#[must_use]
pub fn invalid_params(errors: &FieldErrors) -> WebError {
    WebError::biz_msg(code::INVALID_PARAMS, format!("Invalid Params: {errors}"))
}
