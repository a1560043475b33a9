//! Generic handler adapter.
//!
//! [`wrap`] turns a business function into a [`RouteHandler`]. The function
//! may take no input, the [`RequestContext`], a [`Payload`], or the context
//! followed by a payload, and returns `Result<T, E>` where `T: Serialize`
//! and `E: Into<WebError>`. A function returning `Result<(), E>` has no
//! data output and answers with `"data": null`.
//!
//! Each invocation:
//!
//! 1. reads the body, keeping a copy in the request store when duplicate
//!    binding is allowed
//! 2. binds and validates the payload; failures answer `4400` / `4422`
//!    without calling the function
//! 3. caches the payload when asked to
//! 4. calls the function inside a panic boundary
//! 5. records a failure into the audit record
//! 6. writes the envelope, unless the function committed its own response
//!
//! Shapes that cannot be checked by the compiler go through [`DynHandler`],
//! whose [`Signature`] is validated when it is created.
//!
//! # Example
//!
//! ```rust
//! use keel_core::{RequestContext, WebError};
//! use keel_extract::Payload;
//! use keel_server::handler::{wrap, wrap_with, WrapOptions};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct CreateOrder {
//!     sku: String,
//! }
//!
//! impl Payload for CreateOrder {}
//!
//! #[derive(Serialize)]
//! struct Order {
//!     id: u64,
//!     sku: String,
//! }
//!
//! async fn create(ctx: RequestContext, req: CreateOrder) -> Result<Order, WebError> {
//!     ctx.with_audit(|record| record.set_resource_id("order-1"));
//!     Ok(Order { id: 1, sku: req.sku })
//! }
//!
//! async fn ping() -> Result<(), WebError> {
//!     Ok(())
//! }
//!
//! let _create = wrap_with(create, WrapOptions::new().cache_payload());
//! let _ping = wrap(ping);
//! ```

use crate::error::RegistrationError;
use futures_util::FutureExt;
use keel_core::envelope::{error_response, json_response, success_response};
use keel_core::{BoxFuture, CachedPayload, Request, RequestContext, Response, WebError};
use keel_extract::{
    bind, collect_body, invalid_params, BindContext, DefaultValidator, Payload, PayloadKind,
    RawBody, SharedValidator, Validator,
};
use serde::Serialize;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::Instrument;

/// Message of the internal error a recovered panic turns into.
pub const PANIC_MESSAGE: &str = "Server is busy";

/// A handler with the fixed request-in, response-out contract.
pub type RouteHandler =
    Arc<dyn Fn(RequestContext, Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// Kind of a handler input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// The request context.
    Context,
    /// A bound payload of the given shape.
    Payload(PayloadKind),
}

/// Kind of a handler output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Response data.
    Data,
    /// The error slot.
    Error,
}

/// Input and output shape of a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Inputs, in call order.
    pub inputs: Vec<InputKind>,
    /// Outputs, in return order.
    pub outputs: Vec<OutputKind>,
}

impl Signature {
    /// Creates a signature.
    #[must_use]
    pub fn new(inputs: Vec<InputKind>, outputs: Vec<OutputKind>) -> Self {
        Self { inputs, outputs }
    }

    /// Shape of the payload input, if there is one.
    #[must_use]
    pub fn payload_kind(&self) -> Option<PayloadKind> {
        self.inputs.iter().find_map(|input| match input {
            InputKind::Payload(kind) => Some(*kind),
            InputKind::Context => None,
        })
    }

    /// Returns `true` if the context is an input.
    #[must_use]
    pub fn takes_context(&self) -> bool {
        self.inputs.contains(&InputKind::Context)
    }

    /// Returns `true` if the handler produces data.
    #[must_use]
    pub fn returns_data(&self) -> bool {
        self.outputs.first() == Some(&OutputKind::Data)
    }

    /// Checks the shape rules for the handler called `handler`.
    pub fn check(&self, handler: &str) -> Result<(), RegistrationError> {
        let handler = handler.to_string();
        match self.inputs.as_slice() {
            [] | [_] => {}
            [first, second] => {
                if *first != InputKind::Context {
                    return Err(RegistrationError::ContextNotFirst { handler });
                }
                if *second == InputKind::Context {
                    return Err(RegistrationError::PayloadNotSecond { handler });
                }
            }
            inputs => {
                return Err(RegistrationError::TooManyInputs {
                    handler,
                    count: inputs.len(),
                })
            }
        }

        match self.outputs.as_slice() {
            [OutputKind::Error] | [OutputKind::Data, OutputKind::Error] => Ok(()),
            [_] | [_, OutputKind::Data] => Err(RegistrationError::LastOutputNotError { handler }),
            [_, _] => Err(RegistrationError::DataNotFirst { handler }),
            outputs => Err(RegistrationError::OutputCount {
                handler,
                count: outputs.len(),
            }),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs: Vec<String> = self
            .inputs
            .iter()
            .map(|input| match input {
                InputKind::Context => "context".to_string(),
                InputKind::Payload(kind) => format!("payload:{}", kind.name()),
            })
            .collect();
        let outputs: Vec<&str> = self
            .outputs
            .iter()
            .map(|output| match output {
                OutputKind::Data => "data",
                OutputKind::Error => "error",
            })
            .collect();
        write!(f, "({}) -> ({})", inputs.join(", "), outputs.join(", "))
    }
}

/// Per-handler behaviour switches.
#[derive(Clone)]
pub struct WrapOptions {
    allow_duplicate_bind: bool,
    skip_format: bool,
    cache_payload: bool,
    validator: SharedValidator,
}

impl Default for WrapOptions {
    fn default() -> Self {
        Self {
            allow_duplicate_bind: false,
            skip_format: false,
            cache_payload: false,
            validator: Arc::new(DefaultValidator),
        }
    }
}

impl fmt::Debug for WrapOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapOptions")
            .field("allow_duplicate_bind", &self.allow_duplicate_bind)
            .field("skip_format", &self.skip_format)
            .field("cache_payload", &self.cache_payload)
            .finish_non_exhaustive()
    }
}

impl WrapOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the raw body in the request store as [`RawBody`] so it can be
    /// read again after binding.
    #[must_use]
    pub fn allow_duplicate_bind(mut self) -> Self {
        self.allow_duplicate_bind = true;
        self
    }

    /// Writes the raw data on success instead of an envelope. Errors are
    /// still written as redacted envelopes.
    #[must_use]
    pub fn skip_format(mut self) -> Self {
        self.skip_format = true;
        self
    }

    /// Stores the bound payload in the request store.
    #[must_use]
    pub fn cache_payload(mut self) -> Self {
        self.cache_payload = true;
        self
    }

    /// Replaces the validator.
    #[must_use]
    pub fn validator(mut self, validator: impl Validator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Replaces the validator with a shared one.
    #[must_use]
    pub fn shared_validator(mut self, validator: SharedValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Returns `true` if duplicate binding is allowed.
    #[must_use]
    pub fn allows_duplicate_bind(&self) -> bool {
        self.allow_duplicate_bind
    }

    /// Returns `true` if formatting is skipped.
    #[must_use]
    pub fn skips_format(&self) -> bool {
        self.skip_format
    }

    /// Returns `true` if the payload is cached.
    #[must_use]
    pub fn caches_payload(&self) -> bool {
        self.cache_payload
    }
}

/// Request data handed to a [`Handler`].
pub struct Invocation {
    ctx: RequestContext,
    bind: BindContext,
    options: Arc<WrapOptions>,
}

impl Invocation {
    /// Creates an invocation.
    #[must_use]
    pub fn new(ctx: RequestContext, bind: BindContext, options: Arc<WrapOptions>) -> Self {
        Self { ctx, bind, options }
    }

    /// The request context.
    #[must_use]
    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// The data binding reads from.
    #[must_use]
    pub fn bind_context(&self) -> &BindContext {
        &self.bind
    }

    /// Binds and validates a payload, caching it when configured.
    pub fn payload<P: Payload>(&self) -> Result<P, WebError> {
        let payload: P = bind(&self.bind)?;
        if let Err(errors) = self.options.validator.validate(&payload) {
            tracing::debug!(
                payload = std::any::type_name::<P>(),
                errors = %errors,
                "payload validation failed"
            );
            return Err(invalid_params(&errors));
        }
        if self.options.cache_payload {
            self.cache::<P>();
        }
        Ok(payload)
    }

    // Binding is deterministic, so the cached copy equals the returned one.
    fn cache<P: Payload>(&self) {
        if let Ok(copy) = bind::<P>(&self.bind) {
            self.ctx.store().insert(CachedPayload(Arc::new(copy)));
        }
    }
}

/// Marker for arguments taken from the request context.
#[derive(Debug)]
pub enum ViaContext {}

/// Marker for arguments bound from the request.
#[derive(Debug)]
pub enum ViaPayload {}

/// A value a handler can take as its single input.
pub trait HandlerArg<M>: Sized + Send + 'static {
    /// Kind of this input.
    const KIND: InputKind;

    /// Produces the argument.
    fn from_invocation(invocation: &Invocation) -> Result<Self, WebError>;
}

impl HandlerArg<ViaContext> for RequestContext {
    const KIND: InputKind = InputKind::Context;

    fn from_invocation(invocation: &Invocation) -> Result<Self, WebError> {
        Ok(invocation.ctx.clone())
    }
}

impl<P: Payload> HandlerArg<ViaPayload> for P {
    const KIND: InputKind = InputKind::Payload(P::KIND);

    fn from_invocation(invocation: &Invocation) -> Result<Self, WebError> {
        invocation.payload::<P>()
    }
}

/// What a business function returns.
pub trait IntoReply: Send + 'static {
    /// Declared outputs.
    fn outputs() -> Vec<OutputKind>;

    /// Converts into response data or an error.
    fn into_reply(self) -> Result<Value, WebError>;
}

impl<T, E> IntoReply for Result<T, E>
where
    T: Serialize + Send + 'static,
    E: Into<WebError> + Send + 'static,
{
    fn outputs() -> Vec<OutputKind> {
        if TypeId::of::<T>() == TypeId::of::<()>() {
            vec![OutputKind::Error]
        } else {
            vec![OutputKind::Data, OutputKind::Error]
        }
    }

    fn into_reply(self) -> Result<Value, WebError> {
        let data = self.map_err(Into::into)?;
        serde_json::to_value(data)
            .map_err(|e| WebError::internal_with_source("failed to serialise response", e))
    }
}

/// A business function the adapter can call.
///
/// Implemented for functions of the accepted shapes and for [`DynHandler`].
pub trait Handler<M>: Send + Sync + 'static {
    /// Shape of the function.
    fn signature(&self) -> Signature;

    /// Assembles the inputs and calls the function.
    fn call(&self, invocation: Invocation) -> BoxFuture<'static, Result<Value, WebError>>;
}

/// Marker for functions without inputs.
#[derive(Debug)]
pub struct Arity0;

/// Marker for functions with one input.
#[derive(Debug)]
pub struct Arity1<M, A>(PhantomData<fn() -> (M, A)>);

/// Marker for functions taking the context and a payload.
#[derive(Debug)]
pub struct Arity2<P>(PhantomData<fn() -> P>);

fn failed(err: WebError) -> BoxFuture<'static, Result<Value, WebError>> {
    Box::pin(std::future::ready(Err(err)))
}

impl<F, Fut, R> Handler<Arity0> for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply,
{
    fn signature(&self) -> Signature {
        Signature::new(Vec::new(), R::outputs())
    }

    fn call(&self, _invocation: Invocation) -> BoxFuture<'static, Result<Value, WebError>> {
        let fut = self();
        Box::pin(async move { fut.await.into_reply() })
    }
}

impl<F, Fut, R, M, A> Handler<Arity1<M, A>> for F
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply,
    A: HandlerArg<M>,
    M: 'static,
{
    fn signature(&self) -> Signature {
        Signature::new(vec![A::KIND], R::outputs())
    }

    fn call(&self, invocation: Invocation) -> BoxFuture<'static, Result<Value, WebError>> {
        match A::from_invocation(&invocation) {
            Ok(arg) => {
                let fut = self(arg);
                Box::pin(async move { fut.await.into_reply() })
            }
            Err(err) => failed(err),
        }
    }
}

impl<F, Fut, R, P> Handler<Arity2<P>> for F
where
    F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply,
    P: Payload,
{
    fn signature(&self) -> Signature {
        Signature::new(
            vec![InputKind::Context, InputKind::Payload(P::KIND)],
            R::outputs(),
        )
    }

    fn call(&self, invocation: Invocation) -> BoxFuture<'static, Result<Value, WebError>> {
        match invocation.payload::<P>() {
            Ok(payload) => {
                let fut = self(invocation.ctx.clone(), payload);
                Box::pin(async move { fut.await.into_reply() })
            }
            Err(err) => failed(err),
        }
    }
}

/// Inputs of a [`DynHandler`] call, filled per its signature.
#[derive(Debug, Default)]
pub struct DynArgs {
    /// The request context, when the signature takes it.
    pub context: Option<RequestContext>,
    /// The bound payload, when the signature takes one.
    pub payload: Option<Value>,
}

/// Outputs of a [`DynHandler`] call.
#[derive(Debug, Default)]
pub struct DynReturn {
    /// Response data; ignored when the signature has no data output.
    pub data: Option<Value>,
    /// The error slot.
    pub error: Option<WebError>,
}

impl DynReturn {
    /// A successful return.
    #[must_use]
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    /// A failed return.
    #[must_use]
    pub fn error(error: impl Into<WebError>) -> Self {
        Self {
            data: None,
            error: Some(error.into()),
        }
    }
}

type DynFn = Arc<dyn Fn(DynArgs) -> BoxFuture<'static, DynReturn> + Send + Sync>;

/// Marker for [`DynHandler`].
#[derive(Debug)]
pub enum Dynamic {}

/// A handler whose shape is only known at runtime.
///
/// The payload, if any, is bound as a JSON value (an array for
/// [`PayloadKind::Sequence`]).
///
/// # Example
///
/// ```rust
/// use keel_extract::PayloadKind;
/// use keel_server::handler::{DynHandler, DynReturn, InputKind, OutputKind, Signature};
///
/// let echo = DynHandler::new(
///     "echo",
///     Signature::new(
///         vec![InputKind::Payload(PayloadKind::Value)],
///         vec![OutputKind::Data, OutputKind::Error],
///     ),
///     |args| Box::pin(async move { DynReturn::data(args.payload.unwrap_or_default()) }),
/// );
/// assert!(echo.is_ok());
///
/// let broken = DynHandler::new(
///     "broken",
///     Signature::new(vec![], vec![OutputKind::Data]),
///     |_args| Box::pin(async { DynReturn::default() }),
/// );
/// assert!(broken.is_err());
/// ```
#[derive(Clone)]
pub struct DynHandler {
    name: String,
    signature: Signature,
    func: DynFn,
}

impl DynHandler {
    /// Validates `signature` and creates the handler.
    pub fn new<F>(
        name: impl Into<String>,
        signature: Signature,
        func: F,
    ) -> Result<Self, RegistrationError>
    where
        F: Fn(DynArgs) -> BoxFuture<'static, DynReturn> + Send + Sync + 'static,
    {
        let name = name.into();
        signature.check(&name)?;
        Ok(Self {
            name,
            signature,
            func: Arc::new(func),
        })
    }

    /// Handler name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for DynHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynHandler")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

impl Handler<Dynamic> for DynHandler {
    fn signature(&self) -> Signature {
        self.signature.clone()
    }

    fn call(&self, invocation: Invocation) -> BoxFuture<'static, Result<Value, WebError>> {
        let mut args = DynArgs::default();
        for input in &self.signature.inputs {
            match input {
                InputKind::Context => args.context = Some(invocation.ctx.clone()),
                InputKind::Payload(PayloadKind::Sequence) => {
                    match invocation.payload::<Vec<Value>>() {
                        Ok(items) => args.payload = Some(Value::Array(items)),
                        Err(err) => return failed(err),
                    }
                }
                InputKind::Payload(_) => match invocation.payload::<Value>() {
                    Ok(value) => args.payload = Some(value),
                    Err(err) => return failed(err),
                },
            }
        }

        let returns_data = self.signature.returns_data();
        let fut = (self.func)(args);
        Box::pin(async move {
            let ret = fut.await;
            match ret.error {
                Some(err) => Err(err),
                None if returns_data => Ok(ret.data.unwrap_or(Value::Null)),
                None => Ok(Value::Null),
            }
        })
    }
}

/// Wraps a business function with default options.
pub fn wrap<H, M>(handler: H) -> RouteHandler
where
    H: Handler<M>,
    M: 'static,
{
    wrap_with(handler, WrapOptions::default())
}

/// Wraps a business function.
pub fn wrap_with<H, M>(handler: H, options: WrapOptions) -> RouteHandler
where
    H: Handler<M>,
    M: 'static,
{
    tracing::debug!(
        handler = std::any::type_name::<H>(),
        signature = %handler.signature(),
        options = ?options,
        "wrapped handler"
    );
    let handler = Arc::new(handler);
    let options = Arc::new(options);
    Arc::new(
        move |ctx: RequestContext, request: Request| -> BoxFuture<'static, Response> {
            Box::pin(invoke::<H, M>(
                Arc::clone(&handler),
                Arc::clone(&options),
                ctx,
                request,
            ))
        },
    )
}

async fn invoke<H, M>(
    handler: Arc<H>,
    options: Arc<WrapOptions>,
    ctx: RequestContext,
    request: Request,
) -> Response
where
    H: Handler<M>,
    M: 'static,
{
    let (parts, body) = request.into_parts();
    let body = collect_body(body).await;
    if options.allow_duplicate_bind {
        ctx.store().insert(RawBody(body.clone()));
    }
    let bind = BindContext::new(
        parts.method,
        parts.uri,
        parts.headers,
        body,
        ctx.path_params().to_vec(),
    );
    let invocation = Invocation::new(ctx.clone(), bind, Arc::clone(&options));

    let result = AssertUnwindSafe(async move { handler.call(invocation).await })
        .catch_unwind()
        .instrument(ctx.logger())
        .await
        .unwrap_or_else(|panic| {
            tracing::error!(
                panic = %panic_message(panic.as_ref()),
                path = %ctx.path(),
                "handler panicked"
            );
            Err(WebError::internal(PANIC_MESSAGE))
        });

    if let Err(err) = &result {
        ctx.with_audit(|record| record.with_error(err.detail()));
    }

    if let Some(committed) = ctx.commit_slot().take() {
        return committed;
    }

    match result {
        Ok(data) if options.skip_format => raw_response(&data),
        Ok(data) => success_response(Some(data)),
        Err(err) => error_response(&err),
    }
}

fn raw_response(data: &Value) -> Response {
    if data.is_null() {
        return Response::default();
    }
    json_response(data).unwrap_or_else(|err| error_response(&err))
}

/// Renders a panic payload for logging.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
