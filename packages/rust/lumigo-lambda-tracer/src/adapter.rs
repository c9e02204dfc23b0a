//! Uniform call interface over handlers of different shapes.
//!
//! A handler takes zero, one or two parameters, where a leading parameter may
//! be the [`ExecutionContext`], and returns nothing, an error, a result, or a
//! result and an error. The shape is described by a [`HandlerSignature`] and
//! classified once by [`classify`]; every invocation then goes through the
//! `CallStrategy` matching that shape, with no per-call inspection.
//!
//! Typed handlers get their signature from their Rust types:
//!
//! ```no_run
//! use lumigo_lambda_tracer::{Adapter, ExecutionContext, Handler};
//!
//! let handler = Handler::from_payload(|name: String| -> Result<String, std::io::Error> {
//!     Ok(format!("Hello {}!", name))
//! });
//! let adapter = Adapter::new(Some(handler)).unwrap();
//!
//! let result = adapter.invoke(&ExecutionContext::default(), br#""test""#).unwrap();
//! assert_eq!(result, Some(serde_json::json!("Hello test!")));
//! ```
//!
//! Dynamically described handlers use [`Handler::raw`] with an explicit
//! signature and receive their arguments as [`RawArg`] values.

use lumigo_span_exporter::ExecutionContext;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::any::{type_name, TypeId};
use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Boxed error returned by handlers.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// What a declared parameter or return value can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// The invocation's execution context.
    Context,
    /// An error value.
    Error,
    /// Any serializable data.
    Data,
}

/// A declared parameter or return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: Cow<'static, str>,
    pub capability: Capability,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<Cow<'static, str>>, capability: Capability) -> Self {
        Self {
            name: name.into(),
            capability,
        }
    }

    /// The execution context parameter.
    pub fn context() -> Self {
        Self::new(type_name::<ExecutionContext>(), Capability::Context)
    }

    pub fn data<T: ?Sized>() -> Self {
        Self::new(type_name::<T>(), Capability::Data)
    }

    pub fn error<E: ?Sized>() -> Self {
        Self::new(type_name::<E>(), Capability::Error)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Kind of value supplied as a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerKind {
    Func,
    /// Anything that cannot be called, named by its kind.
    Other(String),
}

/// Declared shape of a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSignature {
    pub kind: HandlerKind,
    pub params: Vec<TypeDescriptor>,
    pub returns: Vec<TypeDescriptor>,
}

impl HandlerSignature {
    pub fn func(params: Vec<TypeDescriptor>, returns: Vec<TypeDescriptor>) -> Self {
        Self {
            kind: HandlerKind::Func,
            params,
            returns,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamShape {
    None,
    Payload,
    Context,
    ContextPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    Nothing,
    Error,
    Result,
    ResultAndError,
}

/// Classified handler shape, computed once per wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerShape {
    pub params: ParamShape,
    pub returns: ReturnShape,
}

/// Reasons a handler cannot be adapted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidShapeError {
    #[error("handler is nil")]
    Nil,

    #[error("handler kind {0} is not func")]
    NotAFunction(String),

    #[error("handlers may not take more than two arguments, but handler takes {0}")]
    TooManyParams(usize),

    #[error("handler takes two arguments, but the first (position {position}) is not Context. got {type_name}")]
    ContextExpected { position: usize, type_name: String },

    #[error("handler may not return more than two values, but handler returns {0}")]
    TooManyReturns(usize),

    #[error("handler returns two values, but the second (position {position}) does not implement error. got {type_name}")]
    ErrorExpected { position: usize, type_name: String },
}

/// Classifies a handler signature.
pub fn classify(signature: &HandlerSignature) -> Result<HandlerShape, InvalidShapeError> {
    if let HandlerKind::Other(kind) = &signature.kind {
        return Err(InvalidShapeError::NotAFunction(kind.clone()));
    }

    let params = match signature.params.as_slice() {
        [] => ParamShape::None,
        [only] if only.capability == Capability::Context => ParamShape::Context,
        [_] => ParamShape::Payload,
        [first, _] if first.capability == Capability::Context => ParamShape::ContextPayload,
        [first, _] => {
            return Err(InvalidShapeError::ContextExpected {
                position: 0,
                type_name: first.name.to_string(),
            })
        }
        more => return Err(InvalidShapeError::TooManyParams(more.len())),
    };

    let returns = match signature.returns.as_slice() {
        [] => ReturnShape::Nothing,
        [only] if only.capability == Capability::Error => ReturnShape::Error,
        [_] => ReturnShape::Result,
        [_, last] if last.capability == Capability::Error => ReturnShape::ResultAndError,
        [_, last] => {
            return Err(InvalidShapeError::ErrorExpected {
                position: 1,
                type_name: last.name.to_string(),
            })
        }
        more => return Err(InvalidShapeError::TooManyReturns(more.len())),
    };

    Ok(HandlerShape { params, returns })
}

/// An error returned by a handler, kept with its concrete type name.
pub struct HandlerError {
    type_name: Cow<'static, str>,
    inner: BoxError,
}

impl HandlerError {
    /// Wraps a handler error, recording `E` as its type name.
    pub fn new<E>(error: E) -> Self
    where
        E: Into<BoxError> + 'static,
    {
        Self {
            type_name: Cow::Borrowed(type_name::<E>()),
            inner: error.into(),
        }
    }

    /// Wraps an already boxed error under an explicit type name.
    pub fn named(type_name: impl Into<Cow<'static, str>>, error: impl Into<BoxError>) -> Self {
        Self {
            type_name: type_name.into(),
            inner: error.into(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the original error if it is of type `T`.
    pub fn downcast_ref<T: StdError + 'static>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn into_inner(self) -> BoxError {
        self.inner
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("type_name", &self.type_name)
            .field("inner", &self.inner)
            .finish()
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for HandlerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.inner.as_ref())
    }
}

/// Errors returned by [`Adapter::invoke`].
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The payload does not decode into the handler's parameter type.
    #[error("failed to decode payload: {0}")]
    Decode(#[source] serde_json::Error),

    /// The handler result does not encode to JSON.
    #[error("failed to encode handler result: {0}")]
    Encode(#[source] serde_json::Error),

    /// The handler returned an error.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The handler was rejected when it was wrapped.
    #[error(transparent)]
    Rejected(#[from] InvalidShapeError),
}

impl InvocationError {
    /// Concrete type name of the underlying error.
    pub fn type_name(&self) -> &str {
        match self {
            InvocationError::Decode(_) | InvocationError::Encode(_) => {
                type_name::<serde_json::Error>()
            }
            InvocationError::Handler(err) => err.type_name(),
            InvocationError::Rejected(_) => type_name::<InvalidShapeError>(),
        }
    }

    /// The handler's own error, if the handler failed.
    pub fn handler_error(&self) -> Option<&HandlerError> {
        match self {
            InvocationError::Handler(err) => Some(err),
            _ => None,
        }
    }
}

/// Normalized handler outcome.
pub type Outcome = Result<Option<Value>, InvocationError>;

/// Return types typed handlers may have.
///
/// `()` maps to [`ReturnShape::Nothing`], `Result<(), E>` to
/// [`ReturnShape::Error`] and `Result<R, E>` to [`ReturnShape::ResultAndError`].
pub trait HandlerOutput {
    fn returns() -> Vec<TypeDescriptor>;
    fn into_outcome(self) -> Outcome;
}

impl HandlerOutput for () {
    fn returns() -> Vec<TypeDescriptor> {
        Vec::new()
    }

    fn into_outcome(self) -> Outcome {
        Ok(None)
    }
}

fn is_unit<R: 'static>() -> bool {
    TypeId::of::<R>() == TypeId::of::<()>()
}

impl<R, E> HandlerOutput for Result<R, E>
where
    R: Serialize + 'static,
    E: Into<BoxError> + 'static,
{
    fn returns() -> Vec<TypeDescriptor> {
        if is_unit::<R>() {
            vec![TypeDescriptor::error::<E>()]
        } else {
            vec![TypeDescriptor::data::<R>(), TypeDescriptor::error::<E>()]
        }
    }

    fn into_outcome(self) -> Outcome {
        match self {
            Ok(_) if is_unit::<R>() => Ok(None),
            Ok(result) => serde_json::to_value(result)
                .map(Some)
                .map_err(InvocationError::Encode),
            Err(err) => Err(HandlerError::new(err).into()),
        }
    }
}

/// Argument passed to a raw handler.
#[derive(Debug, Clone, PartialEq)]
pub enum RawArg {
    Context(ExecutionContext),
    Payload(Value),
}

/// Value returned by a raw handler, one per declared return.
#[derive(Debug)]
pub enum ReturnValue {
    Value(Value),
    Error(HandlerError),
    /// Nil value, such as an error slot without error.
    Nil,
}

type RawFn = dyn Fn(Vec<RawArg>) -> Vec<ReturnValue> + Send + Sync;
type BytesFn = dyn Fn(&[u8]) -> Outcome + Send + Sync;
type ContextBytesFn = dyn Fn(&ExecutionContext, &[u8]) -> Outcome + Send + Sync;

/// Call path selected from the handler shape.
enum CallStrategy {
    NoArgs(Box<dyn Fn() -> Outcome + Send + Sync>),
    Payload(Box<BytesFn>),
    Context(Box<dyn Fn(&ExecutionContext) -> Outcome + Send + Sync>),
    ContextPayload(Box<ContextBytesFn>),
    Raw(Box<RawFn>),
}

impl fmt::Debug for CallStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallStrategy::NoArgs(_) => "NoArgs",
            CallStrategy::Payload(_) => "Payload",
            CallStrategy::Context(_) => "Context",
            CallStrategy::ContextPayload(_) => "ContextPayload",
            CallStrategy::Raw(_) => "Raw",
        };
        f.write_str(name)
    }
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, InvocationError> {
    serde_json::from_slice(payload).map_err(InvocationError::Decode)
}

/// A handler value together with its declared signature.
#[derive(Debug)]
pub struct Handler {
    signature: HandlerSignature,
    strategy: CallStrategy,
}

impl Handler {
    /// Handler without parameters.
    pub fn from_fn<F, O>(f: F) -> Self
    where
        F: Fn() -> O + Send + Sync + 'static,
        O: HandlerOutput,
    {
        Self {
            signature: HandlerSignature::func(Vec::new(), O::returns()),
            strategy: CallStrategy::NoArgs(Box::new(move || f().into_outcome())),
        }
    }

    /// Handler taking the decoded payload.
    pub fn from_payload<F, T, O>(f: F) -> Self
    where
        F: Fn(T) -> O + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
        O: HandlerOutput,
    {
        Self {
            signature: HandlerSignature::func(vec![TypeDescriptor::data::<T>()], O::returns()),
            strategy: CallStrategy::Payload(Box::new(move |payload| {
                f(decode(payload)?).into_outcome()
            })),
        }
    }

    /// Handler taking only the execution context.
    pub fn from_context<F, O>(f: F) -> Self
    where
        F: Fn(&ExecutionContext) -> O + Send + Sync + 'static,
        O: HandlerOutput,
    {
        Self {
            signature: HandlerSignature::func(vec![TypeDescriptor::context()], O::returns()),
            strategy: CallStrategy::Context(Box::new(move |ctx| f(ctx).into_outcome())),
        }
    }

    /// Handler taking the execution context and the decoded payload.
    pub fn from_context_payload<F, T, O>(f: F) -> Self
    where
        F: Fn(&ExecutionContext, T) -> O + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
        O: HandlerOutput,
    {
        Self {
            signature: HandlerSignature::func(
                vec![TypeDescriptor::context(), TypeDescriptor::data::<T>()],
                O::returns(),
            ),
            strategy: CallStrategy::ContextPayload(Box::new(move |ctx, payload| {
                f(ctx, decode(payload)?).into_outcome()
            })),
        }
    }

    /// Handler described by an explicit signature.
    ///
    /// `f` receives one [`RawArg`] per declared parameter, payloads decoded as
    /// JSON values, and returns one [`ReturnValue`] per declared return.
    pub fn raw<F>(signature: HandlerSignature, f: F) -> Self
    where
        F: Fn(Vec<RawArg>) -> Vec<ReturnValue> + Send + Sync + 'static,
    {
        Self {
            signature,
            strategy: CallStrategy::Raw(Box::new(f)),
        }
    }

    pub fn signature(&self) -> &HandlerSignature {
        &self.signature
    }
}

/// A classified handler ready to be invoked.
#[derive(Debug)]
pub struct Adapter {
    shape: HandlerShape,
    strategy: CallStrategy,
}

impl Adapter {
    /// Classifies `handler`, rejecting missing handlers and invalid signatures.
    pub fn new(handler: Option<Handler>) -> Result<Self, InvalidShapeError> {
        let handler = handler.ok_or(InvalidShapeError::Nil)?;
        let shape = classify(&handler.signature)?;
        Ok(Self {
            shape,
            strategy: handler.strategy,
        })
    }

    pub fn shape(&self) -> HandlerShape {
        self.shape
    }

    /// Calls the handler once with `ctx` and the encoded `payload`.
    ///
    /// The payload is only decoded when the handler declares a payload
    /// parameter; a decode failure is returned without calling the handler.
    pub fn invoke(&self, ctx: &ExecutionContext, payload: &[u8]) -> Outcome {
        match &self.strategy {
            CallStrategy::NoArgs(f) => f(),
            CallStrategy::Payload(f) => f(payload),
            CallStrategy::Context(f) => f(ctx),
            CallStrategy::ContextPayload(f) => f(ctx, payload),
            CallStrategy::Raw(f) => {
                let args = match self.shape.params {
                    ParamShape::None => Vec::new(),
                    ParamShape::Payload => vec![RawArg::Payload(decode(payload)?)],
                    ParamShape::Context => vec![RawArg::Context(ctx.clone())],
                    ParamShape::ContextPayload => vec![
                        RawArg::Context(ctx.clone()),
                        RawArg::Payload(decode(payload)?),
                    ],
                };
                normalize(self.shape.returns, f(args))
            }
        }
    }
}

/// Splits raw return values into result and error slot.
///
/// An error in the error slot wins over a result. Missing values count as nil.
fn normalize(shape: ReturnShape, returns: Vec<ReturnValue>) -> Outcome {
    let mut returns = returns.into_iter();
    let (result, error) = match shape {
        ReturnShape::Nothing => (None, None),
        ReturnShape::Error => (None, returns.next()),
        ReturnShape::Result => (returns.next(), None),
        ReturnShape::ResultAndError => (returns.next(), returns.next()),
    };

    match (result, error) {
        (_, Some(ReturnValue::Error(err))) | (Some(ReturnValue::Error(err)), _) => {
            Err(err.into())
        }
        (Some(ReturnValue::Value(value)), _) => Ok(Some(value)),
        _ => Ok(None),
    }
}
