//! Lambda handler wrapper that records every invocation as Lumigo spans.
//!
//! [`wrap_handler`] classifies the handler once and returns a
//! [`WrappedHandler`]. Each [`WrappedHandler::invoke`] then runs:
//!
//! 1. bind the execution context to the process (container id, warm snapshot)
//!    and open the `LumigoParentSpan` with the raw payload as `event`
//! 2. emit the start span, named after the function, and flush it so the
//!    start record is written first
//! 3. call the handler once with the parent span as the current context
//! 4. attach `response` or the error attributes, mark the process warm
//! 5. end the parent span and flush, writing the end record
//!
//! The handler outcome is returned unchanged. Failures of the tracing steps
//! are logged and never reach the caller.
//!
//! # Example
//!
//! ```rust,no_run
//! use lumigo_lambda_tracer::{run, wrap_handler, Handler, TracerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lambda_runtime::Error> {
//!     let handler = Handler::from_payload(|name: String| -> Result<String, std::io::Error> {
//!         Ok(format!("Hello {}!", name))
//!     });
//!     run(wrap_handler(Some(handler), TracerConfig::from_env())).await
//! }
//! ```

use crate::adapter::{Adapter, Handler, InvalidShapeError, InvocationError, Outcome};
use crate::config::{ConfigError, TracerConfig};
use crate::telemetry::{init_logging, LumigoTracer};
use lambda_runtime::{service_fn, LambdaEvent};
use lumigo_span_exporter::constants::{attributes, env_vars, span_names};
use lumigo_span_exporter::ExecutionContext;
use opentelemetry::trace::{Span as _, SpanKind, Status, TraceContextExt, Tracer as _};
use opentelemetry::{Context, KeyValue};
use serde_json::Value;
use std::backtrace::Backtrace;
use std::env;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Problems found while wrapping a handler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WrapError {
    /// The tracer is misconfigured; the handler runs untraced.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The handler cannot be adapted; every invocation fails.
    #[error(transparent)]
    Shape(#[from] InvalidShapeError),
}

#[derive(Debug)]
enum Inner {
    Traced {
        adapter: Adapter,
        tracer: LumigoTracer,
    },
    Plain(Adapter),
    Rejected(InvalidShapeError),
}

/// A handler ready to be invoked once per Lambda event.
#[derive(Debug)]
pub struct WrappedHandler {
    inner: Inner,
    error: Option<WrapError>,
}

/// Wraps `handler` for tracing with `config`.
///
/// - an invalid handler is rejected: every invocation returns the shape error
/// - a disabled tracer runs the handler without spans or records
/// - an invalid configuration is logged and the handler runs untraced
pub fn wrap_handler(handler: Option<Handler>, config: TracerConfig) -> WrappedHandler {
    if config.enabled {
        init_logging(config.debug);
    }

    let adapter = match Adapter::new(handler) {
        Ok(adapter) => adapter,
        Err(err) => {
            warn!(error = %err, "invalid handler");
            return WrappedHandler::rejected(err);
        }
    };

    if !config.enabled {
        debug!("lumigo tracer disabled");
        return WrappedHandler::plain(adapter, None);
    }

    match LumigoTracer::new(config) {
        Ok(tracer) => WrappedHandler {
            inner: Inner::Traced { adapter, tracer },
            error: None,
        },
        Err(err) => {
            warn!(error = %err, "lumigo tracer not started, running handler untraced");
            WrappedHandler::plain(adapter, Some(err.into()))
        }
    }
}

impl WrappedHandler {
    pub(crate) fn traced(handler: Option<Handler>, tracer: LumigoTracer) -> Self {
        match Adapter::new(handler) {
            Ok(adapter) => Self {
                inner: Inner::Traced { adapter, tracer },
                error: None,
            },
            Err(err) => Self::rejected(err),
        }
    }

    fn plain(adapter: Adapter, error: Option<WrapError>) -> Self {
        Self {
            inner: Inner::Plain(adapter),
            error,
        }
    }

    fn rejected(err: InvalidShapeError) -> Self {
        Self {
            inner: Inner::Rejected(err.clone()),
            error: Some(err.into()),
        }
    }

    /// The problem detected at wrap time, if any.
    pub fn wrap_error(&self) -> Option<&WrapError> {
        self.error.as_ref()
    }

    /// Whether invocations produce span records.
    pub fn is_traced(&self) -> bool {
        matches!(self.inner, Inner::Traced { .. })
    }

    /// Runs one invocation with `ctx` and the raw JSON `payload`.
    pub fn invoke(&self, ctx: &ExecutionContext, payload: &[u8]) -> Outcome {
        match &self.inner {
            Inner::Traced { adapter, tracer } => invoke_traced(tracer, adapter, ctx, payload),
            Inner::Plain(adapter) => adapter.invoke(ctx, payload),
            Inner::Rejected(err) => Err(InvocationError::Rejected(err.clone())),
        }
    }
}

/// An invocation between span open and close.
struct OpenInvocation {
    ctx: ExecutionContext,
    cx: Context,
}

fn invoke_traced(
    tracer: &LumigoTracer,
    adapter: &Adapter,
    ctx: &ExecutionContext,
    payload: &[u8],
) -> Outcome {
    let Some(invocation) = guarded("open", || open(tracer, ctx, payload)) else {
        return adapter.invoke(ctx, payload);
    };

    let outcome = {
        let _attached = invocation.cx.clone().attach();
        adapter.invoke(&invocation.ctx, payload)
    };

    finish(tracer, || close(tracer, &invocation, &outcome));
    outcome
}

/// Runs the close step, then unbinds the invocation even if closing panicked.
fn finish(tracer: &LumigoTracer, close: impl FnOnce()) {
    guarded("close", close);
    tracer.slot().clear();
}

/// Runs a tracing step, logging instead of unwinding if it panics.
fn guarded<T>(stage: &'static str, f: impl FnOnce() -> T) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(stage, "lumigo tracer failed, continuing without tracing");
            None
        }
    }
}

fn open(tracer: &LumigoTracer, ctx: &ExecutionContext, payload: &[u8]) -> OpenInvocation {
    let ctx = ctx
        .clone()
        .bind(tracer.container_id(), tracer.is_warm());
    tracer.slot().set(ctx.clone());

    let event = KeyValue::new(
        attributes::EVENT,
        String::from_utf8_lossy(payload).into_owned(),
    );
    let otel = tracer.tracer();

    let parent = otel
        .span_builder(span_names::PARENT_SPAN)
        .with_kind(SpanKind::Server)
        .with_attributes(vec![event.clone()])
        .start_with_context(otel, &Context::new());
    let cx = Context::new().with_span(parent);

    match env::var(env_vars::FUNCTION_NAME) {
        Ok(function_name) if !function_name.is_empty() => {
            let mut start = otel
                .span_builder(function_name)
                .with_kind(SpanKind::Server)
                .with_attributes(vec![event])
                .start_with_context(otel, &cx);
            start.end();
            if let Err(err) = tracer.provider().force_flush() {
                warn!(error = ?err, "failed to flush start span");
            }
        }
        _ => debug!("function name unknown, skipping start span"),
    }

    OpenInvocation { ctx, cx }
}

fn close(tracer: &LumigoTracer, invocation: &OpenInvocation, outcome: &Outcome) {
    let span = invocation.cx.span();
    match outcome {
        Ok(value) => {
            let response = value
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_else(|| "null".to_string());
            span.set_attribute(KeyValue::new(attributes::RESPONSE, response));
        }
        Err(err) => {
            span.set_attribute(KeyValue::new(
                attributes::ERROR_TYPE,
                err.type_name().to_string(),
            ));
            span.set_attribute(KeyValue::new(attributes::ERROR_MESSAGE, err.to_string()));
            span.set_attribute(KeyValue::new(
                attributes::ERROR_STACKTRACE,
                Backtrace::force_capture().to_string(),
            ));
            span.set_status(Status::error(err.to_string()));
        }
    }

    tracer.mark_warm();
    span.end();

    if let Err(err) = tracer.provider().force_flush() {
        warn!(error = ?err, "failed to flush span records");
    }
}

/// Builds the execution context of a `lambda_runtime` invocation.
pub fn execution_context(context: &lambda_runtime::Context) -> ExecutionContext {
    let ctx = ExecutionContext::new(
        context.request_id.clone(),
        context.invoked_function_arn.clone(),
    )
    .with_deadline(i64::try_from(context.deadline).unwrap_or(i64::MAX));

    match &context.xray_trace_id {
        Some(header) => ctx.with_trace_header(header.clone()),
        None => ctx,
    }
}

/// Serves `handler` with the Lambda runtime until the process ends.
///
/// Each event is handled on a blocking thread, `None` results are returned
/// as JSON `null`.
pub async fn run(handler: WrappedHandler) -> Result<(), lambda_runtime::Error> {
    let handler = Arc::new(handler);
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        handle_event(handler.clone(), event)
    }))
    .await
}

async fn handle_event(
    handler: Arc<WrappedHandler>,
    event: LambdaEvent<Value>,
) -> Result<Value, lambda_runtime::Error> {
    let ctx = execution_context(&event.context);
    let payload = serde_json::to_vec(&event.payload)?;
    let outcome = tokio::task::spawn_blocking(move || handler.invoke(&ctx, &payload)).await?;
    Ok(outcome?.unwrap_or(Value::Null))
}
