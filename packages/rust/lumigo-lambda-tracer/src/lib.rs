//! Lumigo tracing for AWS Lambda functions.
//!
//! This crate wraps a Lambda handler so that every invocation is recorded as
//! Lumigo span records: a start record written before the handler runs, and
//! an end record carrying the response or the error, together with the
//! records of any child spans created during the invocation. Records are
//! written by [`LumigoSpanExporter`] to the span directory read by the Lumigo
//! extension, or to stdout.
//!
//! # Architecture
//!
//! - `adapter`: uniform call interface over handlers of different shapes
//! - `handler`: the invocation lifecycle and the `lambda_runtime` bridge
//! - `telemetry`: the process context ([`LumigoTracer`]) and log setup
//! - `resource`: Lambda resource attributes, including the Lumigo token
//! - `config`: [`TracerConfig`], from code or from `LUMIGO_*` variables
//!
//! # Quick Start
//!
//! ```no_run
//! use lumigo_lambda_tracer::{run, wrap_handler, Handler, TracerConfig};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Order {
//!     id: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lambda_runtime::Error> {
//!     let handler = Handler::from_payload(|order: Order| -> Result<String, std::io::Error> {
//!         Ok(format!("order {} accepted", order.id))
//!     });
//!     run(wrap_handler(Some(handler), TracerConfig::from_env())).await
//! }
//! ```
//!
//! # Configuration
//!
//! - `LUMIGO_TOKEN`: required, a missing token leaves the handler untraced
//! - `LUMIGO_ENABLED`: "false" turns tracing off
//! - `LUMIGO_DEBUG`: debug level logging of the tracer itself
//! - `LUMIGO_PRINT_STDOUT`: write records to stdout instead of the span directory
//!
//! See [`TracerConfig`] for the full list.

pub use lumigo_span_exporter::{
    ExecutionContext, LumigoSpanExporter, RecordRole, RecordSink, SinkError, SpanRecord,
};

pub mod constants;

mod adapter;
mod config;
mod handler;
mod resource;
mod telemetry;

pub use adapter::{
    classify, Adapter, BoxError, Capability, Handler, HandlerError, HandlerKind, HandlerOutput,
    HandlerShape, HandlerSignature, InvalidShapeError, InvocationError, Outcome, ParamShape,
    RawArg, ReturnShape, ReturnValue, TypeDescriptor,
};
pub use config::{ConfigError, TracerConfig, TracerConfigBuilder};
pub use handler::{execution_context, run, wrap_handler, WrapError, WrappedHandler};
pub use resource::get_lambda_resource;
pub use telemetry::{init_logging, LumigoTracer};
