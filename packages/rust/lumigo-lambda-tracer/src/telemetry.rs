//! Process-wide tracer state and logging setup.
//!
//! A [`LumigoTracer`] is created once per process (per wrap) and shared by
//! every invocation that runs in it. It owns:
//! - the tracer provider, which hands every ended span straight to a
//!   [`LumigoSpanExporter`]
//! - the record sink the exporter writes to
//! - the container id, which survives warm invocations
//! - the warm marker, set after the first invocation completes
//! - the slot through which the exporter sees the current invocation
//!
//! # Basic Usage
//!
//! ```no_run
//! use lumigo_lambda_tracer::{LumigoTracer, TracerConfig};
//!
//! let tracer = LumigoTracer::new(TracerConfig::from_env()).expect("valid configuration");
//! assert!(!tracer.is_warm());
//! ```
//!
//! Tests and tools can redirect records to any sink:
//!
//! ```no_run
//! use lumigo_lambda_tracer::{LumigoTracer, RecordSink, TracerConfig};
//!
//! let config = TracerConfig::builder().token("t_123").build();
//! let tracer = LumigoTracer::with_sink(config, RecordSink::stdout()).unwrap();
//! ```

use crate::config::{ConfigError, TracerConfig};
use crate::constants::env_vars;
use crate::handler::WrappedHandler;
use crate::resource::get_lambda_resource;
use crate::Handler;
use lumigo_span_exporter::{InvocationSlot, LumigoSpanExporter, RecordSink};
use opentelemetry::{global, trace::TracerProvider as _, InstrumentationScope, KeyValue};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::{SdkTracerProvider, Tracer};
use std::borrow::Cow;
use std::env;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

struct ProcessState {
    config: TracerConfig,
    container_id: String,
    warm: AtomicBool,
    slot: Arc<InvocationSlot>,
    sink: Arc<RecordSink>,
    provider: SdkTracerProvider,
    tracer: Tracer,
}

/// Handle to the process context shared by all invocations.
///
/// Cloning is cheap, clones share the same state.
#[derive(Clone)]
pub struct LumigoTracer {
    state: Arc<ProcessState>,
}

impl fmt::Debug for LumigoTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LumigoTracer")
            .field("container_id", &self.state.container_id)
            .field("warm", &self.is_warm())
            .field("sink", &self.state.sink)
            .finish_non_exhaustive()
    }
}

impl LumigoTracer {
    /// Creates the process context, writing records to the sink selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidToken`] when the token is empty.
    pub fn new(config: TracerConfig) -> Result<Self, ConfigError> {
        let sink = config.sink();
        Self::with_sink(config, sink)
    }

    /// Creates the process context writing records to `sink`.
    pub fn with_sink(config: TracerConfig, sink: RecordSink) -> Result<Self, ConfigError> {
        config.validate()?;

        let sink = Arc::new(sink);
        let slot = Arc::new(InvocationSlot::new());

        let exporter = LumigoSpanExporter::builder()
            .sink(sink.clone())
            .slot(slot.clone())
            .max_request_size(config.max_request_size)
            .build();

        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter)
            .with_resource(get_lambda_resource(&config))
            .build();

        if config.set_global_provider {
            global::set_tracer_provider(provider.clone());
        }

        let scope = InstrumentationScope::builder(env!("CARGO_PKG_NAME"))
            .with_version(Cow::Borrowed(env!("CARGO_PKG_VERSION")))
            .with_attributes(vec![
                KeyValue::new("library.language", "rust"),
                KeyValue::new("library.runtime", "aws_lambda"),
            ])
            .build();
        let tracer = provider.tracer_with_scope(scope);

        let container_id = uuid::Uuid::new_v4().to_string();
        debug!(container_id = %container_id, "lumigo tracer initialized");

        Ok(Self {
            state: Arc::new(ProcessState {
                config,
                container_id,
                warm: AtomicBool::new(false),
                slot,
                sink,
                provider,
                tracer,
            }),
        })
    }

    /// Tracer for spans created by the handler. Spans started while an
    /// invocation runs are children of its parent span.
    pub fn tracer(&self) -> &Tracer {
        &self.state.tracer
    }

    pub fn provider(&self) -> &SdkTracerProvider {
        &self.state.provider
    }

    pub fn config(&self) -> &TracerConfig {
        &self.state.config
    }

    pub fn sink(&self) -> &Arc<RecordSink> {
        &self.state.sink
    }

    /// Identifier of this process, shared by all its invocations.
    pub fn container_id(&self) -> &str {
        &self.state.container_id
    }

    /// Whether an invocation has completed in this process.
    pub fn is_warm(&self) -> bool {
        self.state.warm.load(Ordering::Acquire)
    }

    pub(crate) fn mark_warm(&self) {
        self.state.warm.store(true, Ordering::Release);
    }

    pub(crate) fn slot(&self) -> &InvocationSlot {
        &self.state.slot
    }

    /// Wraps `handler` so that every invocation is traced by this process context.
    pub fn wrap(&self, handler: Option<Handler>) -> WrappedHandler {
        WrappedHandler::traced(handler, self.clone())
    }

    /// Flushes buffered spans and closes the sink.
    pub fn shutdown(&self) -> OTelSdkResult {
        self.state.provider.shutdown()
    }
}

/// Installs the global log subscriber for the tracer's own diagnostics.
///
/// The level comes from `RUST_LOG`, else `AWS_LAMBDA_LOG_LEVEL`; `debug`
/// forces the debug level. `AWS_LAMBDA_LOG_FORMAT=JSON` selects JSON lines.
/// A subscriber installed earlier is kept.
pub fn init_logging(debug: bool) {
    let env_filter = if debug {
        EnvFilter::new("debug")
    } else {
        let env_var_name = if env::var("RUST_LOG").is_ok() {
            "RUST_LOG"
        } else {
            env_vars::AWS_LAMBDA_LOG_LEVEL
        };
        EnvFilter::builder()
            .with_env_var(env_var_name)
            .from_env_lossy()
    };

    let is_json = env::var(env_vars::AWS_LAMBDA_LOG_FORMAT)
        .unwrap_or_default()
        .to_uppercase()
        == "JSON";

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if is_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .without_time()
                    .json(),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .without_time()
                    .with_ansi(false),
            )
            .try_init()
    };

    if let Err(err) = result {
        debug!(error = %err, "log subscriber already installed");
    }
}
