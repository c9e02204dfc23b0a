//! A span exporter that maps OpenTelemetry spans to Lumigo span records.
//!
//! This crate provides an implementation of OpenTelemetry's [`SpanExporter`] that turns
//! finished spans into Lumigo span records and writes them as line-delimited JSON through a
//! [`RecordSink`]. It is meant to run inside an AWS Lambda function, next to the Lumigo
//! extension that picks the records up from the span directory.
//!
//! # Record flow
//!
//! Each exported span is classified by name:
//!
//! - a span named after the function (`AWS_LAMBDA_FUNCTION_NAME`) is a start span, its record
//!   is written immediately as a start write
//! - the reserved `LumigoParentSpan` closes the invocation, its record is written together
//!   with every record buffered since the last end write
//! - any other span is buffered, up to `max_request_size` bytes of serialized records
//!
//! Invocation specific fields (request id, deadline, readiness) come from the
//! [`ExecutionContext`] published in the shared [`InvocationSlot`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use opentelemetry::trace::{Tracer, TracerProvider};
//! use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
//! use lumigo_span_exporter::{InvocationSlot, LumigoSpanExporter, RecordSink};
//!
//! let slot = Arc::new(InvocationSlot::new());
//! let exporter = LumigoSpanExporter::builder()
//!     .sink(Arc::new(RecordSink::span_directory("/tmp/lumigo-spans")))
//!     .slot(slot.clone())
//!     .build();
//!
//! let provider = SdkTracerProvider::builder()
//!     .with_simple_exporter(exporter)
//!     .with_resource(Resource::builder().build())
//!     .build();
//!
//! let tracer = provider.tracer("my-function");
//! tracer.in_span("LumigoParentSpan", |_cx| {
//!     // handler work
//! });
//! let _ = provider.shutdown();
//! ```
//!
//! # Output Format
//!
//! One JSON array per line:
//!
//! ```json
//! [{"id":"4f2a..._started","transactionId":"bd862e3fe1be46a994272793","type":"function",...}]
//! [{"id":"4f2a...","type":"http",...},{"id":"4f2a...","type":"function","return_value":"\"ok\"",...}]
//! ```

use bon::bon;
use futures_util::future::BoxFuture;
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::{
    error::{OTelSdkError, OTelSdkResult},
    trace::{SpanData, SpanExporter},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub mod attributes;
pub mod constants;
pub mod context;
pub mod mapper;
pub mod record;
pub mod sink;
pub mod span_error;

#[cfg(test)]
mod testing;

pub use attributes::{AttributeBag, AttributeValue};
pub use context::{ExecutionContext, InvocationSlot};
pub use mapper::{transform, SpanSummary};
pub use record::{ErrorRecord, RecordRole, SpanInfo, SpanRecord, TraceRoot, TracerVersion};
pub use sink::{Destination, RecordSink, SinkError};
pub use span_error::extract;

use constants::{defaults, env_vars, span_names};

/// Time allowed for the sink to flush on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// A span exporter that writes Lumigo span records.
///
/// The exporter keeps the records of child spans until the parent span of the
/// invocation is exported, so it expects spans of one invocation to be
/// exported by one exporter instance in end order, which the SDK's simple
/// processor guarantees.
#[derive(Debug)]
pub struct LumigoSpanExporter {
    sink: Arc<RecordSink>,
    slot: Arc<InvocationSlot>,
    resource: Resource,
    /// Overrides `AWS_LAMBDA_FUNCTION_NAME` when set.
    function_name: Option<String>,
    max_request_size: usize,
    pending: Vec<SpanRecord>,
    pending_bytes: usize,
}

#[bon]
impl LumigoSpanExporter {
    /// Returns the default request size cap from environment or fallback value
    fn default_max_request_size() -> usize {
        std::env::var(env_vars::MAX_SIZE_FOR_REQUEST)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults::MAX_SIZE_FOR_REQUEST)
    }

    /// Creates a new exporter writing to `sink`.
    ///
    /// Without a `slot` records carry no invocation data. Without a
    /// `function_name` the name is read from the environment of every span.
    #[builder]
    pub fn new(
        sink: Arc<RecordSink>,
        slot: Option<Arc<InvocationSlot>>,
        function_name: Option<String>,
        max_request_size: Option<usize>,
    ) -> Self {
        Self {
            sink,
            slot: slot.unwrap_or_default(),
            resource: Resource::builder_empty().build(),
            function_name,
            max_request_size: max_request_size.unwrap_or_else(Self::default_max_request_size),
            pending: Vec::new(),
            pending_bytes: 0,
        }
    }
}

impl LumigoSpanExporter {
    /// The sink records are written to.
    pub fn sink(&self) -> &Arc<RecordSink> {
        &self.sink
    }

    fn export_span(&mut self, span: &SpanData, ctx: Option<&ExecutionContext>) -> Result<(), SinkError> {
        let bag = AttributeBag::collect(&self.resource, span);
        let summary = SpanSummary::from_span_data(span);
        let function_name = self
            .function_name
            .clone()
            .or_else(|| bag.env(env_vars::FUNCTION_NAME).map(str::to_string))
            .unwrap_or_default();

        let record = transform(&bag, ctx, &summary, &function_name);

        if !function_name.is_empty() && summary.name == function_name {
            return self.sink.emit(&[record], RecordRole::Start);
        }

        if summary.name == span_names::PARENT_SPAN {
            let mut records = std::mem::take(&mut self.pending);
            self.pending_bytes = 0;
            records.push(record);
            return self.sink.emit(&records, RecordRole::End);
        }

        self.buffer(record);
        Ok(())
    }

    /// Keeps a child record for the next end write unless the size cap is reached.
    fn buffer(&mut self, record: SpanRecord) {
        let size = match serde_json::to_vec(&record) {
            Ok(encoded) => encoded.len(),
            Err(err) => {
                warn!(error = %err, "failed to size span record, dropping it");
                return;
            }
        };
        if self.pending_bytes + size > self.max_request_size {
            warn!(
                span_id = %record.id,
                size,
                buffered = self.pending_bytes,
                max = self.max_request_size,
                "span records exceed the request size limit, dropping span"
            );
            return;
        }
        self.pending_bytes += size;
        self.pending.push(record);
    }
}

impl SpanExporter for LumigoSpanExporter {
    /// Maps and writes a batch of spans.
    ///
    /// All work is done synchronously; the returned future is already resolved.
    /// Every span is processed even when an earlier one fails to be written, the
    /// first failure is returned.
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, OTelSdkResult> {
        let ctx = self.slot.current();
        let mut result = Ok(());

        for span in &batch {
            if let Err(err) = self.export_span(span, ctx.as_ref()) {
                debug!(span = %span.name, error = %err, "failed to write span record");
                if result.is_ok() {
                    result = Err(OTelSdkError::InternalFailure(err.to_string()));
                }
            }
        }

        Box::pin(std::future::ready(result))
    }

    /// Writes any buffered child records and closes the sink.
    fn shutdown(&mut self) -> OTelSdkResult {
        if !self.pending.is_empty() {
            let records = std::mem::take(&mut self.pending);
            self.pending_bytes = 0;
            if let Err(err) = self.sink.emit(&records, RecordRole::End) {
                warn!(error = %err, "failed to write buffered span records on shutdown");
            }
        }
        self.sink
            .close(Instant::now() + SHUTDOWN_TIMEOUT)
            .map_err(|e| OTelSdkError::InternalFailure(e.to_string()))
    }

    /// Records are written on export, so there is nothing to flush.
    fn force_flush(&mut self) -> OTelSdkResult {
        Ok(())
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.resource = resource.clone();
    }
}
