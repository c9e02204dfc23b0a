use lumigo_lambda_tracer::{
    wrap_handler, ExecutionContext, Handler, InvalidShapeError, InvocationError, LumigoTracer,
    RecordSink, SpanRecord, TracerConfig, WrapError,
};
use opentelemetry::trace::{Span, Tracer};
use serde_json::json;
use serial_test::serial;
use std::env;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use thiserror::Error;

const FUNCTION: &str = "testFunction";
const ARN: &str = "arn:aws:lambda:us-east-1:123456789012:function:testFunction";
const TRACE_HEADER: &str =
    "Root=1-5759e988-bd862e3fe1be46a994272793;Parent=53995c3f42cd8ad8;Sampled=1";

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// One entry per written line, each a JSON array of records.
    fn writes(&self) -> Vec<Vec<SpanRecord>> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Error)]
#[error("order {0} not found")]
struct OrderNotFound(String);

fn setup_env() {
    env::set_var("AWS_LAMBDA_FUNCTION_NAME", FUNCTION);
    env::set_var("AWS_REGION", "us-east-1");
    env::set_var("AWS_LAMBDA_FUNCTION_MEMORY_SIZE", "128");
    env::remove_var("AWS_LAMBDA_INITIALIZATION_TYPE");
    env::remove_var("_X_AMZN_TRACE_ID");
}

fn cleanup_env() {
    for name in [
        "AWS_LAMBDA_FUNCTION_NAME",
        "AWS_REGION",
        "AWS_LAMBDA_FUNCTION_MEMORY_SIZE",
        "AWS_LAMBDA_INITIALIZATION_TYPE",
    ] {
        env::remove_var(name);
    }
}

fn tracer(buffer: &SharedBuffer) -> LumigoTracer {
    let config = TracerConfig::builder().token("t_123").build();
    LumigoTracer::with_sink(config, RecordSink::writer(buffer.clone())).unwrap()
}

fn greet() -> Handler {
    Handler::from_payload(|name: String| -> Result<String, io::Error> {
        Ok(format!("Hello {}!", name))
    })
}

fn context(request_id: &str) -> ExecutionContext {
    ExecutionContext::new(request_id, ARN).with_deadline(1_700_000_003_000)
}

#[test]
#[serial]
fn test_hello_handler_cold_then_warm() {
    setup_env();
    let buffer = SharedBuffer::default();
    let tracer = tracer(&buffer);
    let wrapped = tracer.wrap(Some(greet()));

    let result = wrapped.invoke(&context("req-1"), br#""test""#).unwrap();
    assert_eq!(result, Some(json!("Hello test!")));

    let writes = buffer.writes();
    assert_eq!(writes.len(), 2);

    let start = &writes[0][0];
    assert_eq!(writes[0].len(), 1);
    assert_eq!(start.id, "req-1_started");
    assert_eq!(start.lambda_type, "function");
    assert_eq!(start.readiness, "cold");
    assert_eq!(start.event, r#""test""#);
    assert_eq!(start.token, "t_123");
    assert!(start.return_value.is_none());
    assert!(start.error.is_none());

    let end = writes[1].last().unwrap();
    assert_eq!(end.id, "req-1");
    assert_eq!(end.lambda_type, "function");
    assert_eq!(end.lambda_name, FUNCTION);
    assert_eq!(end.readiness, "cold");
    assert_eq!(end.region, "us-east-1");
    assert_eq!(end.memory_allocated, "128");
    assert_eq!(end.account, "123456789012");
    assert_eq!(end.max_finish_time, 1_700_000_003_000);
    assert_eq!(end.container_id, tracer.container_id());
    assert_eq!(end.return_value.as_deref(), Some(r#""Hello test!""#));
    assert!(end.error.is_none());

    wrapped.invoke(&context("req-2"), br#""again""#).unwrap();

    let writes = buffer.writes();
    assert_eq!(writes.len(), 4);
    assert_eq!(writes[2][0].id, "req-2_started");
    assert_eq!(writes[2][0].readiness, "warm");
    let end = writes[3].last().unwrap();
    assert_eq!(end.readiness, "warm");
    assert_eq!(end.container_id, tracer.container_id());

    cleanup_env();
}

#[test]
#[serial]
fn test_transaction_id_from_trace_header() {
    setup_env();
    let buffer = SharedBuffer::default();
    let wrapped = tracer(&buffer).wrap(Some(greet()));

    let ctx = context("req-1").with_trace_header(TRACE_HEADER);
    wrapped.invoke(&ctx, br#""test""#).unwrap();

    for write in buffer.writes() {
        for record in write {
            assert_eq!(record.transaction_id, "bd862e3fe1be46a994272793");
            assert_eq!(
                record.info.trace_id.root,
                "1-5759e988-bd862e3fe1be46a994272793"
            );
        }
    }

    cleanup_env();
}

#[test]
#[serial]
fn test_handler_error_is_recorded_and_returned() {
    setup_env();
    let buffer = SharedBuffer::default();
    let wrapped = tracer(&buffer).wrap(Some(Handler::from_payload(
        |id: String| -> Result<String, OrderNotFound> { Err(OrderNotFound(id)) },
    )));

    let err = wrapped.invoke(&context("req-1"), br#""42""#).unwrap_err();
    let handler_error = err.handler_error().unwrap();
    assert_eq!(
        handler_error.downcast_ref::<OrderNotFound>().unwrap().0,
        "42"
    );
    assert_eq!(err.to_string(), "order 42 not found");

    let writes = buffer.writes();
    assert_eq!(writes.len(), 2);
    assert!(writes[0][0].error.is_none());

    let end = writes[1].last().unwrap();
    assert!(end.return_value.is_none());
    let error = end.error.as_ref().unwrap();
    assert_eq!(error.error_type, std::any::type_name::<OrderNotFound>());
    assert_eq!(error.message, "order 42 not found");
    assert!(!error.stacktrace.is_empty());

    cleanup_env();
}

#[test]
#[serial]
fn test_decode_failure_skips_handler() {
    setup_env();
    let buffer = SharedBuffer::default();
    let wrapped = tracer(&buffer).wrap(Some(greet()));

    let err = wrapped.invoke(&context("req-1"), b"{not json").unwrap_err();
    assert!(matches!(err, InvocationError::Decode(_)));

    let end = buffer.writes().pop().unwrap();
    let error = end.last().unwrap().error.as_ref().unwrap();
    assert_eq!(error.error_type, "serde_json::error::Error");

    cleanup_env();
}

#[test]
#[serial]
fn test_child_spans_are_written_with_end_record() {
    setup_env();
    let buffer = SharedBuffer::default();
    let tracer = tracer(&buffer);
    let child_tracer = tracer.tracer().clone();
    let wrapped = tracer.wrap(Some(Handler::from_fn(move || -> Result<(), io::Error> {
        let mut span = child_tracer.start("GET example.com");
        span.end();
        Ok(())
    })));

    let result = wrapped.invoke(&context("req-1"), b"{}").unwrap();
    assert_eq!(result, None);

    let writes = buffer.writes();
    assert_eq!(writes.len(), 2);
    let end = &writes[1];
    assert_eq!(end.len(), 2);
    assert_eq!(end[0].lambda_type, "http");
    assert_eq!(end[1].lambda_type, "function");
    assert_eq!(end[0].id, "req-1");
    assert_eq!(end[0].parent_id.len(), 16);
    assert_eq!(end[1].return_value.as_deref(), Some("null"));

    cleanup_env();
}

#[test]
#[serial]
fn test_end_record_survives_many_child_spans() {
    setup_env();
    let buffer = SharedBuffer::default();
    let config = TracerConfig::builder()
        .token("t_123")
        .max_request_size(64 * 1024 * 1024)
        .build();
    let tracer = LumigoTracer::with_sink(config, RecordSink::writer(buffer.clone())).unwrap();
    let child_tracer = tracer.tracer().clone();
    let wrapped = tracer.wrap(Some(Handler::from_fn(move || -> Result<(), io::Error> {
        for _ in 0..2100 {
            child_tracer.start("GET example.com").end();
        }
        Ok(())
    })));

    wrapped.invoke(&context("req-1"), b"{}").unwrap();

    let writes = buffer.writes();
    assert_eq!(writes.len(), 2);
    let end = &writes[1];
    assert_eq!(end.len(), 2101);
    let parent = end.last().unwrap();
    assert_eq!(parent.id, "req-1");
    assert_eq!(parent.lambda_type, "function");
    assert_eq!(parent.return_value.as_deref(), Some("null"));

    cleanup_env();
}

#[test]
#[serial]
fn test_nil_handler_is_rejected() {
    setup_env();
    let config = TracerConfig::builder().token("t_123").print_stdout(true).build();
    let wrapped = wrap_handler(None, config);

    assert_eq!(
        wrapped.wrap_error(),
        Some(&WrapError::Shape(InvalidShapeError::Nil))
    );
    let err = wrapped.invoke(&context("req-1"), b"{}").unwrap_err();
    assert_eq!(err.to_string(), "handler is nil");

    cleanup_env();
}

#[test]
#[serial]
fn test_span_directory_destination() {
    setup_env();
    let dir = tempfile::tempdir().unwrap();
    let config = TracerConfig::builder()
        .token("t_123")
        .spans_directory(dir.path())
        .build();
    let wrapped = wrap_handler(Some(greet()), config);
    assert!(wrapped.is_traced());

    wrapped.invoke(&context("req-1"), br#""test""#).unwrap();

    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 2);
    assert_eq!(names.iter().filter(|n| n.ends_with("_span")).count(), 1);
    assert_eq!(names.iter().filter(|n| n.ends_with("_end")).count(), 1);

    cleanup_env();
}

#[test]
#[serial]
fn test_disabled_tracer_writes_nothing() {
    setup_env();
    let dir = tempfile::tempdir().unwrap();
    let config = TracerConfig::builder()
        .enabled(false)
        .token("t_123")
        .spans_directory(dir.path())
        .build();
    let wrapped = wrap_handler(Some(greet()), config);

    let result = wrapped.invoke(&context("req-1"), br#""test""#).unwrap();
    assert_eq!(result, Some(json!("Hello test!")));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    cleanup_env();
}
