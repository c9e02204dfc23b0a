//! Constants for the lumigo-span-exporter package.
//!
//! This file centralizes the attribute keys, environment variable names and
//! defaults shared by the mapper, the sink and the exporter.

/// Environment variable names read while mapping a span.
pub mod env_vars {
    /// AWS Lambda function name. Start spans are named after it.
    pub const FUNCTION_NAME: &str = "AWS_LAMBDA_FUNCTION_NAME";

    /// AWS region the function runs in.
    pub const REGION: &str = "AWS_REGION";

    /// Configured memory size in MB.
    pub const MEMORY_SIZE: &str = "AWS_LAMBDA_FUNCTION_MEMORY_SIZE";

    /// Execution environment identifier (e.g. `AWS_Lambda_rust`).
    pub const EXECUTION_ENV: &str = "AWS_EXECUTION_ENV";

    /// CloudWatch log group of the function.
    pub const LOG_GROUP_NAME: &str = "AWS_LAMBDA_LOG_GROUP_NAME";

    /// CloudWatch log stream of the current execution environment.
    pub const LOG_STREAM_NAME: &str = "AWS_LAMBDA_LOG_STREAM_NAME";

    /// X-Ray trace header of the current invocation.
    pub const TRACE_HEADER: &str = "_X_AMZN_TRACE_ID";

    /// Initialization type, `provisioned-concurrency` for pre-warmed environments.
    pub const INITIALIZATION_TYPE: &str = "AWS_LAMBDA_INITIALIZATION_TYPE";

    /// Maximum serialized size of the records buffered for one end write.
    pub const MAX_SIZE_FOR_REQUEST: &str = "MAX_SIZE_FOR_REQUEST";
}

/// Default values.
pub mod defaults {
    /// Default cap on the buffered end-record payload, in bytes.
    pub const MAX_SIZE_FOR_REQUEST: usize = 1024 * 500;

    /// Directory watched by the Lumigo extension.
    pub const SPANS_DIRECTORY: &str = "/tmp/lumigo-spans";
}

/// Span names with a fixed meaning.
pub mod span_names {
    /// Name of the span opened around every invocation. Ending it closes the end record.
    pub const PARENT_SPAN: &str = "LumigoParentSpan";
}

/// Attribute keys read from the collected attribute bag.
pub mod attributes {
    /// Lumigo token, set as a resource attribute.
    pub const TOKEN: &str = "lumigo_token";

    /// Raw invocation payload.
    pub const EVENT: &str = "event";

    /// Serialized handler result.
    pub const RESPONSE: &str = "response";

    /// Concrete type name of the handler error.
    pub const ERROR_TYPE: &str = "error_type";

    /// Display form of the handler error.
    pub const ERROR_MESSAGE: &str = "error_message";

    /// Backtrace captured when the error was observed.
    pub const ERROR_STACKTRACE: &str = "error_stacktrace";

    /// Derived attribute holding the lowercase span kind.
    pub const SPAN_KIND: &str = "span.kind";
}

/// Fixed values written into records.
pub mod values {
    /// First invocation in this execution environment.
    pub const COLD: &str = "cold";

    /// Any later invocation.
    pub const WARM: &str = "warm";

    /// Span describing the function invocation itself.
    pub const FUNCTION: &str = "function";

    /// Span describing an outbound call.
    pub const HTTP: &str = "http";

    /// `AWS_LAMBDA_INITIALIZATION_TYPE` value for provisioned concurrency.
    pub const PROVISIONED_CONCURRENCY: &str = "provisioned-concurrency";

    /// Suffix appended to the request id of start records.
    pub const STARTED_SUFFIX: &str = "_started";
}
