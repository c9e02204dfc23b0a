//! Constants for the lumigo-lambda-tracer package.
//!
//! This file centralizes all constants to ensure consistency across the codebase
//! and provide a single source of truth for configuration parameters.

/// Environment variable names for configuration.
pub mod env_vars {
    /// Set to "false" to run handlers without tracing.
    pub const ENABLED: &str = "LUMIGO_ENABLED";

    /// Lumigo token attached to every record.
    pub const TOKEN: &str = "LUMIGO_TOKEN";

    /// Forces debug level logging of the tracer itself.
    pub const DEBUG: &str = "LUMIGO_DEBUG";

    /// Write records to stdout instead of the span directory.
    pub const PRINT_STDOUT: &str = "LUMIGO_PRINT_STDOUT";

    /// Service name, defaults to the function name.
    pub const SERVICE_NAME: &str = "LUMIGO_SERVICE_NAME";

    /// Directory the records are written to.
    pub const SPANS_DIRECTORY: &str = "LUMIGO_SPANS_DIRECTORY";

    /// Maximum serialized size of the records of one end write.
    pub const MAX_SIZE_FOR_REQUEST: &str = "MAX_SIZE_FOR_REQUEST";

    /// Standard OpenTelemetry service name, used when no Lumigo service name is set.
    pub const OTEL_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";

    /// Resource attributes in KEY=VALUE,KEY2=VALUE2 format.
    pub const RESOURCE_ATTRIBUTES: &str = "OTEL_RESOURCE_ATTRIBUTES";

    /// AWS Lambda function name. Start spans are named after it.
    pub const AWS_LAMBDA_FUNCTION_NAME: &str = "AWS_LAMBDA_FUNCTION_NAME";

    pub const AWS_LAMBDA_FUNCTION_VERSION: &str = "AWS_LAMBDA_FUNCTION_VERSION";

    pub const AWS_LAMBDA_FUNCTION_MEMORY_SIZE: &str = "AWS_LAMBDA_FUNCTION_MEMORY_SIZE";

    pub const AWS_LAMBDA_LOG_STREAM_NAME: &str = "AWS_LAMBDA_LOG_STREAM_NAME";

    pub const AWS_REGION: &str = "AWS_REGION";

    /// Log level used when `RUST_LOG` is not set.
    pub const AWS_LAMBDA_LOG_LEVEL: &str = "AWS_LAMBDA_LOG_LEVEL";

    /// "JSON" switches the log output to JSON lines.
    pub const AWS_LAMBDA_LOG_FORMAT: &str = "AWS_LAMBDA_LOG_FORMAT";
}

/// Default values for configuration parameters.
pub mod defaults {
    pub use lumigo_span_exporter::constants::defaults::{MAX_SIZE_FOR_REQUEST, SPANS_DIRECTORY};
}

/// Resource attribute keys set by the tracer.
pub mod resource_attributes {
    pub use lumigo_span_exporter::constants::attributes::TOKEN;

    /// Service name as read by the Lumigo backend.
    pub const SERVICE_NAME: &str = "service_name";
}
