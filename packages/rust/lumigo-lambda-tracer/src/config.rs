//! Tracer configuration.
//!
//! [`TracerConfig`] can be built in code with its builder or read from the
//! environment with [`TracerConfig::from_env`]:
//!
//! - `LUMIGO_ENABLED`: "false" disables tracing (default: true)
//! - `LUMIGO_TOKEN`: Lumigo token, required
//! - `LUMIGO_DEBUG`: debug level logging (default: false)
//! - `LUMIGO_PRINT_STDOUT`: write records to stdout (default: false)
//! - `LUMIGO_SERVICE_NAME`: service name (default: function name)
//! - `LUMIGO_SPANS_DIRECTORY`: record directory (default: `/tmp/lumigo-spans`)
//! - `MAX_SIZE_FOR_REQUEST`: cap on buffered child records in bytes (default: 512000)
//!
//! ```no_run
//! use lumigo_lambda_tracer::TracerConfig;
//!
//! let config = TracerConfig::builder()
//!     .token("t_0123456789abcdef")
//!     .print_stdout(true)
//!     .build();
//! assert!(config.validate().is_ok());
//! ```

use crate::constants::{defaults, env_vars};
use bon::Builder;
use lumigo_span_exporter::RecordSink;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration problems detected when a handler is wrapped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid Token. Go to Lumigo Settings to get a valid token")]
    InvalidToken,
}

/// Configuration of the Lumigo tracer.
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct TracerConfig {
    /// Trace invocations. When disabled, handlers run without spans or records.
    ///
    /// Default: `true`
    #[builder(default = true)]
    pub enabled: bool,

    /// Lumigo token attached to every record. Must not be empty.
    #[builder(into, default)]
    pub token: String,

    /// Log the tracer's own diagnostics at debug level.
    ///
    /// Default: `false`
    #[builder(default = false)]
    pub debug: bool,

    /// Write records to stdout instead of the span directory.
    ///
    /// Default: `false`
    #[builder(default = false)]
    pub print_stdout: bool,

    /// Service name. Falls back to `OTEL_SERVICE_NAME`, then the function name.
    #[builder(into)]
    pub service_name: Option<String>,

    /// Directory watched by the Lumigo extension.
    ///
    /// Default: `/tmp/lumigo-spans`
    #[builder(into, default = PathBuf::from(defaults::SPANS_DIRECTORY))]
    pub spans_directory: PathBuf,

    /// Maximum serialized size of the child records written with one end record.
    ///
    /// Default: 512000 bytes
    #[builder(default = defaults::MAX_SIZE_FOR_REQUEST)]
    pub max_request_size: usize,

    /// Register the tracer provider as the global OpenTelemetry provider.
    ///
    /// Default: `false`
    #[builder(default = false)]
    pub set_global_provider: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

impl TracerConfig {
    /// Reads the configuration from the `LUMIGO_*` environment variables.
    ///
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::builder()
            .enabled(env_flag(env_vars::ENABLED).unwrap_or(true))
            .token(env_string(env_vars::TOKEN).unwrap_or_default())
            .debug(env_flag(env_vars::DEBUG).unwrap_or(false))
            .print_stdout(env_flag(env_vars::PRINT_STDOUT).unwrap_or(false))
            .maybe_service_name(env_string(env_vars::SERVICE_NAME))
            .spans_directory(
                env_string(env_vars::SPANS_DIRECTORY)
                    .unwrap_or_else(|| defaults::SPANS_DIRECTORY.to_string()),
            )
            .max_request_size(
                env_string(env_vars::MAX_SIZE_FOR_REQUEST)
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(defaults::MAX_SIZE_FOR_REQUEST),
            )
            .build()
    }

    /// Checks that the configuration can be used for tracing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::InvalidToken);
        }
        Ok(())
    }

    /// Creates the sink selected by this configuration.
    pub fn sink(&self) -> RecordSink {
        if self.print_stdout {
            RecordSink::stdout()
        } else {
            RecordSink::span_directory(&self.spans_directory)
        }
    }
}
