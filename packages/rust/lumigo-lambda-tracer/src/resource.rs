//! Resource attributes for Lambda functions.
//!
//! Every span carries these attributes, and the span mapper reads the Lumigo
//! token from them.
//!
//! ## Resource Attributes
//! - `lumigo_token`: From the tracer configuration
//! - `service_name` and `service.name`: From the configured service name,
//!   `OTEL_SERVICE_NAME`, or the function name, in that order
//! - `cloud.provider`: Set to "aws"
//! - `cloud.region`: From AWS_REGION
//! - `faas.name`: From AWS_LAMBDA_FUNCTION_NAME
//! - `faas.version`: From AWS_LAMBDA_FUNCTION_VERSION
//! - `faas.instance`: From AWS_LAMBDA_LOG_STREAM_NAME
//! - `faas.max_memory`: From AWS_LAMBDA_FUNCTION_MEMORY_SIZE, in bytes
//!
//! Additional attributes can be set via the `OTEL_RESOURCE_ATTRIBUTES` environment variable
//! in the format: `key=value,key2=value2`. Values can be URL-encoded if they contain
//! special characters:
//!
//! ```bash
//! OTEL_RESOURCE_ATTRIBUTES="deployment.stage=prod,custom.tag=value%20with%20spaces"
//! ```

use crate::config::TracerConfig;
use crate::constants::{env_vars, resource_attributes};
use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use std::env;
use urlencoding::decode;

/// Builds the resource for the tracer provider.
///
/// Only the attributes listed above are set; the SDK's default detectors are not run.
pub fn get_lambda_resource(config: &TracerConfig) -> Resource {
    let mut attributes = vec![KeyValue::new(
        resource_attributes::TOKEN,
        config.token.clone(),
    )];

    let function_name = env::var(env_vars::AWS_LAMBDA_FUNCTION_NAME).ok();
    let service_name = config
        .service_name
        .clone()
        .or_else(|| env::var(env_vars::OTEL_SERVICE_NAME).ok())
        .or_else(|| function_name.clone());
    if let Some(service_name) = service_name {
        attributes.push(KeyValue::new(
            resource_attributes::SERVICE_NAME,
            service_name.clone(),
        ));
        attributes.push(KeyValue::new("service.name", service_name));
    }

    if let Ok(region) = env::var(env_vars::AWS_REGION) {
        attributes.push(KeyValue::new("cloud.provider", "aws"));
        attributes.push(KeyValue::new("cloud.region", region));
    }

    if let Some(function_name) = function_name {
        attributes.push(KeyValue::new("faas.name", function_name));
    }

    if let Ok(version) = env::var(env_vars::AWS_LAMBDA_FUNCTION_VERSION) {
        attributes.push(KeyValue::new("faas.version", version));
    }

    if let Ok(memory) = env::var(env_vars::AWS_LAMBDA_FUNCTION_MEMORY_SIZE) {
        if let Ok(memory_mb) = memory.parse::<i64>() {
            attributes.push(KeyValue::new("faas.max_memory", memory_mb * 1024 * 1024));
        }
    }

    if let Ok(log_stream) = env::var(env_vars::AWS_LAMBDA_LOG_STREAM_NAME) {
        attributes.push(KeyValue::new("faas.instance", log_stream));
    }

    if let Ok(attrs) = env::var(env_vars::RESOURCE_ATTRIBUTES) {
        attributes.extend(parse_resource_attributes(&attrs));
    }

    Resource::builder_empty().with_attributes(attributes).build()
}

/// Parses `key=value` pairs separated by commas, URL-decoding the values.
fn parse_resource_attributes(attrs: &str) -> Vec<KeyValue> {
    attrs
        .split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                return None;
            }
            let decoded = decode(value).ok()?;
            Some(KeyValue::new(key.to_string(), decoded.into_owned()))
        })
        .collect()
}
