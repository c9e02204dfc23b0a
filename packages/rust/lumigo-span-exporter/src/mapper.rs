//! Mapping from collected span data to Lumigo span records.
//!
//! [`transform`] is total: every missing or malformed input leaves the
//! corresponding field empty and is reported through `tracing`, the record
//! is always produced.

use crate::attributes::AttributeBag;
use crate::constants::{attributes, env_vars, span_names, values};
use crate::context::ExecutionContext;
use crate::record::SpanRecord;
use crate::span_error;
use opentelemetry::trace::SpanId;
use opentelemetry_sdk::trace::SpanData;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

/// Name, timing and parentage of a finished span.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanSummary {
    pub name: String,
    /// Start time in milliseconds since the epoch.
    pub start_ms: i64,
    /// End time in milliseconds since the epoch.
    pub end_ms: i64,
    /// Parent span id in hex, when the span has a valid parent.
    pub parent_id: Option<String>,
}

impl SpanSummary {
    pub fn from_span_data(span: &SpanData) -> Self {
        let parent_id = if span.parent_span_id == SpanId::INVALID {
            None
        } else {
            Some(span.parent_span_id.to_string())
        };
        Self {
            name: span.name.to_string(),
            start_ms: epoch_millis(span.start_time),
            end_ms: epoch_millis(span.end_time),
            parent_id,
        }
    }
}

fn epoch_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Failure to read the account id out of a function ARN.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArnError {
    #[error("ARN must start with 'arn:': {0}")]
    MissingPrefix(String),
    #[error("ARN has {found} sections, expected at least 6: {arn}")]
    TooFewSections { arn: String, found: usize },
    #[error("ARN has an empty account id: {0}")]
    EmptyAccount(String),
}

/// Returns the account id of an `arn:partition:service:region:account-id:resource` ARN.
pub fn account_id(arn: &str) -> Result<&str, ArnError> {
    let sections: Vec<&str> = arn.splitn(6, ':').collect();
    if sections.first() != Some(&"arn") {
        return Err(ArnError::MissingPrefix(arn.to_string()));
    }
    if sections.len() < 6 {
        return Err(ArnError::TooFewSections {
            arn: arn.to_string(),
            found: sections.len(),
        });
    }
    match sections[4] {
        "" => Err(ArnError::EmptyAccount(arn.to_string())),
        account => Ok(account),
    }
}

/// Extracts the trace root from an X-Ray trace header.
///
/// Only the first `;`-separated segment is considered, its value after `=`
/// is the root. Returns `None` for headers without such a value.
pub fn trace_root(header: &str) -> Option<&str> {
    let first = header.split(';').next()?;
    let mut parts = first.splitn(2, '=');
    parts.next()?;
    parts.next().map(str::trim).filter(|root| !root.is_empty())
}

/// Returns everything after the second `-` of a trace root.
pub fn transaction_id(root: &str) -> Option<&str> {
    root.splitn(3, '-').nth(2).filter(|id| !id.is_empty())
}

/// Reads a string attribute, logging a diagnostic when it is missing.
fn required_attribute(bag: &AttributeBag, key: &str, span_name: &str) -> String {
    match bag.get_string(key) {
        Some(value) => value,
        None => {
            debug!(key, span = span_name, "span attribute missing");
            String::new()
        }
    }
}

/// Maps one span to a Lumigo span record.
///
/// `function_name` identifies start spans: a span named after the function
/// produces the start record, whose id is suffixed with `_started` and which
/// never carries a return value or an error.
pub fn transform(
    bag: &AttributeBag,
    ctx: Option<&ExecutionContext>,
    span: &SpanSummary,
    function_name: &str,
) -> SpanRecord {
    let is_start = !function_name.is_empty() && span.name == function_name;
    let lambda_type = if is_start || span.name == span_names::PARENT_SPAN {
        values::FUNCTION
    } else {
        values::HTTP
    };

    let mut record = SpanRecord {
        started: span.start_ms,
        ended: span.end_ms,
        region: bag.env_or_empty(env_vars::REGION),
        memory_allocated: bag.env_or_empty(env_vars::MEMORY_SIZE),
        runtime: bag.env_or_empty(env_vars::EXECUTION_ENV),
        lambda_name: bag.env_or_empty(env_vars::FUNCTION_NAME),
        lambda_type: lambda_type.to_string(),
        parent_id: span.parent_id.clone().unwrap_or_default(),
        token: required_attribute(bag, attributes::TOKEN, &span.name),
        event: required_attribute(bag, attributes::EVENT, &span.name),
        ..Default::default()
    };

    record.info.log_stream_name = bag.env_or_empty(env_vars::LOG_STREAM_NAME);
    record.info.log_group_name = bag.env_or_empty(env_vars::LOG_GROUP_NAME);
    record.info.tracer.version = env!("CARGO_PKG_VERSION").to_string();

    record.env_vars = serde_json::to_string(bag.environment()).unwrap_or_else(|err| {
        warn!(error = %err, "failed to encode environment");
        String::new()
    });

    if !is_start {
        record.return_value = bag.get_string(attributes::RESPONSE);
        if record.return_value.is_none() && span.name == span_names::PARENT_SPAN {
            debug!(span = %span.name, "span carries no response");
        }
        record.error = span_error::extract(bag);
    }

    let provisioned =
        bag.env(env_vars::INITIALIZATION_TYPE) == Some(values::PROVISIONED_CONCURRENCY);
    let warm = ctx.is_some_and(ExecutionContext::is_warm);
    let readiness = if warm || provisioned {
        values::WARM
    } else {
        values::COLD
    };
    record.readiness = readiness.to_string();

    let mut header = bag.env(env_vars::TRACE_HEADER);
    match ctx {
        Some(ctx) => {
            record.id = if is_start {
                format!("{}{}", ctx.request_id(), values::STARTED_SUFFIX)
            } else {
                ctx.request_id().to_string()
            };
            record.container_id = ctx.container_id().to_string();
            record.max_finish_time = ctx.deadline_ms();
            match account_id(ctx.invoked_function_arn()) {
                Ok(account) => record.account = account.to_string(),
                Err(err) => warn!(error = %err, "failed to read account id"),
            }
            if let Some(ctx_header) = ctx.trace_header() {
                header = Some(ctx_header);
            }
        }
        None => debug!(span = %span.name, "no execution context for span"),
    }

    match header.and_then(trace_root) {
        Some(root) => {
            record.info.trace_id.root = root.to_string();
            record.transaction_id = transaction_id(root).unwrap_or_default().to_string();
        }
        None => debug!(span = %span.name, "no trace root available"),
    }

    record
}
