//! Output schema written by the sink.
//!
//! Field names are part of the wire contract with the Lumigo extension and
//! must not change. Every string field defaults to empty so that a record
//! produced from partial data still serializes to the full shape.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The X-Ray trace root of the invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRoot {
    #[serde(rename = "Root", default)]
    pub root: String,
}

/// Version of the tracer that produced the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracerVersion {
    #[serde(default)]
    pub version: String,
}

/// Extra per-record information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanInfo {
    #[serde(rename = "logStreamName", default)]
    pub log_stream_name: String,
    #[serde(rename = "logGroupName", default)]
    pub log_group_name: String,
    #[serde(rename = "traceId", default)]
    pub trace_id: TraceRoot,
    #[serde(rename = "tracer", default)]
    pub tracer: TracerVersion,
}

/// Structured description of an invocation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub stacktrace: String,
}

impl ErrorRecord {
    /// True when none of the three fields carries data.
    pub fn is_empty(&self) -> bool {
        self.error_type.is_empty() && self.message.is_empty() && self.stacktrace.is_empty()
    }
}

/// One Lumigo span record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanRecord {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "parentId", default)]
    pub parent_id: String,
    #[serde(rename = "transactionId", default)]
    pub transaction_id: String,
    #[serde(default)]
    pub runtime: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub token: String,
    #[serde(rename = "memoryAllocated", default)]
    pub memory_allocated: String,
    #[serde(default)]
    pub account: String,
    #[serde(rename = "envs", default)]
    pub env_vars: String,
    #[serde(rename = "type", default)]
    pub lambda_type: String,
    #[serde(rename = "name", default)]
    pub lambda_name: String,
    #[serde(default)]
    pub readiness: String,
    #[serde(
        rename = "return_value",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub return_value: Option<String>,
    #[serde(rename = "lambda_container_id", default)]
    pub container_id: String,
    #[serde(default)]
    pub info: SpanInfo,
    #[serde(default)]
    pub started: i64,
    #[serde(default)]
    pub ended: i64,
    #[serde(rename = "maxFinishTime", default)]
    pub max_finish_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

/// Which write a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordRole {
    /// Written as soon as the invocation starts.
    Start,
    /// Written once the invocation has completed, together with any child spans.
    End,
}

impl fmt::Display for RecordRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordRole::Start => write!(f, "start"),
            RecordRole::End => write!(f, "end"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn sample_record() -> SpanRecord {
        SpanRecord {
            id: "123".to_string(),
            transaction_id: "bd862e3fe1be46a994272793".to_string(),
            runtime: "AWS_Lambda_rust".to_string(),
            region: "us-east-1".to_string(),
            event: r#"{"key":"value"}"#.to_string(),
            token: "t_123".to_string(),
            memory_allocated: "128".to_string(),
            account: "123456789012".to_string(),
            env_vars: "{}".to_string(),
            lambda_type: "function".to_string(),
            lambda_name: "testFunction".to_string(),
            readiness: "cold".to_string(),
            return_value: Some("\"ok\"".to_string()),
            container_id: "b7c5c9f8-0000-4000-8000-000000000000".to_string(),
            info: SpanInfo {
                log_stream_name: "2024/01/01/[$LATEST]abc".to_string(),
                log_group_name: "/aws/lambda/testFunction".to_string(),
                trace_id: TraceRoot {
                    root: "1-5759e988-bd862e3fe1be46a994272793".to_string(),
                },
                tracer: TracerVersion {
                    version: "0.3.0".to_string(),
                },
            },
            started: 1_700_000_000_000,
            ended: 1_700_000_000_250,
            max_finish_time: 1_700_000_003_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(sample_record()).unwrap();
        let obj = json.as_object().unwrap();
        for key in [
            "id",
            "parentId",
            "transactionId",
            "runtime",
            "region",
            "event",
            "token",
            "memoryAllocated",
            "account",
            "envs",
            "type",
            "name",
            "readiness",
            "return_value",
            "lambda_container_id",
            "info",
            "started",
            "ended",
            "maxFinishTime",
        ] {
            assert!(obj.contains_key(key), "missing key {}", key);
        }
        assert_eq!(json["info"]["traceId"]["Root"], "1-5759e988-bd862e3fe1be46a994272793");
        assert_eq!(json["info"]["tracer"]["version"], "0.3.0");
    }

    #[test]
    fn test_absent_error_and_return_value_are_omitted() {
        let record = SpanRecord {
            return_value: None,
            error: None,
            ..sample_record()
        };
        let json = serde_json::to_value(record).unwrap();
        assert!(json.get("error").is_none());
        assert!(json.get("return_value").is_none());
    }

    #[test]
    fn test_error_record_serialization() {
        let record = SpanRecord {
            return_value: None,
            error: Some(ErrorRecord {
                error_type: "MyError".to_string(),
                message: "boom".to_string(),
                stacktrace: String::new(),
            }),
            ..sample_record()
        };
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["error"]["type"], "MyError");
        assert_eq!(json["error"]["message"], "boom");
        assert_eq!(json["error"]["stacktrace"], Value::String(String::new()));
    }

    #[test]
    fn test_record_survives_json_round_trip() {
        let record = SpanRecord {
            error: Some(ErrorRecord {
                error_type: "MyError".to_string(),
                ..Default::default()
            }),
            ..sample_record()
        };
        let line = serde_json::to_string(&vec![record.clone()]).unwrap();
        let parsed: Vec<SpanRecord> = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, vec![record]);
    }

    #[test]
    fn test_error_record_is_empty() {
        assert!(ErrorRecord::default().is_empty());
        assert!(!ErrorRecord {
            stacktrace: "at main".to_string(),
            ..Default::default()
        }
        .is_empty());
    }
}
