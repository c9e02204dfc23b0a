//! Attribute collection for span mapping.
//!
//! A span's data is spread across its resource, its own attributes and the
//! process environment. [`AttributeBag`] flattens all of it into one lookup
//! so the mapper never has to know where a value came from.
//!
//! Sources are applied in order, later ones overwriting earlier ones:
//!
//! 1. resource attributes
//! 2. span attributes
//! 3. derived attributes (`span.kind`)
//!
//! The environment is kept in a separate map, snapshotted when the bag is
//! collected.

use crate::constants::attributes;
use opentelemetry::trace::SpanKind;
use opentelemetry::{Key, Value};
use opentelemetry_sdk::trace::SpanData;
use opentelemetry_sdk::Resource;
use std::collections::BTreeMap;
use std::env;
use std::fmt;

/// A dynamically typed scalar attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&Value> for AttributeValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Bool(b) => AttributeValue::Bool(*b),
            Value::I64(i) => AttributeValue::Int(*i),
            Value::F64(f) => AttributeValue::Float(*f),
            Value::String(s) => AttributeValue::String(s.as_str().to_string()),
            // arrays are flattened to their display form
            other => AttributeValue::String(other.to_string()),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

/// Flattened view over resource attributes, span attributes, derived
/// attributes and the process environment of one span.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeBag {
    attributes: BTreeMap<String, AttributeValue>,
    environment: BTreeMap<String, String>,
}

impl AttributeBag {
    /// Creates an empty bag with an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the attributes of an exported span together with the
    /// resource it was produced under and the current process environment.
    pub fn collect(resource: &Resource, span: &SpanData) -> Self {
        Self::new()
            .with_resource(resource)
            .with_key_values(span.attributes.iter().map(|kv| (&kv.key, &kv.value)))
            .with_span_kind(&span.span_kind)
            .with_process_environment()
    }

    /// Adds every resource attribute.
    pub fn with_resource(self, resource: &Resource) -> Self {
        self.with_key_values(resource.iter())
    }

    /// Adds OpenTelemetry key/value pairs, overwriting existing keys.
    pub fn with_key_values<'a, I>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a Key, &'a Value)>,
    {
        for (key, value) in pairs {
            self.attributes
                .insert(key.as_str().to_string(), AttributeValue::from(value));
        }
        self
    }

    /// Adds the derived `span.kind` attribute.
    pub fn with_span_kind(self, kind: &SpanKind) -> Self {
        let kind = match kind {
            SpanKind::Client => "client",
            SpanKind::Server => "server",
            SpanKind::Producer => "producer",
            SpanKind::Consumer => "consumer",
            SpanKind::Internal => "internal",
        };
        self.with_attribute(attributes::SPAN_KIND, kind)
    }

    /// Adds a single attribute, overwriting an existing key.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Replaces the environment snapshot with the current process environment.
    ///
    /// Non-UTF-8 names and values are converted lossily.
    pub fn with_process_environment(self) -> Self {
        let vars = env::vars_os().map(|(k, v)| {
            (
                k.to_string_lossy().into_owned(),
                v.to_string_lossy().into_owned(),
            )
        });
        self.with_environment(vars)
    }

    /// Replaces the environment snapshot.
    pub fn with_environment<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.environment = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Returns the raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Returns the display form of the value stored under `key`.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.attributes.get(key).map(ToString::to_string)
    }

    /// Returns an environment variable from the snapshot.
    pub fn env(&self, name: &str) -> Option<&str> {
        self.environment.get(name).map(String::as_str)
    }

    /// Returns an environment variable from the snapshot, or an empty string.
    pub fn env_or_empty(&self, name: &str) -> String {
        self.env(name).unwrap_or_default().to_string()
    }

    /// The full environment snapshot.
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// All collected attributes.
    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::KeyValue;
    use serial_test::serial;

    #[test]
    fn test_later_sources_overwrite_earlier_ones() {
        let resource = Resource::builder_empty()
            .with_attributes(vec![
                KeyValue::new("lumigo_token", "from-resource"),
                KeyValue::new("cloud.region", "us-east-1"),
            ])
            .build();
        let span_attrs = [KeyValue::new("lumigo_token", "from-span")];

        let bag = AttributeBag::new()
            .with_resource(&resource)
            .with_key_values(span_attrs.iter().map(|kv| (&kv.key, &kv.value)))
            .with_attribute("cloud.region", "eu-west-1");

        assert_eq!(bag.get_string("lumigo_token").as_deref(), Some("from-span"));
        assert_eq!(bag.get_string("cloud.region").as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_scalar_values_keep_their_type() {
        let pairs = [
            KeyValue::new("count", 3_i64),
            KeyValue::new("ratio", 0.5_f64),
            KeyValue::new("flag", true),
        ];
        let bag = AttributeBag::new().with_key_values(pairs.iter().map(|kv| (&kv.key, &kv.value)));

        assert_eq!(bag.get("count"), Some(&AttributeValue::Int(3)));
        assert_eq!(bag.get("ratio"), Some(&AttributeValue::Float(0.5)));
        assert_eq!(bag.get("flag"), Some(&AttributeValue::Bool(true)));
        assert_eq!(bag.get_string("flag").as_deref(), Some("true"));
        assert_eq!(bag.get_string("count").as_deref(), Some("3"));
    }

    #[test]
    fn test_span_kind_is_lowercase() {
        let bag = AttributeBag::new().with_span_kind(&SpanKind::Server);
        assert_eq!(bag.get_string("span.kind").as_deref(), Some("server"));
    }

    #[test]
    fn test_explicit_environment() {
        let bag = AttributeBag::new().with_environment([("AWS_REGION", "us-west-2")]);
        assert_eq!(bag.env("AWS_REGION"), Some("us-west-2"));
        assert_eq!(bag.env_or_empty("AWS_LAMBDA_FUNCTION_NAME"), "");
        assert!(bag.is_empty());
    }

    #[test]
    #[serial]
    fn test_process_environment_snapshot() {
        env::set_var("LUMIGO_ATTRIBUTES_TEST", "snapshot");
        let bag = AttributeBag::new().with_process_environment();
        env::remove_var("LUMIGO_ATTRIBUTES_TEST");

        // the snapshot is not affected by later changes
        assert_eq!(bag.env("LUMIGO_ATTRIBUTES_TEST"), Some("snapshot"));
    }
}
