//! Structured log records.

use std::collections::BTreeMap;
use std::error::Error as StdError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::signal::LogLevel;

/// Correlation identifiers attached to a record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationContext {
    /// Identifier of a distributed trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Identifier of the current operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    /// Identifier of the parent operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    /// Key/value pairs propagated alongside the trace.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub baggage: BTreeMap<String, String>,
}

impl CorrelationContext {
    /// Creates a context for the given trace.
    #[must_use]
    pub fn for_trace(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: Some(trace_id.into()),
            ..Self::default()
        }
    }

    /// Sets the span identifier.
    #[must_use]
    pub fn with_span(mut self, span_id: impl Into<String>) -> Self {
        self.span_id = Some(span_id.into());
        self
    }

    /// Sets the parent span identifier.
    #[must_use]
    pub fn with_parent_span(mut self, parent_span_id: impl Into<String>) -> Self {
        self.parent_span_id = Some(parent_span_id.into());
        self
    }

    /// Adds a baggage entry.
    #[must_use]
    pub fn with_baggage(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.baggage.insert(key.into(), value.into());
        self
    }
}

/// Error information carried by a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Error message.
    pub message: String,
    /// Optional machine-readable code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Optional cause chain or stack description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorDetails {
    /// Creates details with only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            stack: None,
        }
    }

    /// Captures an error and its `source()` chain.
    #[must_use]
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(format!("caused by: {cause}"));
            source = cause.source();
        }

        Self {
            message: error.to_string(),
            code: None,
            stack: (!causes.is_empty()).then(|| causes.join("\n")),
        }
    }

    /// Sets the error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Top-level keys of a serialized record. Attributes with these names are
/// stored under [`RESERVED_ATTRIBUTE_PREFIX`] so they cannot shadow them.
pub const RESERVED_KEYS: [&str; 5] = ["time", "level", "msg", "context", "err"];

/// Prefix applied to attribute keys that collide with [`RESERVED_KEYS`].
pub const RESERVED_ATTRIBUTE_PREFIX: &str = "attr.";

fn attribute_key(key: String) -> String {
    if RESERVED_KEYS.contains(&key.as_str()) {
        format!("{RESERVED_ATTRIBUTE_PREFIX}{key}")
    } else {
        key
    }
}

/// A single structured log entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(rename = "time")]
    timestamp: DateTime<Utc>,
    level: LogLevel,
    #[serde(rename = "msg")]
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<CorrelationContext>,
    #[serde(default, rename = "err", skip_serializing_if = "Option::is_none")]
    error: Option<ErrorDetails>,
    #[serde(flatten)]
    attributes: BTreeMap<String, Value>,
}

impl LogRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            context: None,
            error: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Overrides the record timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attaches correlation identifiers.
    #[must_use]
    pub fn with_context(mut self, context: CorrelationContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Attaches error details.
    #[must_use]
    pub fn with_error(mut self, error: ErrorDetails) -> Self {
        self.error = Some(error);
        self
    }

    /// Sets a single attribute, replacing any previous value. Reserved keys
    /// are prefixed with `attr.`.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(attribute_key(key.into()), value.into());
        self
    }

    /// Sets several attributes; incoming keys replace existing ones.
    #[must_use]
    pub fn with_attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.attributes.extend(
            attributes
                .into_iter()
                .map(|(key, value)| (attribute_key(key.into()), value.into())),
        );
        self
    }

    /// Fills in `base` attributes for keys the record does not already carry.
    #[must_use]
    pub fn with_base_attributes<'a, I>(mut self, base: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        for (key, value) in base {
            self.attributes
                .entry(attribute_key(key.clone()))
                .or_insert_with(|| value.clone());
        }
        self
    }

    /// Record timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Record severity.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }

    /// Record message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Correlation identifiers, if any.
    #[must_use]
    pub fn context(&self) -> Option<&CorrelationContext> {
        self.context.as_ref()
    }

    /// Error details, if any.
    #[must_use]
    pub fn error(&self) -> Option<&ErrorDetails> {
        self.error.as_ref()
    }

    /// Structured attributes.
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Looks up one attribute by the key it was set with.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        if RESERVED_KEYS.contains(&key) {
            return self
                .attributes
                .get(&format!("{RESERVED_ATTRIBUTE_PREFIX}{key}"));
        }
        self.attributes.get(key)
    }
}
