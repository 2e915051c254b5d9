//! Core shared types for the observability client.
//!
//! Everything here is plain data: the [`Resource`] describing the emitting
//! service, the [`SignalKind`] and [`LogLevel`] enumerations, structured
//! [`LogRecord`]s, and the [`AccessLogEntry`] schema produced by edge proxies.

#![warn(missing_docs, clippy::pedantic)]

mod access_log;
mod error;
mod log_record;
mod resource;
mod signal;

/// Access log schema emitted by request-forwarding proxies.
pub use access_log::{AccessLogEntry, AccessLogHeaders};
/// Error type and result alias shared across the observability crates.
pub use error::{Error, Result};
/// Structured log record and correlation data.
pub use log_record::{
    CorrelationContext, ErrorDetails, LogRecord, RESERVED_ATTRIBUTE_PREFIX, RESERVED_KEYS,
};
/// Identity descriptor attached to every signal.
pub use resource::{Attributes, Resource, semconv, validate_attribute_key};
/// Signal and severity enumerations.
pub use signal::{LogLevel, SignalKind};
