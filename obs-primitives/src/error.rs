//! Shared error definitions for observability primitives.

use thiserror::Error;

/// Result alias used throughout the primitives crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing primitive types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Attribute key failed validation.
    #[error("invalid attribute key `{key}`: {reason}")]
    InvalidAttributeKey {
        /// The offending key.
        key: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Log level string did not name a known severity.
    #[error("unknown log level `{value}`")]
    InvalidLogLevel {
        /// The unrecognised level string.
        value: String,
    },

    /// Structured payload could not be flattened into attributes.
    #[error("invalid structured payload: {reason}")]
    InvalidPayload {
        /// Human-readable reason for rejection.
        reason: String,
    },
}
