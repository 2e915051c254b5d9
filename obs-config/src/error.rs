//! Configuration error types.

use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while validating configuration. None of them are retryable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `service_name` was absent or blank.
    #[error("service name is required")]
    MissingServiceName,

    /// Metrics were enabled without any exporter.
    #[error("at least one exporter must be configured when metrics are enabled")]
    NoExporters,

    /// An attribute key was rejected.
    #[error("invalid attribute `{key}`: {reason}")]
    InvalidAttribute {
        /// Offending key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A log level string did not name a known severity.
    #[error("invalid log level `{value}`")]
    InvalidLogLevel {
        /// Offending value.
        value: String,
    },
}

impl From<obs_primitives::Error> for ConfigError {
    fn from(err: obs_primitives::Error) -> Self {
        match err {
            obs_primitives::Error::InvalidAttributeKey { key, reason } => {
                Self::InvalidAttribute { key, reason }
            }
            obs_primitives::Error::InvalidLogLevel { value } => Self::InvalidLogLevel { value },
            obs_primitives::Error::InvalidPayload { reason } => Self::InvalidAttribute {
                key: String::new(),
                reason,
            },
        }
    }
}
