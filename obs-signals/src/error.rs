//! Errors raised by signal managers.

use obs_config::ConfigError;
use obs_exporters::{ExporterError, ExporterKind};
use obs_primitives::SignalKind;
use thiserror::Error;

use crate::lifecycle::LifecycleError;

/// Result alias for signal operations.
pub type SignalResult<T> = Result<T, SignalError>;

/// Errors produced while initialising, using, or shutting down a signal.
#[derive(Debug, Error)]
pub enum SignalError {
    /// The signal configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A lifecycle transition was refused.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// One exporter failed.
    #[error("exporter `{kind}` failed: {source}")]
    Exporter {
        /// Failing exporter.
        kind: ExporterKind,
        /// Underlying failure.
        #[source]
        source: ExporterError,
    },

    /// Several exporters failed during one flush or shutdown.
    #[error("{} exporter(s) failed: {}", .0.len(), describe(.0))]
    Exporters(Vec<(ExporterKind, ExporterError)>),

    /// The log sink rejected a record or a flush.
    #[error("log sink failed: {0}")]
    LogSink(#[source] ExporterError),

    /// An instrument name or option was rejected.
    #[error("invalid instrument `{name}`: {reason}")]
    InvalidInstrument {
        /// Offending instrument name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The manager has not produced its runtime object yet.
    #[error("{signal} signal is not initialized")]
    NotInitialized {
        /// Signal that was accessed.
        signal: SignalKind,
    },
}

impl SignalError {
    /// Convenience constructor for instrument validation failures.
    #[must_use]
    pub fn invalid_instrument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInstrument {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Collapses per-exporter failures into a single error, if any.
    #[must_use]
    pub fn from_failures(mut failures: Vec<(ExporterKind, ExporterError)>) -> Option<Self> {
        match failures.len() {
            0 => None,
            1 => failures
                .pop()
                .map(|(kind, source)| Self::Exporter { kind, source }),
            _ => Some(Self::Exporters(failures)),
        }
    }
}

fn describe(failures: &[(ExporterKind, ExporterError)]) -> String {
    failures
        .iter()
        .map(|(kind, err)| format!("{kind}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}
