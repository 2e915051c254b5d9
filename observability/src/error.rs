//! Errors surfaced by the observability client.

use std::fmt;

use obs_config::ConfigError;
use obs_primitives::SignalKind;
use obs_signals::SignalError;
use thiserror::Error;

/// Result alias for client operations.
pub type ObservabilityResult<T> = Result<T, ObservabilityError>;

/// Errors returned by [`ObservabilityClient`](crate::ObservabilityClient) and
/// its builder.
#[derive(Debug, Error)]
pub enum ObservabilityError {
    /// Invalid configuration; the client was not created.
    #[error("invalid observability configuration: {0}")]
    Config(#[from] ConfigError),

    /// A signal manager failed outside of shutdown.
    #[error("{signal} signal failed: {source}")]
    Signal {
        /// Failing signal.
        signal: SignalKind,
        /// Underlying failure.
        #[source]
        source: SignalError,
    },

    /// The accessed signal was not enabled for this client.
    #[error("{signal} signal is not enabled")]
    SignalNotEnabled {
        /// Signal that was accessed.
        signal: SignalKind,
    },

    /// One or more managers failed to shut down. Every manager was still
    /// asked to shut down.
    #[error(transparent)]
    Shutdown(#[from] ShutdownFailures),
}

impl ObservabilityError {
    /// Wraps a manager failure, lifting configuration errors.
    #[must_use]
    pub fn signal(signal: SignalKind, source: SignalError) -> Self {
        match source {
            SignalError::Config(config) => Self::Config(config),
            source => Self::Signal { signal, source },
        }
    }
}

/// Per-manager shutdown failures, in signal order.
#[derive(Debug, Error)]
pub struct ShutdownFailures {
    failures: Vec<(SignalKind, SignalError)>,
}

impl ShutdownFailures {
    pub(crate) fn new(failures: Vec<(SignalKind, SignalError)>) -> Option<Self> {
        (!failures.is_empty()).then_some(Self { failures })
    }

    /// Number of failing managers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Always `false`; an empty set is never constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Signals whose shutdown failed.
    #[must_use]
    pub fn signals(&self) -> Vec<SignalKind> {
        self.failures.iter().map(|(signal, _)| *signal).collect()
    }

    /// Iterates over the failures.
    pub fn iter(&self) -> impl Iterator<Item = (SignalKind, &SignalError)> {
        self.failures.iter().map(|(signal, err)| (*signal, err))
    }

    /// Consumes the set, returning the failures.
    #[must_use]
    pub fn into_inner(self) -> Vec<(SignalKind, SignalError)> {
        self.failures
    }
}

impl fmt::Display for ShutdownFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} signal(s) failed to shut down", self.failures.len())?;
        for (signal, err) in &self.failures {
            write!(f, "; {signal}: {err}")?;
        }
        Ok(())
    }
}
