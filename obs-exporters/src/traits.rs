//! Reader traits and the shared exporter error type.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::data::MetricBatch;

/// Result alias used by exporters and sinks.
pub type ExporterResult<T> = Result<T, ExporterError>;

/// Error type shared by exporter implementations.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// Exporter is misconfigured.
    #[error("exporter not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
    },

    /// The exporter needs an async runtime that is not available.
    #[error("exporter requires a tokio runtime: {reason}")]
    Runtime {
        /// Additional context for the failure.
        reason: String,
    },

    /// Transport-level failures (network, protocol, etc.).
    #[error("exporter transport error: {reason}")]
    Transport {
        /// Additional context about the error.
        reason: String,
    },

    /// The backend rejected the payload.
    #[error("exporter backend returned {status}: {reason}")]
    Response {
        /// HTTP status returned by the backend.
        status: u16,
        /// Response body or reason phrase.
        reason: String,
    },

    /// Payload could not be encoded.
    #[error("failed to encode export payload: {source}")]
    Encoding {
        /// Source [`serde_json::Error`].
        #[from]
        source: serde_json::Error,
    },

    /// Local I/O failure (socket bind, stdout write).
    #[error("exporter i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },

    /// The exporter was already shut down.
    #[error("exporter `{kind}` is shut down")]
    ShutDown {
        /// Kind of the exporter.
        kind: ExporterKind,
    },
}

impl ExporterError {
    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for transport failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for missing runtime failures.
    #[must_use]
    pub fn runtime(reason: impl Into<String>) -> Self {
        Self::Runtime {
            reason: reason.into(),
        }
    }
}

/// Identity of an exporter, used to deduplicate registrations.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExporterKind {
    /// Writes batches to the process console.
    Console,
    /// Serves a Prometheus scrape endpoint.
    Prometheus,
    /// Pushes batches to an OTLP/HTTP collector.
    Otlp,
    /// Pushes batches to the Datadog API.
    Datadog,
    /// User-supplied exporter identified by name.
    Custom(String),
}

impl fmt::Display for ExporterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Console => f.write_str("console"),
            Self::Prometheus => f.write_str("prometheus"),
            Self::Otlp => f.write_str("otlp"),
            Self::Datadog => f.write_str("datadog"),
            Self::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

/// How a reader obtains data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// The provider hands batches to the reader on its export schedule.
    Push,
    /// The reader collects on demand from an attached producer.
    Pull,
}

/// Source of metric batches; implemented by the meter provider.
pub trait MetricProducer: Send + Sync {
    /// Collects the current state of every instrument.
    fn produce(&self) -> MetricBatch;
}

/// Live sink created from an [`ExporterAdapter`](crate::adapter::ExporterAdapter).
#[async_trait]
pub trait MetricReader: Send + Sync + fmt::Debug {
    /// Identity of the reader.
    fn kind(&self) -> ExporterKind;

    /// Whether the reader is pushed to or pulls.
    fn delivery(&self) -> Delivery;

    /// Binds the reader to the provider's producer. Pull readers start serving here.
    ///
    /// # Errors
    ///
    /// Returns an [`ExporterError`] if the reader cannot start.
    fn attach(&self, producer: Arc<dyn MetricProducer>) -> ExporterResult<()> {
        let _ = producer;
        Ok(())
    }

    /// Delivers one batch. Pull readers ignore pushed batches.
    async fn export(&self, batch: &MetricBatch) -> ExporterResult<()>;

    /// Flushes anything buffered by the reader.
    async fn force_flush(&self) -> ExporterResult<()> {
        Ok(())
    }

    /// Releases sockets, tasks and buffers held by the reader.
    async fn shutdown(&self) -> ExporterResult<()>;
}

/// Factory for user-supplied readers.
pub trait MetricReaderFactory: Send + Sync {
    /// Creates one live reader.
    ///
    /// # Errors
    ///
    /// Returns an [`ExporterError`] if the reader cannot be constructed.
    fn create(&self) -> ExporterResult<Box<dyn MetricReader>>;
}

impl<F> MetricReaderFactory for F
where
    F: Fn() -> ExporterResult<Box<dyn MetricReader>> + Send + Sync,
{
    fn create(&self) -> ExporterResult<Box<dyn MetricReader>> {
        self()
    }
}
