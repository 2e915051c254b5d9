//! Destinations for structured log records.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use obs_primitives::{LogLevel, LogRecord};
use parking_lot::Mutex;

use crate::adapter::ConsoleTarget;
use crate::console::JsonLineWriter;
use crate::traits::ExporterResult;

/// Receives every record that passes the logger's level filter.
pub trait LogSink: Send + Sync + fmt::Debug {
    /// Writes one record.
    ///
    /// # Errors
    ///
    /// Returns an [`ExporterError`](crate::ExporterError) if the record cannot be
    /// encoded or written.
    fn emit(&self, record: &LogRecord) -> ExporterResult<()>;

    /// Flushes buffered output.
    ///
    /// # Errors
    ///
    /// Returns an [`ExporterError`](crate::ExporterError) if the flush fails.
    fn flush(&self) -> ExporterResult<()> {
        Ok(())
    }
}

/// Writes records as JSON lines to a console stream.
#[derive(Debug)]
pub struct WriterSink {
    out: JsonLineWriter,
}

impl WriterSink {
    /// Sink bound to stdout or stderr.
    #[must_use]
    pub fn new(target: ConsoleTarget) -> Self {
        Self::with_writer(JsonLineWriter::for_target(target))
    }

    /// Sink bound to an arbitrary writer.
    #[must_use]
    pub fn with_writer(out: JsonLineWriter) -> Self {
        Self { out }
    }
}

impl LogSink for WriterSink {
    fn emit(&self, record: &LogRecord) -> ExporterResult<()> {
        self.out.write_line(record)
    }

    fn flush(&self) -> ExporterResult<()> {
        self.out.flush()
    }
}

/// Forwards records to the process-wide `tracing` subscriber.
#[derive(Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: &LogRecord) -> ExporterResult<()> {
        let payload = serde_json::to_string(record)?;
        let message = record.message();
        match record.level() {
            LogLevel::Trace => tracing::trace!(target: "observability", record = %payload, "{message}"),
            LogLevel::Debug => tracing::debug!(target: "observability", record = %payload, "{message}"),
            LogLevel::Info => tracing::info!(target: "observability", record = %payload, "{message}"),
            LogLevel::Warn => tracing::warn!(target: "observability", record = %payload, "{message}"),
            LogLevel::Error | LogLevel::Fatal => {
                tracing::error!(target: "observability", level = record.level().as_str(), record = %payload, "{message}");
            }
        }
        Ok(())
    }
}

/// In-memory sink that keeps every record; clones share storage.
#[derive(Clone, Debug, Default)]
pub struct MemoryLogSink {
    records: Arc<Mutex<Vec<LogRecord>>>,
    flushes: Arc<AtomicUsize>,
}

impl MemoryLogSink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the captured records, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Number of captured records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing has been captured yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Drops every captured record.
    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Number of flushes requested so far.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::Acquire)
    }
}

impl LogSink for MemoryLogSink {
    fn emit(&self, record: &LogRecord) -> ExporterResult<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn flush(&self) -> ExporterResult<()> {
        self.flushes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Where a logger writes its records.
#[derive(Clone, Debug, Default)]
pub enum LogOutput {
    /// JSON lines on stdout.
    #[default]
    Stdout,
    /// JSON lines on stderr.
    Stderr,
    /// Events on the installed `tracing` subscriber.
    Tracing,
    /// Captured in memory.
    Memory(MemoryLogSink),
}

impl LogOutput {
    /// Builds the sink for this output.
    #[must_use]
    pub fn create(&self) -> Arc<dyn LogSink> {
        match self {
            Self::Stdout => Arc::new(WriterSink::new(ConsoleTarget::Stdout)),
            Self::Stderr => Arc::new(WriterSink::new(ConsoleTarget::Stderr)),
            Self::Tracing => Arc::new(TracingSink),
            Self::Memory(sink) => Arc::new(sink.clone()),
        }
    }
}

impl std::str::FromStr for LogOutput {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stdout" | "console" => Ok(Self::Stdout),
            "stderr" => Ok(Self::Stderr),
            "tracing" => Ok(Self::Tracing),
            other => Err(format!("unknown log output `{other}`")),
        }
    }
}
