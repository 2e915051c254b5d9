//! Console metric reader.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::adapter::ConsoleTarget;
use crate::data::MetricBatch;
use crate::traits::{Delivery, ExporterError, ExporterKind, ExporterResult, MetricReader};

/// Serialises values as newline-delimited JSON onto a writer.
pub struct JsonLineWriter {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLineWriter {
    /// Wraps an arbitrary writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Writer bound to the given console stream.
    #[must_use]
    pub fn for_target(target: ConsoleTarget) -> Self {
        match target {
            ConsoleTarget::Stdout => Self::new(Box::new(io::stdout())),
            ConsoleTarget::Stderr => Self::new(Box::new(io::stderr())),
        }
    }

    /// Writes one value followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns [`ExporterError::Encoding`] or [`ExporterError::Io`] on failure.
    pub fn write_line<T: Serialize + ?Sized>(&self, value: &T) -> ExporterResult<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        let mut writer = self.writer.lock();
        writer.write_all(&line)?;
        Ok(())
    }

    /// Flushes the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns [`ExporterError::Io`] on failure.
    pub fn flush(&self) -> ExporterResult<()> {
        self.writer.lock().flush()?;
        Ok(())
    }
}

impl fmt::Debug for JsonLineWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLineWriter").finish_non_exhaustive()
    }
}

/// Push reader printing each batch as one JSON line.
#[derive(Debug)]
pub struct ConsoleReader {
    out: JsonLineWriter,
    closed: AtomicBool,
}

impl ConsoleReader {
    /// Reader writing to the given console stream.
    #[must_use]
    pub fn new(target: ConsoleTarget) -> Self {
        Self::with_writer(JsonLineWriter::for_target(target))
    }

    /// Reader writing to a caller-supplied line writer.
    #[must_use]
    pub fn with_writer(out: JsonLineWriter) -> Self {
        Self {
            out,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MetricReader for ConsoleReader {
    fn kind(&self) -> ExporterKind {
        ExporterKind::Console
    }

    fn delivery(&self) -> Delivery {
        Delivery::Push
    }

    async fn export(&self, batch: &MetricBatch) -> ExporterResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ExporterError::ShutDown { kind: self.kind() });
        }
        if batch.is_empty() {
            return Ok(());
        }
        self.out.write_line(batch)
    }

    async fn force_flush(&self) -> ExporterResult<()> {
        self.out.flush()
    }

    async fn shutdown(&self) -> ExporterResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.out.flush()
    }
}
