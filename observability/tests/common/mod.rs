#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use observability::exporters::{
    Delivery, ExporterError, ExporterKind, ExporterResult, MetricBatch, MetricReader,
    MetricReaderFactory,
};
use parking_lot::Mutex;

/// Counts reader creations and shutdowns; optionally fails on shutdown.
#[derive(Debug, Default)]
pub struct Recorder {
    pub created: AtomicUsize,
    pub exports: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub fail_shutdown: bool,
    pub shutdown_delay: Duration,
    pub last_batch: Mutex<Option<MetricBatch>>,
}

impl Recorder {
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_shutdown: true,
            ..Self::default()
        })
    }

    pub fn slow(shutdown_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            shutdown_delay,
            ..Self::default()
        })
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct RecordingReader {
    name: String,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl MetricReader for RecordingReader {
    fn kind(&self) -> ExporterKind {
        ExporterKind::Custom(self.name.clone())
    }

    fn delivery(&self) -> Delivery {
        Delivery::Push
    }

    async fn export(&self, batch: &MetricBatch) -> ExporterResult<()> {
        self.recorder.exports.fetch_add(1, Ordering::SeqCst);
        *self.recorder.last_batch.lock() = Some(batch.clone());
        Ok(())
    }

    async fn shutdown(&self) -> ExporterResult<()> {
        if !self.recorder.shutdown_delay.is_zero() {
            tokio::time::sleep(self.recorder.shutdown_delay).await;
        }
        self.recorder.shutdowns.fetch_add(1, Ordering::SeqCst);
        if self.recorder.fail_shutdown {
            return Err(ExporterError::transport("collector unreachable"));
        }
        Ok(())
    }
}

/// Factory producing [`RecordingReader`]s bound to one recorder.
pub struct RecordingFactory {
    pub name: String,
    pub recorder: Arc<Recorder>,
}

impl MetricReaderFactory for RecordingFactory {
    fn create(&self) -> ExporterResult<Box<dyn MetricReader>> {
        self.recorder.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingReader {
            name: self.name.clone(),
            recorder: Arc::clone(&self.recorder),
        }))
    }
}

pub fn recording_factory(name: &str, recorder: &Arc<Recorder>) -> RecordingFactory {
    RecordingFactory {
        name: name.to_owned(),
        recorder: Arc::clone(recorder),
    }
}
