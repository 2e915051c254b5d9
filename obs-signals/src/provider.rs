//! Meter provider: instrument registry, readers and the periodic export task.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use obs_exporters::{
    Delivery, ExporterError, ExporterKind, InstrumentKind, InstrumentationScope, MetricBatch,
    MetricProducer, MetricReader,
};
use obs_primitives::{Attributes, Resource};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::{SignalError, SignalResult};
use crate::instruments::{
    Counter, DEFAULT_HISTOGRAM_BUCKETS, Gauge, Histogram, InstrumentCell, MetricOptions,
    validate_buckets, validate_instrument_name,
};

const MIN_EXPORT_INTERVAL: Duration = Duration::from_millis(10);

type Failures = Vec<(ExporterKind, ExporterError)>;

/// Instruments of one provider, keyed by name and kind.
#[derive(Debug)]
struct Registry {
    resource: Resource,
    started_at: DateTime<Utc>,
    instruments: Mutex<Vec<Arc<InstrumentCell>>>,
}

impl Registry {
    fn instrument(
        &self,
        name: &str,
        kind: InstrumentKind,
        create: impl FnOnce() -> InstrumentCell,
    ) -> SignalResult<Arc<InstrumentCell>> {
        let mut instruments = self.instruments.lock();
        if let Some(existing) = instruments.iter().find(|cell| cell.name() == name) {
            if existing.kind() != kind {
                return Err(SignalError::invalid_instrument(
                    name,
                    format!(
                        "already registered as a {}, requested a {}",
                        existing.kind().as_str(),
                        kind.as_str()
                    ),
                ));
            }
            return Ok(Arc::clone(existing));
        }
        let cell = Arc::new(create());
        instruments.push(Arc::clone(&cell));
        Ok(cell)
    }
}

impl MetricProducer for Registry {
    fn produce(&self) -> MetricBatch {
        let metrics = self
            .instruments
            .lock()
            .iter()
            .map(|cell| cell.snapshot())
            .collect();
        MetricBatch::new(self.resource.clone(), metrics).with_start_time(self.started_at)
    }
}

#[derive(Debug, Default)]
struct ExportStats {
    failures: AtomicU64,
    degraded: AtomicBool,
}

struct ExportTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Entry point for creating meters. Owns the readers attached to it.
pub struct MeterProvider {
    registry: Arc<Registry>,
    default_labels: Arc<Attributes>,
    readers: Arc<Vec<Box<dyn MetricReader>>>,
    stats: Arc<ExportStats>,
    task: Mutex<Option<ExportTask>>,
    closed: AtomicBool,
}

impl fmt::Debug for MeterProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterProvider")
            .field("resource", &self.registry.resource)
            .field("readers", &self.reader_kinds())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl MeterProvider {
    /// Attaches `readers` and, when a tokio runtime is available and any reader
    /// is push-based, starts exporting every `interval`.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Exporter`] if a reader refuses to attach.
    pub fn new(
        resource: Resource,
        default_labels: Attributes,
        readers: Vec<Box<dyn MetricReader>>,
        interval: Duration,
    ) -> SignalResult<Self> {
        let registry = Arc::new(Registry {
            resource,
            started_at: Utc::now(),
            instruments: Mutex::new(Vec::new()),
        });
        for reader in &readers {
            let producer: Arc<dyn MetricProducer> = Arc::clone(&registry) as Arc<dyn MetricProducer>;
            reader
                .attach(producer)
                .map_err(|source| SignalError::Exporter {
                    kind: reader.kind(),
                    source,
                })?;
        }

        let provider = Self {
            registry,
            default_labels: Arc::new(default_labels),
            readers: Arc::new(readers),
            stats: Arc::new(ExportStats::default()),
            task: Mutex::new(None),
            closed: AtomicBool::new(false),
        };
        provider.start_export_task(interval.max(MIN_EXPORT_INTERVAL));
        Ok(provider)
    }

    fn start_export_task(&self, interval: Duration) {
        if !self
            .readers
            .iter()
            .any(|reader| reader.delivery() == Delivery::Push)
        {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no tokio runtime; push exporters only receive data on flush and shutdown");
            return;
        };

        let registry = Arc::clone(&self.registry);
        let readers = Arc::clone(&self.readers);
        let stats = Arc::clone(&self.stats);
        let (stop, mut stopped) = oneshot::channel();
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        export_once(&registry, &readers, &stats).await;
                    }
                    _ = &mut stopped => break,
                }
            }
        });
        debug!(?interval, "periodic metric export started");
        *self.task.lock() = Some(ExportTask { stop, handle });
    }

    /// Returns a meter for the given instrumentation scope.
    #[must_use]
    pub fn meter(&self, name: impl Into<String>, version: Option<String>) -> Meter {
        Meter {
            scope: InstrumentationScope::new(name, version),
            registry: Arc::clone(&self.registry),
            default_labels: Arc::clone(&self.default_labels),
        }
    }

    /// Resource attached to every batch.
    #[must_use]
    pub fn resource(&self) -> &Resource {
        &self.registry.resource
    }

    /// Current state of every instrument.
    #[must_use]
    pub fn collect(&self) -> MetricBatch {
        self.registry.produce()
    }

    /// Kinds of the attached readers, in registration order.
    #[must_use]
    pub fn reader_kinds(&self) -> Vec<ExporterKind> {
        self.readers.iter().map(|reader| reader.kind()).collect()
    }

    /// Total failed push exports since creation.
    #[must_use]
    pub fn export_failures(&self) -> u64 {
        self.stats.failures.load(Ordering::Acquire)
    }

    /// Whether the latest push export had a failure.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.stats.degraded.load(Ordering::Acquire)
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Pushes the current state to every push reader and flushes all readers.
    ///
    /// # Errors
    ///
    /// Returns the collected reader failures.
    pub async fn force_flush(&self) -> SignalResult<()> {
        if self.is_shutdown() {
            return Ok(());
        }
        let mut failures = export_once(&self.registry, &self.readers, &self.stats).await;
        failures.extend(
            join_all(self.readers.iter().map(|reader| async move {
                (reader.kind(), reader.force_flush().await)
            }))
            .await
            .into_iter()
            .filter_map(|(kind, result)| result.err().map(|err| (kind, err))),
        );
        SignalError::from_failures(failures).map_or(Ok(()), Err)
    }

    /// Stops the export task, performs a final export and shuts every reader
    /// down. Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns the collected reader failures; every reader is shut down
    /// regardless.
    pub async fn shutdown(&self) -> SignalResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let task = self.task.lock().take();
        if let Some(ExportTask { stop, handle }) = task {
            let _ = stop.send(());
            if let Err(err) = handle.await {
                warn!(error = %err, "metric export task ended abnormally");
            }
        }

        let mut failures = export_once(&self.registry, &self.readers, &self.stats).await;
        failures.extend(
            join_all(self.readers.iter().map(|reader| async move {
                (reader.kind(), reader.shutdown().await)
            }))
            .await
            .into_iter()
            .filter_map(|(kind, result)| result.err().map(|err| (kind, err))),
        );
        debug!(failures = failures.len(), "meter provider shut down");
        SignalError::from_failures(failures).map_or(Ok(()), Err)
    }
}

impl Drop for MeterProvider {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.handle.abort();
        }
    }
}

async fn export_once(
    registry: &Registry,
    readers: &[Box<dyn MetricReader>],
    stats: &ExportStats,
) -> Failures {
    let push: Vec<_> = readers
        .iter()
        .filter(|reader| reader.delivery() == Delivery::Push)
        .collect();
    if push.is_empty() {
        return Vec::new();
    }
    let batch = registry.produce();
    let failures: Failures = join_all(push.into_iter().map(|reader| {
        let batch = &batch;
        async move { (reader.kind(), reader.export(batch).await) }
    }))
    .await
    .into_iter()
    .filter_map(|(kind, result)| result.err().map(|err| (kind, err)))
    .collect();

    for (kind, err) in &failures {
        warn!(exporter = %kind, error = %err, "metric export failed");
    }
    stats
        .failures
        .fetch_add(failures.len() as u64, Ordering::AcqRel);
    stats.degraded.store(!failures.is_empty(), Ordering::Release);
    failures
}

/// Creates instruments within one instrumentation scope.
#[derive(Clone, Debug)]
pub struct Meter {
    scope: InstrumentationScope,
    registry: Arc<Registry>,
    default_labels: Arc<Attributes>,
}

impl Meter {
    /// Instrumentation scope of this meter.
    #[must_use]
    pub fn scope(&self) -> &InstrumentationScope {
        &self.scope
    }

    /// Returns the counter named `name`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::InvalidInstrument`] for an invalid name.
    pub fn counter(&self, name: &str, options: MetricOptions) -> SignalResult<Counter> {
        let cell = self.cell(name, InstrumentKind::Counter, &options, Vec::new())?;
        Ok(Counter::new(cell, &self.default_labels, &options))
    }

    /// Returns the gauge named `name`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::InvalidInstrument`] for an invalid name.
    pub fn gauge(&self, name: &str, options: MetricOptions) -> SignalResult<Gauge> {
        let cell = self.cell(name, InstrumentKind::Gauge, &options, Vec::new())?;
        Ok(Gauge::new(cell, &self.default_labels, &options))
    }

    /// Returns the histogram named `name`, creating it on first use with the
    /// given bucket bounds (or the defaults). An existing histogram keeps its
    /// original bounds.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::InvalidInstrument`] for an invalid name or
    /// bounds that are not finite and strictly ascending.
    pub fn histogram(
        &self,
        name: &str,
        buckets: Option<Vec<f64>>,
        options: MetricOptions,
    ) -> SignalResult<Histogram> {
        let bounds = buckets.unwrap_or_else(|| DEFAULT_HISTOGRAM_BUCKETS.to_vec());
        validate_buckets(name, &bounds)?;
        let cell = self.cell(name, InstrumentKind::Histogram, &options, bounds)?;
        Ok(Histogram::new(cell, &self.default_labels, &options))
    }

    fn cell(
        &self,
        name: &str,
        kind: InstrumentKind,
        options: &MetricOptions,
        bounds: Vec<f64>,
    ) -> SignalResult<Arc<InstrumentCell>> {
        validate_instrument_name(name)?;
        self.registry.instrument(name, kind, || {
            InstrumentCell::new(name, kind, self.scope.clone(), options, bounds)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use obs_exporters::{ExporterResult, PointValue};
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Default)]
    struct Recording {
        exports: AtomicUsize,
        shutdowns: AtomicUsize,
        fail_shutdown: bool,
        last: Mutex<Option<MetricBatch>>,
    }

    #[derive(Debug)]
    struct RecordingReader(Arc<Recording>);

    #[async_trait]
    impl MetricReader for RecordingReader {
        fn kind(&self) -> ExporterKind {
            ExporterKind::Custom("recording".into())
        }

        fn delivery(&self) -> Delivery {
            Delivery::Push
        }

        async fn export(&self, batch: &MetricBatch) -> ExporterResult<()> {
            self.0.exports.fetch_add(1, Ordering::SeqCst);
            *self.0.last.lock() = Some(batch.clone());
            Ok(())
        }

        async fn shutdown(&self) -> ExporterResult<()> {
            self.0.shutdowns.fetch_add(1, Ordering::SeqCst);
            if self.0.fail_shutdown {
                return Err(ExporterError::transport("connection refused"));
            }
            Ok(())
        }
    }

    fn provider(recording: &Arc<Recording>, interval: Duration) -> MeterProvider {
        MeterProvider::new(
            Resource::new([("service.name", "svc")]),
            [("env".to_owned(), "test".to_owned())].into(),
            vec![Box::new(RecordingReader(Arc::clone(recording)))],
            interval,
        )
        .unwrap()
    }

    #[test]
    fn instruments_are_shared_by_name() {
        let recording = Arc::new(Recording::default());
        let provider = provider(&recording, Duration::from_secs(60));
        let meter = provider.meter("payments", None);

        let first = meter.counter("payments.processed", MetricOptions::new()).unwrap();
        let second = provider
            .meter("other", Some("1.0".into()))
            .counter("payments.processed", MetricOptions::new())
            .unwrap();
        first.inc(&[]);
        second.inc(&[]);

        assert!((first.current_value() - 2.0).abs() < f64::EPSILON);
        assert_eq!(provider.collect().metrics.len(), 1);
        assert!(meter.counter("bad name", MetricOptions::new()).is_err());
    }

    #[test]
    fn a_name_keeps_its_first_kind() {
        let recording = Arc::new(Recording::default());
        let provider = provider(&recording, Duration::from_secs(60));
        let meter = provider.meter("svc", None);
        meter.counter("queue.depth", MetricOptions::new()).unwrap();

        let err = meter.gauge("queue.depth", MetricOptions::new()).unwrap_err();
        assert!(matches!(err, SignalError::InvalidInstrument { ref name, .. } if name == "queue.depth"));
        assert!(meter.histogram("queue.depth", None, MetricOptions::new()).is_err());
        assert_eq!(provider.collect().metrics.len(), 1);
    }

    #[test]
    fn default_labels_apply_to_every_point() {
        let recording = Arc::new(Recording::default());
        let provider = provider(&recording, Duration::from_secs(60));
        let gauge = provider
            .meter("svc", None)
            .gauge("queue.depth", MetricOptions::new())
            .unwrap();
        gauge.set(7.0, &[("queue", "payments")]);

        let batch = provider.collect();
        let point = &batch.find("queue.depth").unwrap().points[0];
        assert_eq!(point.labels["env"], "test");
        assert_eq!(point.labels["queue"], "payments");
        assert_eq!(point.value, PointValue::Gauge(7.0));
    }

    #[tokio::test]
    async fn shutdown_exports_and_is_idempotent() {
        let recording = Arc::new(Recording::default());
        let provider = provider(&recording, Duration::from_secs(60));
        provider
            .meter("svc", None)
            .counter("jobs", MetricOptions::new())
            .unwrap()
            .inc(&[]);

        provider.shutdown().await.unwrap();
        provider.shutdown().await.unwrap();

        assert_eq!(recording.exports.load(Ordering::SeqCst), 1);
        assert_eq!(recording.shutdowns.load(Ordering::SeqCst), 1);
        assert!(recording.last.lock().as_ref().unwrap().find("jobs").is_some());
    }

    #[tokio::test]
    async fn shutdown_reports_reader_failures() {
        let recording = Arc::new(Recording {
            fail_shutdown: true,
            ..Recording::default()
        });
        let provider = provider(&recording, Duration::from_secs(60));

        let err = provider.shutdown().await.unwrap_err();
        assert!(matches!(err, SignalError::Exporter { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_task_pushes_on_interval() {
        let recording = Arc::new(Recording::default());
        let provider = provider(&recording, Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(recording.exports.load(Ordering::SeqCst), 2);
        assert!(!provider.is_degraded());
        provider.shutdown().await.unwrap();
    }
}
