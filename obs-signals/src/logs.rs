//! Logs signal manager and the structured logger handle.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use obs_config::{LogsConfig, SignalConfig};
use obs_exporters::{ExporterError, LogSink};
use obs_primitives::{
    AccessLogEntry, CorrelationContext, ErrorDetails, LogLevel, LogRecord, Resource, SignalKind,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{SignalError, SignalResult};
use crate::lifecycle::{Lifecycle, LifecycleEvent, SignalState};
use crate::manager::SignalManager;

/// Per-call correlation and attributes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogOptions {
    context: Option<CorrelationContext>,
    attributes: BTreeMap<String, Value>,
}

impl LogOptions {
    /// No context, no attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches correlation identifiers.
    #[must_use]
    pub fn with_context(mut self, context: CorrelationContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Adds one attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Adds several attributes.
    #[must_use]
    pub fn with_attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.attributes.extend(
            attributes
                .into_iter()
                .map(|(key, value)| (key.into(), value.into())),
        );
        self
    }
}

/// Leveled structured logger. Cheap to clone; clones share the sink and stop
/// writing together once the owning manager shuts down.
#[derive(Clone)]
pub struct Logger {
    level: LogLevel,
    base: Arc<BTreeMap<String, Value>>,
    sink: Arc<dyn LogSink>,
    dropped: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level)
            .field("base", &self.base)
            .field("sink", &self.sink)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Logger writing records at or above `level` to `sink`, with `base`
    /// merged under every record's attributes.
    #[must_use]
    pub fn new(level: LogLevel, base: BTreeMap<String, Value>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            level,
            base: Arc::new(base),
            sink,
            dropped: Arc::new(AtomicU64::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Minimum severity written.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }

    /// Whether a record at `level` would be written.
    #[must_use]
    pub fn is_level_enabled(&self, level: LogLevel) -> bool {
        self.level.admits(level)
    }

    /// Records refused since creation, by the sink or because the logger was
    /// closed.
    #[must_use]
    pub fn dropped_records(&self) -> u64 {
        self.dropped.load(Ordering::Acquire)
    }

    /// Whether the owning manager has shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops this logger and every clone of it from writing.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Logger sharing this sink with extra base attributes; `attributes` win
    /// over the inherited base.
    #[must_use]
    pub fn child<I, K, V>(&self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut base = (*self.base).clone();
        base.extend(
            attributes
                .into_iter()
                .map(|(key, value)| (key.into(), value.into())),
        );
        Self {
            base: Arc::new(base),
            ..self.clone()
        }
    }

    /// Writes a prepared record if its level passes the filter.
    pub fn log(&self, record: LogRecord) {
        if !self.is_level_enabled(record.level()) {
            return;
        }
        if self.is_closed() {
            self.dropped.fetch_add(1, Ordering::AcqRel);
            debug!(level = %record.level(), "log record dropped after shutdown");
            return;
        }
        let record = record.with_base_attributes(self.base.iter());
        if let Err(err) = self.sink.emit(&record) {
            self.dropped.fetch_add(1, Ordering::AcqRel);
            warn!(error = %err, level = %record.level(), "log record dropped");
        }
    }

    fn emit(&self, level: LogLevel, message: String, error: Option<ErrorDetails>, options: LogOptions) {
        if !self.is_level_enabled(level) {
            return;
        }
        let mut record = LogRecord::new(level, message).with_attributes(options.attributes);
        if let Some(context) = options.context {
            record = record.with_context(context);
        }
        if let Some(error) = error {
            record = record.with_error(error);
        }
        self.log(record);
    }

    /// Writes a `trace` record.
    pub fn trace(&self, message: impl Into<String>, options: LogOptions) {
        self.emit(LogLevel::Trace, message.into(), None, options);
    }

    /// Writes a `debug` record.
    pub fn debug(&self, message: impl Into<String>, options: LogOptions) {
        self.emit(LogLevel::Debug, message.into(), None, options);
    }

    /// Writes an `info` record.
    pub fn info(&self, message: impl Into<String>, options: LogOptions) {
        self.emit(LogLevel::Info, message.into(), None, options);
    }

    /// Writes a `warn` record.
    pub fn warn(&self, message: impl Into<String>, options: LogOptions) {
        self.emit(LogLevel::Warn, message.into(), None, options);
    }

    /// Writes an `error` record with the error chain, if any.
    pub fn error(
        &self,
        message: impl Into<String>,
        error: Option<&(dyn StdError + 'static)>,
        options: LogOptions,
    ) {
        self.emit(LogLevel::Error, message.into(), error.map(ErrorDetails::from_error), options);
    }

    /// Writes a `fatal` record with the error chain, if any.
    pub fn fatal(
        &self,
        message: impl Into<String>,
        error: Option<&(dyn StdError + 'static)>,
        options: LogOptions,
    ) {
        self.emit(LogLevel::Fatal, message.into(), error.map(ErrorDetails::from_error), options);
    }

    /// Writes `payload` as attributes. Objects are flattened; any other value
    /// is stored under `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::LogSink`] if the payload cannot be serialized.
    pub fn structured<T: Serialize + ?Sized>(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        payload: &T,
    ) -> SignalResult<()> {
        if !self.is_level_enabled(level) {
            return Ok(());
        }
        let value = serde_json::to_value(payload)
            .map_err(|err| SignalError::LogSink(ExporterError::from(err)))?;
        let record = match value {
            Value::Object(fields) => LogRecord::new(level, message).with_attributes(fields),
            other => LogRecord::new(level, message).with_attribute("payload", other),
        };
        self.log(record);
        Ok(())
    }

    /// Writes a proxy access log entry. Server errors log at `error`.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::LogSink`] if the entry cannot be serialized.
    pub fn access(&self, entry: &AccessLogEntry) -> SignalResult<()> {
        let message = format!(
            "{} {} {}",
            entry.method, entry.original_url, entry.status_code
        );
        self.structured(entry.severity(), message, entry)
    }

    /// Flushes the sink.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::LogSink`] on failure.
    pub fn flush(&self) -> SignalResult<()> {
        self.sink.flush().map_err(SignalError::LogSink)
    }
}

/// Owns the structured logger.
#[derive(Debug)]
pub struct LogsManager {
    config: LogsConfig,
    resource: Resource,
    lifecycle: Mutex<Lifecycle>,
    logger: Option<Logger>,
}

impl LogsManager {
    /// Manager for `config`; nothing is created until [`SignalManager::init`].
    #[must_use]
    pub fn new(config: LogsConfig, resource: Resource) -> Self {
        Self {
            config,
            resource,
            lifecycle: Mutex::new(Lifecycle::new(SignalKind::Logs)),
            logger: None,
        }
    }

    /// Configuration the manager was built from.
    #[must_use]
    pub fn config(&self) -> &LogsConfig {
        &self.config
    }

    /// Live logger handle.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::NotInitialized`] before `init`.
    pub fn logger(&self) -> SignalResult<Logger> {
        self.logger.clone().ok_or(SignalError::NotInitialized {
            signal: SignalKind::Logs,
        })
    }

    /// Flushes the sink, if initialized.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::LogSink`] on failure.
    pub fn force_flush(&self) -> SignalResult<()> {
        self.logger.as_ref().map_or(Ok(()), Logger::flush)
    }

    /// Shuts the manager down without an async context: closes every logger
    /// handed out and flushes the sink. [`SignalManager::shutdown`] runs this.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::LogSink`] if the final flush fails.
    pub fn close(&self) -> SignalResult<()> {
        let previous = {
            let mut lifecycle = self.lifecycle.lock();
            let previous = lifecycle.state();
            lifecycle.transition(LifecycleEvent::Shutdown)?;
            previous
        };
        if previous != SignalState::Initialized {
            return Ok(());
        }
        if let Some(logger) = &self.logger {
            logger.close();
        }
        self.force_flush()
    }
}

#[async_trait]
impl SignalManager for LogsManager {
    fn signal(&self) -> SignalKind {
        SignalKind::Logs
    }

    fn resource(&self) -> &Resource {
        &self.resource
    }

    fn state(&self) -> SignalState {
        self.lifecycle.lock().state()
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled()
    }

    fn init(&mut self) -> SignalResult<()> {
        if self.lifecycle.get_mut().state().is_ready() {
            return Ok(());
        }
        self.lifecycle.get_mut().check(LifecycleEvent::Init)?;
        self.config.validate()?;

        let base = self
            .config
            .default_attributes
            .iter()
            .map(|(key, value)| (key.clone(), Value::from(value.as_str())))
            .collect();
        self.logger = Some(Logger::new(self.config.level, base, self.config.output.create()));
        self.lifecycle.get_mut().transition(LifecycleEvent::Init)?;
        Ok(())
    }

    async fn shutdown(&self) -> SignalResult<()> {
        self.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obs_config::LoggerConfigBuilder;
    use obs_exporters::{LogOutput, MemoryLogSink};

    fn manager(level: LogLevel, memory: &MemoryLogSink) -> LogsManager {
        let config = LoggerConfigBuilder::new()
            .level(level)
            .default_attributes([("service", "payments"), ("region", "eu-west-1")])
            .output(LogOutput::Memory(memory.clone()))
            .build()
            .unwrap();
        let mut manager = LogsManager::new(config, Resource::empty());
        manager.init().unwrap();
        manager
    }

    #[derive(Debug, thiserror::Error)]
    #[error("card declined")]
    struct Declined;

    #[test]
    fn filters_below_level() {
        let memory = MemoryLogSink::new();
        let logger = manager(LogLevel::Warn, &memory).logger().unwrap();

        logger.debug("skipped", LogOptions::new());
        logger.info("skipped", LogOptions::new());
        logger.warn("kept", LogOptions::new());
        logger.fatal("kept", None, LogOptions::new());

        assert_eq!(memory.len(), 2);
        assert!(!logger.is_level_enabled(LogLevel::Info));
    }

    #[test]
    fn call_attributes_win_over_defaults() {
        let memory = MemoryLogSink::new();
        let logger = manager(LogLevel::Info, &memory).logger().unwrap();

        logger.info(
            "charged",
            LogOptions::new()
                .with_attribute("region", "us-east-1")
                .with_attribute("amount", 42)
                .with_context(CorrelationContext::for_trace("abc")),
        );

        let record = &memory.records()[0];
        assert_eq!(record.attribute("service"), Some(&Value::from("payments")));
        assert_eq!(record.attribute("region"), Some(&Value::from("us-east-1")));
        assert_eq!(record.attribute("amount"), Some(&Value::from(42)));
        assert_eq!(
            record.context().and_then(|c| c.trace_id.as_deref()),
            Some("abc")
        );
    }

    #[test]
    fn error_records_carry_details() {
        let memory = MemoryLogSink::new();
        let logger = manager(LogLevel::Info, &memory).logger().unwrap();

        logger.error("payment failed", Some(&Declined), LogOptions::new());

        let record = &memory.records()[0];
        assert_eq!(record.level(), LogLevel::Error);
        assert_eq!(record.error().map(|e| e.message.as_str()), Some("card declined"));
    }

    #[test]
    fn child_loggers_extend_the_base() {
        let memory = MemoryLogSink::new();
        let logger = manager(LogLevel::Info, &memory).logger().unwrap();
        let child = logger.child([("request_id", "r-1"), ("service", "refunds")]);

        child.info("refund", LogOptions::new());

        let record = &memory.records()[0];
        assert_eq!(record.attribute("request_id"), Some(&Value::from("r-1")));
        assert_eq!(record.attribute("service"), Some(&Value::from("refunds")));
        assert_eq!(record.attribute("region"), Some(&Value::from("eu-west-1")));
    }

    #[test]
    fn access_entries_log_by_status() {
        let memory = MemoryLogSink::new();
        let logger = manager(LogLevel::Info, &memory).logger().unwrap();

        let ok = AccessLogEntry::start("GET", "/api/orders").finish(200, Some("application/json"), 512);
        let failed = AccessLogEntry::start("POST", "/api/orders").finish(502, None, 0);
        logger.access(&ok).unwrap();
        logger.access(&failed).unwrap();

        let records = memory.records();
        assert_eq!(records[0].level(), LogLevel::Info);
        assert_eq!(records[0].attribute("statusCode"), Some(&Value::from(200)));
        assert_eq!(records[1].level(), LogLevel::Error);
        assert_eq!(records[1].message(), "POST /api/orders 502");
    }

    #[test]
    fn structured_scalars_are_wrapped() {
        let memory = MemoryLogSink::new();
        let logger = manager(LogLevel::Info, &memory).logger().unwrap();
        logger.structured(LogLevel::Info, "count", &3).unwrap();
        assert_eq!(memory.records()[0].attribute("payload"), Some(&Value::from(3)));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_final() {
        let memory = MemoryLogSink::new();
        let mut manager = manager(LogLevel::Info, &memory);
        manager.shutdown().await.unwrap();
        manager.shutdown().await.unwrap();
        assert!(manager.state().is_terminal());
        assert!(matches!(manager.init(), Err(SignalError::Lifecycle(_))));
    }

    #[tokio::test]
    async fn loggers_stop_writing_after_shutdown() {
        let memory = MemoryLogSink::new();
        let manager = manager(LogLevel::Info, &memory);
        let logger = manager.logger().unwrap();
        let child = logger.child([("request_id", "r-9")]);
        logger.info("before", LogOptions::new());

        manager.shutdown().await.unwrap();
        logger.info("after", LogOptions::new());
        child.error("after", None, LogOptions::new());
        logger.structured(LogLevel::Warn, "after", &3).unwrap();

        assert_eq!(memory.len(), 1);
        assert_eq!(memory.records()[0].message(), "before");
        assert!(logger.is_closed() && child.is_closed());
        assert_eq!(logger.dropped_records(), 3);
    }
}
