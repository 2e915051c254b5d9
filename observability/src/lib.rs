//! Configuration-driven observability client.
//!
//! Build an [`ObservabilityClient`] with [`ObservabilityClient::builder`],
//! enable metrics and logs through the nested sub-builders, then read the
//! [`metrics`](ObservabilityClient::metrics) and
//! [`logger`](ObservabilityClient::logger) handles. Every enabled signal is
//! ready once construction succeeds; [`shutdown`](ObservabilityClient::shutdown)
//! flushes exporters and releases their resources.
//!
//! ```no_run
//! use observability::{LogOptions, MetricOptions, ObservabilityClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ObservabilityClient::builder()
//!     .service_name("payments")
//!     .environment("production")
//!     .with_metrics(|metrics| metrics.add_console_exporter())
//!     .with_logger(|logs| logs)
//!     .build()?;
//!
//! let processed = client
//!     .meter()?
//!     .counter("payments.processed", MetricOptions::new())?;
//! processed.inc(&[("method", "card")]);
//! client.logger()?.info("payment accepted", LogOptions::new());
//! client.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, clippy::pedantic)]

mod builder;
mod client;
mod error;
mod health;

pub use builder::ObservabilityClientBuilder;
pub use client::ObservabilityClient;
pub use error::{ObservabilityError, ObservabilityResult, ShutdownFailures};
pub use health::{HealthReport, HealthStatus, SignalHealth};

/// Configuration schema and sub-builders.
pub use obs_config as config;
/// Exporter adapters, readers and log sinks.
pub use obs_exporters as exporters;
/// Shared primitives.
pub use obs_primitives as primitives;
/// Signal managers and instruments.
pub use obs_signals as signals;

pub use obs_config::{LoggerConfigBuilder, MetricsConfigBuilder, ObservabilityConfig};
pub use obs_exporters::{
    ConsoleExporter, DatadogExporter, ExporterAdapter, LogOutput, MemoryLogSink, OtlpExporter,
    PrometheusExporter,
};
pub use obs_primitives::{
    AccessLogEntry, CorrelationContext, ErrorDetails, LogLevel, LogRecord, Resource, SignalKind,
};
pub use obs_signals::{
    Counter, Gauge, Histogram, LogOptions, Logger, Meter, MeterProvider, MetricOptions,
    SignalError, SignalManager, SignalState,
};
