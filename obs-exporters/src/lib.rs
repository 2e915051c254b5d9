//! Exporter adapters and sinks used by the observability client.
//!
//! An [`ExporterAdapter`](adapter::ExporterAdapter) is a small, stateless
//! description of one destination. Calling
//! [`create`](adapter::ExporterAdapter::create) materialises a live
//! [`MetricReader`](traits::MetricReader); all delivery policy lives in the
//! reader. Log records flow through [`LogSink`](log_sink::LogSink)
//! implementations selected by [`LogOutput`](log_sink::LogOutput).

#![warn(missing_docs, clippy::pedantic)]

pub mod adapter;
pub mod console;
pub mod data;
pub mod datadog;
pub mod log_sink;
pub mod otlp;
pub mod prometheus;
pub mod push;
pub mod traits;

mod http_client;

pub use adapter::{
    ConsoleExporter, ConsoleTarget, CustomExporter, DatadogExporter, ExporterAdapter,
    OtlpExporter, PrometheusExporter,
};
pub use data::{
    DataPoint, HistogramValue, InstrumentKind, InstrumentationScope, MetricBatch, MetricStream,
    PointValue,
};
pub use datadog::DatadogEncoder;
pub use log_sink::{LogOutput, LogSink, MemoryLogSink, TracingSink, WriterSink};
pub use otlp::OtlpEncoder;
pub use push::{HttpPushReader, PayloadEncoder};
pub use traits::{
    Delivery, ExporterError, ExporterKind, ExporterResult, MetricProducer, MetricReader,
    MetricReaderFactory,
};
