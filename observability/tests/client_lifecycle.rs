mod common;

use std::time::Duration;

use common::{Recorder, recording_factory};
use observability::config::{ConfigError, MetricsConfig};
use observability::exporters::{
    ExporterAdapter, ExporterError, ExporterKind, ExporterResult, MetricReader,
};
use observability::{
    HealthStatus, LogLevel, LogOptions, LogOutput, MemoryLogSink, ObservabilityClient, ObservabilityConfig,
    ObservabilityError, SignalKind, SignalManager, SignalState,
};

fn memory_logs(memory: &MemoryLogSink) -> LogOutput {
    LogOutput::Memory(memory.clone())
}

#[test]
fn missing_service_name_fails_before_any_manager() {
    let recorder = std::sync::Arc::new(Recorder::default());
    let memory = MemoryLogSink::new();

    for name in [None, Some(""), Some("   ")] {
        let mut builder = ObservabilityClient::builder()
            .with_metrics(|metrics| metrics.add_exporter(ExporterAdapter::custom("recorder", recording_factory("recorder", &recorder))))
            .with_logger(|logs| logs.output(memory_logs(&memory)));
        if let Some(name) = name {
            builder = builder.service_name(name);
        }

        let err = builder.build().expect_err("service name is required");
        assert!(matches!(err, ObservabilityError::Config(ConfigError::MissingServiceName)));
    }
    assert_eq!(Recorder::count(&recorder.created), 0);
}

#[test]
fn enabled_metrics_without_exporters_never_yield_a_client() {
    let mut config = ObservabilityConfig::new("svc");
    config.metrics = Some(MetricsConfig::default());

    let err = ObservabilityClient::new(config).expect_err("no exporters");
    assert!(matches!(err, ObservabilityError::Config(ConfigError::NoExporters)));
}

#[test]
fn duplicate_exporter_kinds_yield_one_sink() {
    let recorder = std::sync::Arc::new(Recorder::default());
    let client = ObservabilityClient::builder()
        .service_name("svc")
        .with_metrics(|metrics| {
            metrics
                .add_exporter(ExporterAdapter::custom("recorder", recording_factory("recorder", &recorder)))
                .add_exporter(ExporterAdapter::custom("recorder", recording_factory("recorder", &recorder)))
                .add_console_exporter()
                .add_console_exporter()
        })
        .build()
        .unwrap();

    assert_eq!(Recorder::count(&recorder.created), 1);
    assert_eq!(
        client.metrics().unwrap().reader_kinds(),
        vec![ExporterKind::Custom("recorder".into()), ExporterKind::Console]
    );
}

#[test]
fn global_attributes_replace_earlier_calls() {
    let client = ObservabilityClient::builder()
        .service_name("svc")
        .with_global_attributes([("team", "core"), ("tier", "gold")])
        .with_global_attributes([("region", "eu-west-1")])
        .build()
        .unwrap();

    let resource = client.resource();
    assert_eq!(resource.get("region"), Some("eu-west-1"));
    assert_eq!(resource.get("team"), None);
    assert_eq!(resource.get("tier"), None);
    assert_eq!(resource.service_name(), Some("svc"));
}

#[test]
fn both_signals_enabled() {
    let memory = MemoryLogSink::new();
    let client = ObservabilityClient::builder()
        .service_name("svc")
        .with_metrics(|metrics| metrics.add_console_exporter())
        .with_logger(|logs| logs.level(LogLevel::Info).output(memory_logs(&memory)))
        .build()
        .unwrap();

    assert!(client.metrics().is_ok());
    assert!(client.logger().is_ok());
    assert!(client.is_enabled(SignalKind::Metrics));
    assert!(client.is_enabled(SignalKind::Logs));
    assert!(client.managers().iter().all(|manager| manager.is_enabled()));
    assert!(client
        .managers()
        .iter()
        .all(|manager| manager.state() == SignalState::Initialized));
}

#[test]
fn disabled_metrics_are_not_accessible() {
    let memory = MemoryLogSink::new();
    let client = ObservabilityClient::builder()
        .service_name("svc")
        .with_metrics(|metrics| metrics.enabled(false).add_console_exporter())
        .with_logger(|logs| logs.output(memory_logs(&memory)))
        .build()
        .unwrap();

    let err = client.metrics().expect_err("metrics are disabled");
    assert!(matches!(
        err,
        ObservabilityError::SignalNotEnabled {
            signal: SignalKind::Metrics
        }
    ));
    assert!(client.meter().is_err());
    assert!(client.logger().is_ok());
    assert!(!client.is_enabled(SignalKind::Metrics));
}

#[tokio::test]
async fn one_failing_manager_does_not_block_the_other() {
    let recorder = Recorder::failing();
    let memory = MemoryLogSink::new();
    let client = ObservabilityClient::builder()
        .service_name("svc")
        .with_metrics(|metrics| metrics.add_exporter(ExporterAdapter::custom("flaky", recording_factory("flaky", &recorder))))
        .with_logger(|logs| logs.output(memory_logs(&memory)))
        .build()
        .unwrap();

    let err = client.shutdown().await.expect_err("metrics shutdown fails");
    let ObservabilityError::Shutdown(failures) = err else {
        panic!("expected aggregated shutdown failure, got {err:?}");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures.signals(), vec![SignalKind::Metrics]);
    assert_eq!(Recorder::count(&recorder.shutdowns), 1);
    assert!(client.logs_manager().unwrap().state().is_terminal());
    assert!(client.metrics_manager().unwrap().state().is_terminal());

    client.shutdown().await.expect("second shutdown is a no-op");
    assert_eq!(Recorder::count(&recorder.shutdowns), 1);
}

#[tokio::test]
async fn shutdown_pushes_final_batch() {
    let recorder = std::sync::Arc::new(Recorder::default());
    let client = ObservabilityClient::builder()
        .service_name("svc")
        .version("2.1.0")
        .with_metrics(|metrics| {
            metrics
                .export_interval(Duration::from_secs(3600))
                .default_attributes([("env", "test")])
                .add_exporter(ExporterAdapter::custom("recorder", recording_factory("recorder", &recorder)))
        })
        .build()
        .unwrap();

    let meter = client.meter().unwrap();
    assert_eq!(meter.scope().version.as_deref(), Some("2.1.0"));
    meter
        .counter("orders.created", Default::default())
        .unwrap()
        .increment(3.0, &[("channel", "web")]);

    client.shutdown().await.unwrap();

    let batch = recorder.last_batch.lock().clone().expect("final export");
    let stream = batch.find("orders.created").expect("counter exported");
    assert_eq!(stream.points[0].labels["env"], "test");
    assert_eq!(stream.points[0].labels["channel"], "web");
    assert_eq!(batch.resource.get("service.version"), Some("2.1.0"));
}

#[tokio::test]
async fn health_follows_lifecycle() {
    let memory = MemoryLogSink::new();
    let client = ObservabilityClient::builder()
        .service_name("svc")
        .with_logger(|logs| logs.output(memory_logs(&memory)))
        .build()
        .unwrap();

    let report = client.health();
    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(
        report.signal(SignalKind::Logs).map(|health| health.state),
        Some(SignalState::Initialized)
    );

    client.shutdown().await.unwrap();
    assert_eq!(client.health().status, HealthStatus::Unhealthy);
}

#[tokio::test(start_paused = true)]
async fn managers_and_readers_shut_down_concurrently() {
    let delay = Duration::from_millis(200);
    let first = Recorder::slow(delay);
    let second = Recorder::slow(delay);
    let memory = MemoryLogSink::new();
    let client = ObservabilityClient::builder()
        .service_name("svc")
        .with_metrics(|metrics| {
            metrics
                .add_exporter(ExporterAdapter::custom("first", recording_factory("first", &first)))
                .add_exporter(ExporterAdapter::custom("second", recording_factory("second", &second)))
        })
        .with_logger(|logs| logs.output(memory_logs(&memory)))
        .build()
        .unwrap();

    let started = tokio::time::Instant::now();
    client.shutdown().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(Recorder::count(&first.shutdowns), 1);
    assert_eq!(Recorder::count(&second.shutdowns), 1);
    assert_eq!(memory.flush_count(), 1);
    assert!(elapsed >= delay, "shutdown returned before readers finished: {elapsed:?}");
    assert!(elapsed < delay * 2, "readers shut down one after another: {elapsed:?}");
}

#[test]
fn failed_metrics_init_shuts_initialized_logs_down() {
    let memory = MemoryLogSink::new();
    let broken = || -> ExporterResult<Box<dyn MetricReader>> {
        Err(ExporterError::configuration("collector url missing"))
    };

    let err = ObservabilityClient::builder()
        .service_name("svc")
        .with_logger(|logs| logs.output(memory_logs(&memory)))
        .with_metrics(|metrics| metrics.add_exporter(ExporterAdapter::custom("broken", broken)))
        .build()
        .expect_err("metrics exporter cannot be created");

    assert!(matches!(
        err,
        ObservabilityError::Signal {
            signal: SignalKind::Metrics,
            ..
        }
    ));
    assert_eq!(memory.flush_count(), 1);
}

#[tokio::test]
async fn loggers_handed_out_stop_at_client_shutdown() {
    let memory = MemoryLogSink::new();
    let client = ObservabilityClient::builder()
        .service_name("svc")
        .with_logger(|logs| logs.output(memory_logs(&memory)))
        .build()
        .unwrap();
    let logger = client.logger().unwrap();
    logger.info("accepted", LogOptions::new());

    client.shutdown().await.unwrap();
    logger.info("after shutdown", LogOptions::new());

    assert_eq!(memory.len(), 1);
    assert_eq!(logger.dropped_records(), 1);
    assert_eq!(client.health().signals[0].dropped_records, 1);
}
