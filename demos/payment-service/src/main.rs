//! Simulated payment service wired to the observability client.
//!
//! Serves Prometheus metrics, optionally pushes to an OTLP collector, and
//! writes structured JSON logs to stdout. Library diagnostics go to stderr
//! through `tracing-subscriber`.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use observability::{
    AccessLogEntry, CorrelationContext, ErrorDetails, LogOptions, LogOutput, Logger,
    MetricOptions, ObservabilityClient, OtlpExporter, PrometheusExporter,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Simulated payment service emitting metrics and logs")]
struct Args {
    /// Port for the Prometheus scrape endpoint.
    #[arg(long, default_value_t = 9464)]
    metrics_port: u16,

    /// OTLP/HTTP collector URL; omitted means no push exporter.
    #[arg(long)]
    otlp_url: Option<String>,

    /// Number of simulated payments; 0 runs until Ctrl-C.
    #[arg(long, default_value_t = 20)]
    payments: u64,

    /// Delay between payments, in milliseconds.
    #[arg(long, default_value_t = 250)]
    interval_ms: u64,

    /// Minimum log level.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Serialize)]
struct Settlement<'a> {
    payment_id: u64,
    amount_cents: u64,
    currency: &'a str,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();
    let otlp_url = args.otlp_url.clone();
    let client = ObservabilityClient::builder()
        .service_name("payment-service")
        .version(env!("CARGO_PKG_VERSION"))
        .environment("development")
        .with_global_attributes([("team", "payments")])
        .with_metrics(|metrics| {
            let metrics = metrics
                .export_interval(Duration::from_secs(10))
                .add_prometheus_exporter(PrometheusExporter::new().with_port(args.metrics_port));
            match otlp_url {
                Some(url) => metrics.add_otlp_exporter(OtlpExporter::new().with_url(url)),
                None => metrics,
            }
        })
        .with_logger(|logs| {
            logs.level_str(&args.log_level)
                .default_attributes([("component", "checkout")])
                .output(LogOutput::Stdout)
        })
        .build()
        .context("failed to build observability client")?;

    info!(port = args.metrics_port, "metrics available at /metrics");

    let logger = client.logger()?;
    let meter = client.meter()?;
    let processed = meter.counter(
        "payments.processed",
        MetricOptions::new().with_description("Payments handled"),
    )?;
    let latency = meter.histogram(
        "payments.latency",
        None,
        MetricOptions::new().with_unit("ms"),
    )?;
    let in_flight = meter.gauge("payments.in_flight", MetricOptions::new())?;

    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut payment_id = 0_u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
        payment_id += 1;
        in_flight.set(1.0, &[]);
        let outcome = process_payment(&logger, payment_id);
        let status = if outcome.is_ok() { "approved" } else { "declined" };
        processed.inc(&[("status", status)]);
        latency.record(simulated_latency(payment_id), &[("status", status)]);
        in_flight.set(0.0, &[]);

        if args.payments != 0 && payment_id >= args.payments {
            break;
        }
    }

    logger.info(
        "shutting down",
        LogOptions::new().with_attribute("payments", payment_id),
    );
    client.shutdown().await?;
    Ok(())
}

fn process_payment(logger: &Logger, payment_id: u64) -> Result<()> {
    let trace = CorrelationContext::for_trace(format!("{payment_id:032x}"));
    let request = logger.child([("payment_id", payment_id)]);
    let entry = AccessLogEntry::start("POST", "/api/payments")
        .with_client("198.51.100.10", "payment-demo/1.0", "https://shop.example")
        .with_allowed_origin(true)
        .with_request_body_size(256);

    if payment_id % 7 == 0 {
        let err = std::io::Error::other("card issuer unavailable");
        request.error(
            "payment declined",
            Some(&err),
            LogOptions::new().with_context(trace),
        );
        request.access(&entry.fail(ErrorDetails::new("card issuer unavailable").with_code("ISSUER_DOWN")))?;
        anyhow::bail!("payment {payment_id} declined");
    }

    request.structured(
        observability::LogLevel::Info,
        "payment settled",
        &Settlement {
            payment_id,
            amount_cents: 1_000 + payment_id * 37 % 9_000,
            currency: "EUR",
        },
    )?;
    request.access(&entry.finish(201, Some("application/json"), 64))?;
    Ok(())
}

fn simulated_latency(payment_id: u64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let jitter = (payment_id * 53 % 400) as f64;
    20.0 + jitter
}
