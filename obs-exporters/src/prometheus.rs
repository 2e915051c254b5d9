//! Prometheus scrape endpoint.

use std::convert::Infallible;
use std::fmt::Write as _;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use async_trait::async_trait;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Method, Request, Response, StatusCode};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::adapter::PrometheusExporter;
use crate::data::{InstrumentKind, MetricBatch, PointValue};
use crate::traits::{
    Delivery, ExporterError, ExporterKind, ExporterResult, MetricProducer, MetricReader,
};

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

struct Server {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Pull reader serving the text exposition format over HTTP.
#[derive(Debug)]
pub struct PrometheusReader {
    endpoint: String,
    local_addr: SocketAddr,
    listener: Mutex<Option<StdTcpListener>>,
    server: Mutex<Option<Server>>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").finish_non_exhaustive()
    }
}

impl PrometheusReader {
    /// Binds the listening socket. Serving starts once the reader is attached.
    ///
    /// # Errors
    ///
    /// Returns [`ExporterError::Io`] if the address cannot be bound.
    pub fn bind(config: &PrometheusExporter) -> ExporterResult<Self> {
        let listener = StdTcpListener::bind((config.host(), config.port()))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            endpoint: config.endpoint().to_owned(),
            local_addr,
            listener: Mutex::new(Some(listener)),
            server: Mutex::new(None),
        })
    }

    /// Address the endpoint is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Path the metrics are served on.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MetricReader for PrometheusReader {
    fn kind(&self) -> ExporterKind {
        ExporterKind::Prometheus
    }

    fn delivery(&self) -> Delivery {
        Delivery::Pull
    }

    fn attach(&self, producer: Arc<dyn MetricProducer>) -> ExporterResult<()> {
        let handle = Handle::try_current()
            .map_err(|err| ExporterError::runtime(format!("prometheus endpoint: {err}")))?;
        let Some(listener) = self.listener.lock().take() else {
            return Err(ExporterError::configuration(
                "prometheus reader is already attached",
            ));
        };

        let listener = {
            let _guard = handle.enter();
            TcpListener::from_std(listener)?
        };
        let (stop, stopped) = oneshot::channel();
        let endpoint = self.endpoint.clone();
        let task = handle.spawn(serve(listener, endpoint, producer, stopped));
        *self.server.lock() = Some(Server { stop, task });

        info!(
            address = %self.local_addr,
            endpoint = %self.endpoint,
            "prometheus endpoint listening"
        );
        Ok(())
    }

    async fn export(&self, _batch: &MetricBatch) -> ExporterResult<()> {
        Ok(())
    }

    async fn shutdown(&self) -> ExporterResult<()> {
        self.listener.lock().take();
        let server = self.server.lock().take();
        if let Some(Server { stop, task }) = server {
            let _ = stop.send(());
            task.await.map_err(|err| {
                ExporterError::transport(format!("prometheus endpoint task failed: {err}"))
            })?;
            debug!(address = %self.local_addr, "prometheus endpoint closed");
        }
        Ok(())
    }
}

impl Drop for PrometheusReader {
    fn drop(&mut self) {
        if let Some(server) = self.server.get_mut().take() {
            server.task.abort();
        }
    }
}

async fn serve(
    listener: TcpListener,
    endpoint: String,
    producer: Arc<dyn MetricProducer>,
    mut stopped: oneshot::Receiver<()>,
) {
    let http = Http::new();
    let endpoint: Arc<str> = Arc::from(endpoint);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut stopped => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let producer = Arc::clone(&producer);
                    let endpoint = Arc::clone(&endpoint);
                    let service = service_fn(move |request: Request<Body>| {
                        let response = respond(&request, &endpoint, producer.as_ref());
                        async move { Ok::<_, Infallible>(response) }
                    });
                    let connection = http.serve_connection(stream, service);
                    connections.spawn(async move {
                        if let Err(err) = connection.await {
                            debug!(%peer, error = %err, "scrape connection failed");
                        }
                    });
                }
                Err(err) => warn!(error = %err, "prometheus accept failed"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    // Open scrape connections, idle keep-alives included, are dropped here.
    connections.shutdown().await;
}

fn respond(request: &Request<Body>, endpoint: &str, producer: &dyn MetricProducer) -> Response<Body> {
    if request.uri().path() != endpoint {
        return status_only(StatusCode::NOT_FOUND);
    }
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return status_only(StatusCode::METHOD_NOT_ALLOWED);
    }

    let mut response = Response::new(Body::from(render_text(&producer.produce())));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
    response
}

fn status_only(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

/// Renders a batch in the Prometheus text exposition format.
#[must_use]
pub fn render_text(batch: &MetricBatch) -> String {
    let mut out = String::new();

    if !batch.resource.is_empty() {
        let labels = batch
            .resource
            .iter()
            .map(|(key, value)| (sanitize_label(key), value.to_owned()))
            .collect::<Vec<_>>();
        out.push_str("# HELP target_info Target metadata\n# TYPE target_info gauge\n");
        let _ = writeln!(out, "target_info{} 1", format_labels(&labels, None));
    }

    for stream in &batch.metrics {
        let mut name = sanitize_metric_name(&stream.name);
        if stream.kind == InstrumentKind::Counter && !name.ends_with("_total") {
            name.push_str("_total");
        }

        if let Some(description) = &stream.description {
            let _ = writeln!(out, "# HELP {name} {}", escape_help(description));
        }
        let _ = writeln!(out, "# TYPE {name} {}", stream.kind.as_str());

        for point in &stream.points {
            let labels = point
                .labels
                .iter()
                .map(|(key, value)| (sanitize_label(key), value.clone()))
                .collect::<Vec<_>>();

            match &point.value {
                PointValue::Sum(value) | PointValue::Gauge(value) => {
                    let _ = writeln!(
                        out,
                        "{name}{} {}",
                        format_labels(&labels, None),
                        format_value(*value)
                    );
                }
                PointValue::Histogram(histogram) => {
                    let mut cumulative = 0;
                    for (bound, count) in histogram.bounds.iter().zip(&histogram.bucket_counts) {
                        cumulative += count;
                        let _ = writeln!(
                            out,
                            "{name}_bucket{} {cumulative}",
                            format_labels(&labels, Some(&format_value(*bound)))
                        );
                    }
                    let _ = writeln!(
                        out,
                        "{name}_bucket{} {}",
                        format_labels(&labels, Some("+Inf")),
                        histogram.count
                    );
                    let _ = writeln!(
                        out,
                        "{name}_sum{} {}",
                        format_labels(&labels, None),
                        format_value(histogram.sum)
                    );
                    let _ = writeln!(
                        out,
                        "{name}_count{} {}",
                        format_labels(&labels, None),
                        histogram.count
                    );
                }
            }
        }
    }

    out
}

fn format_labels(labels: &[(String, String)], le: Option<&str>) -> String {
    if labels.is_empty() && le.is_none() {
        return String::new();
    }
    let mut parts = labels
        .iter()
        .map(|(key, value)| format!("{key}=\"{}\"", escape_label_value(value)))
        .collect::<Vec<_>>();
    if let Some(le) = le {
        parts.push(format!("le=\"{le}\""));
    }
    format!("{{{}}}", parts.join(","))
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else if value.is_infinite() {
        (if value > 0.0 { "+Inf" } else { "-Inf" }).to_owned()
    } else {
        value.to_string()
    }
}

fn sanitize_metric_name(name: &str) -> String {
    sanitize(name, |c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn sanitize_label(name: &str) -> String {
    sanitize(name, |c| c.is_ascii_alphanumeric() || c == '_')
}

fn sanitize(name: &str, allowed: impl Fn(char) -> bool) -> String {
    let mut sanitized = name
        .chars()
        .map(|c| if allowed(c) { c } else { '_' })
        .collect::<String>();
    if sanitized.chars().next().is_none_or(|c| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    sanitized
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_help(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}
