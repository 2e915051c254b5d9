//! Exporter adapters: static descriptions that materialise live readers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::console::ConsoleReader;
use crate::datadog::DatadogEncoder;
use crate::otlp::OtlpEncoder;
use crate::prometheus::PrometheusReader;
use crate::push::HttpPushReader;
use crate::traits::{ExporterError, ExporterKind, ExporterResult, MetricReader, MetricReaderFactory};

const DEFAULT_PROMETHEUS_HOST: &str = "0.0.0.0";
const DEFAULT_PROMETHEUS_PORT: u16 = 9464;
const DEFAULT_PROMETHEUS_ENDPOINT: &str = "/metrics";
const DEFAULT_OTLP_URL: &str = "http://localhost:4318/v1/metrics";
const DEFAULT_DATADOG_SITE: &str = "datadoghq.com";
const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(10);
const DATADOG_API_KEY_HEADER: &str = "DD-API-KEY";

/// Console stream a console exporter writes to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConsoleTarget {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
}

/// Prints metric batches to the console.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConsoleExporter {
    target: ConsoleTarget,
}

impl ConsoleExporter {
    /// Console exporter writing to stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the console stream.
    #[must_use]
    pub fn with_target(mut self, target: ConsoleTarget) -> Self {
        self.target = target;
        self
    }

    /// Configured console stream.
    #[must_use]
    pub const fn target(&self) -> ConsoleTarget {
        self.target
    }
}

/// Serves a Prometheus scrape endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrometheusExporter {
    host: String,
    port: u16,
    endpoint: String,
}

impl PrometheusExporter {
    /// Endpoint on `0.0.0.0:9464/metrics`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: DEFAULT_PROMETHEUS_HOST.to_owned(),
            port: DEFAULT_PROMETHEUS_PORT,
            endpoint: DEFAULT_PROMETHEUS_ENDPOINT.to_owned(),
        }
    }

    /// Sets the bind host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the bind port. Port `0` picks a free port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the scrape path; a leading `/` is added when missing.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl AsRef<str>) -> Self {
        let endpoint = endpoint.as_ref().trim();
        self.endpoint = if endpoint.starts_with('/') {
            endpoint.to_owned()
        } else {
            format!("/{endpoint}")
        };
        self
    }

    /// Bind host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Bind port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Scrape path.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Default for PrometheusExporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Pushes metric batches to an OTLP/HTTP collector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OtlpExporter {
    url: String,
    headers: BTreeMap<String, String>,
    timeout: Duration,
}

impl OtlpExporter {
    /// Exporter targeting `http://localhost:4318/v1/metrics`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            url: DEFAULT_OTLP_URL.to_owned(),
            headers: BTreeMap::new(),
            timeout: DEFAULT_PUSH_TIMEOUT,
        }
    }

    /// Sets the collector URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Adds a request header, such as an authorization token.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Collector URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Extra request headers.
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}

impl Default for OtlpExporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Pushes metric batches to the Datadog series API.
#[derive(Clone, PartialEq, Eq)]
pub struct DatadogExporter {
    api_key: String,
    site: Option<String>,
    endpoint: Option<String>,
    timeout: Duration,
}

impl fmt::Debug for DatadogExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatadogExporter")
            .field("site", &self.site)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl DatadogExporter {
    /// Exporter authenticating with `api_key` against `datadoghq.com`.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            site: None,
            endpoint: None,
            timeout: DEFAULT_PUSH_TIMEOUT,
        }
    }

    /// Selects a regional site such as `datadoghq.eu`.
    #[must_use]
    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    /// Overrides the full intake URL, e.g. to route through a proxy.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configured site.
    #[must_use]
    pub fn site(&self) -> &str {
        self.site.as_deref().unwrap_or(DEFAULT_DATADOG_SITE)
    }

    /// Resolved intake URL.
    #[must_use]
    pub fn endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://api.{}/api/v2/series", self.site()))
    }
}

/// User-supplied exporter, deduplicated by name.
#[derive(Clone)]
pub struct CustomExporter {
    name: String,
    factory: Arc<dyn MetricReaderFactory>,
}

impl CustomExporter {
    /// Wraps a reader factory under the given name.
    #[must_use]
    pub fn new(name: impl Into<String>, factory: impl MetricReaderFactory + 'static) -> Self {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    /// Exporter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CustomExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomExporter")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One configured metrics destination.
#[derive(Clone, Debug)]
pub enum ExporterAdapter {
    /// Console output.
    Console(ConsoleExporter),
    /// Prometheus scrape endpoint.
    Prometheus(PrometheusExporter),
    /// OTLP/HTTP push.
    Otlp(OtlpExporter),
    /// Datadog API push.
    Datadog(DatadogExporter),
    /// User-supplied reader.
    Custom(CustomExporter),
}

impl ExporterAdapter {
    /// Console exporter with defaults.
    #[must_use]
    pub fn console() -> Self {
        Self::Console(ConsoleExporter::new())
    }

    /// Prometheus exporter with defaults.
    #[must_use]
    pub fn prometheus() -> Self {
        Self::Prometheus(PrometheusExporter::new())
    }

    /// OTLP exporter with defaults.
    #[must_use]
    pub fn otlp() -> Self {
        Self::Otlp(OtlpExporter::new())
    }

    /// Datadog exporter for the given API key.
    #[must_use]
    pub fn datadog(api_key: impl Into<String>) -> Self {
        Self::Datadog(DatadogExporter::new(api_key))
    }

    /// Custom exporter.
    #[must_use]
    pub fn custom(name: impl Into<String>, factory: impl MetricReaderFactory + 'static) -> Self {
        Self::Custom(CustomExporter::new(name, factory))
    }

    /// Identity used for deduplication.
    #[must_use]
    pub fn kind(&self) -> ExporterKind {
        match self {
            Self::Console(_) => ExporterKind::Console,
            Self::Prometheus(_) => ExporterKind::Prometheus,
            Self::Otlp(_) => ExporterKind::Otlp,
            Self::Datadog(_) => ExporterKind::Datadog,
            Self::Custom(custom) => ExporterKind::Custom(custom.name.clone()),
        }
    }

    /// Materialises one live reader.
    ///
    /// # Errors
    ///
    /// Returns an [`ExporterError`] if the destination is misconfigured or its
    /// socket cannot be bound.
    pub fn create(&self) -> ExporterResult<Box<dyn MetricReader>> {
        match self {
            Self::Console(console) => Ok(Box::new(ConsoleReader::new(console.target))),
            Self::Prometheus(prometheus) => Ok(Box::new(PrometheusReader::bind(prometheus)?)),
            Self::Otlp(otlp) => Ok(Box::new(HttpPushReader::new(
                ExporterKind::Otlp,
                OtlpEncoder,
                &otlp.url,
                otlp.headers
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.as_str())),
                otlp.timeout,
            )?)),
            Self::Datadog(datadog) => {
                if datadog.api_key.trim().is_empty() {
                    return Err(ExporterError::configuration("datadog api key is empty"));
                }
                Ok(Box::new(HttpPushReader::new(
                    ExporterKind::Datadog,
                    DatadogEncoder::new(),
                    &datadog.endpoint(),
                    [(DATADOG_API_KEY_HEADER, datadog.api_key.as_str())],
                    datadog.timeout,
                )?))
            }
            Self::Custom(custom) => custom.factory.create(),
        }
    }
}

impl From<ConsoleExporter> for ExporterAdapter {
    fn from(value: ConsoleExporter) -> Self {
        Self::Console(value)
    }
}

impl From<PrometheusExporter> for ExporterAdapter {
    fn from(value: PrometheusExporter) -> Self {
        Self::Prometheus(value)
    }
}

impl From<OtlpExporter> for ExporterAdapter {
    fn from(value: OtlpExporter) -> Self {
        Self::Otlp(value)
    }
}

impl From<DatadogExporter> for ExporterAdapter {
    fn from(value: DatadogExporter) -> Self {
        Self::Datadog(value)
    }
}

impl From<CustomExporter> for ExporterAdapter {
    fn from(value: CustomExporter) -> Self {
        Self::Custom(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Delivery;

    #[test]
    fn kinds_identify_variants() {
        assert_eq!(ExporterAdapter::console().kind(), ExporterKind::Console);
        assert_eq!(ExporterAdapter::otlp().kind(), ExporterKind::Otlp);
        let factory = || -> ExporterResult<Box<dyn MetricReader>> {
            Ok(Box::new(ConsoleReader::new(ConsoleTarget::Stderr)))
        };
        assert_eq!(
            ExporterAdapter::custom("audit", factory).kind(),
            ExporterKind::Custom("audit".into())
        );
    }

    #[test]
    fn prometheus_endpoint_is_normalised() {
        let exporter = PrometheusExporter::new().with_endpoint("scrape");
        assert_eq!(exporter.endpoint(), "/scrape");
        assert_eq!(exporter.port(), 9464);
    }

    #[test]
    fn datadog_endpoint_follows_site() {
        let exporter = DatadogExporter::new("key").with_site("datadoghq.eu");
        assert_eq!(exporter.endpoint(), "https://api.datadoghq.eu/api/v2/series");
        assert!(!format!("{exporter:?}").contains("key"));
    }

    #[test]
    fn each_create_yields_a_fresh_reader() {
        let adapter = ExporterAdapter::otlp();
        let first = adapter.create().unwrap();
        let second = adapter.create().unwrap();
        assert_eq!(first.kind(), ExporterKind::Otlp);
        assert_eq!(second.delivery(), Delivery::Push);
    }

    #[test]
    fn datadog_requires_api_key() {
        let err = ExporterAdapter::datadog(" ").create().expect_err("empty key");
        assert!(matches!(err, ExporterError::Configuration { .. }));
    }
}
