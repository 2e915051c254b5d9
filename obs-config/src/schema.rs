//! Strongly typed configuration schemas.

use std::time::Duration;

use obs_exporters::{ExporterAdapter, LogOutput};
use obs_primitives::{Attributes, LogLevel, SignalKind, validate_attribute_key};

use crate::builder::{LoggerConfigBuilder, MetricsConfigBuilder};
use crate::error::{ConfigError, ConfigResult};

/// Interval between periodic pushes to push-based exporters.
pub const DEFAULT_EXPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Settings shared by every signal.
pub trait SignalConfig {
    /// Signal the configuration describes.
    fn signal(&self) -> SignalKind;

    /// Whether the signal was switched on.
    fn enabled(&self) -> bool;

    /// Attributes attached to everything the signal emits.
    fn default_attributes(&self) -> &Attributes;
}

/// Metrics pipeline configuration.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether metrics are collected.
    pub enabled: bool,
    /// Labels merged under every recorded data point.
    pub default_attributes: Attributes,
    /// Destinations, in registration order.
    pub exporters: Vec<ExporterAdapter>,
    /// Period of the background push.
    pub export_interval: Duration,
}

impl MetricsConfig {
    /// Starts a metrics sub-builder.
    #[must_use]
    pub fn builder() -> MetricsConfigBuilder {
        MetricsConfigBuilder::new()
    }

    /// Checks the exporter requirement and attribute keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoExporters`] when enabled without exporters, or
    /// [`ConfigError::InvalidAttribute`] for a bad key.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.enabled && self.exporters.is_empty() {
            return Err(ConfigError::NoExporters);
        }
        validate_keys(&self.default_attributes)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_attributes: Attributes::new(),
            exporters: Vec::new(),
            export_interval: DEFAULT_EXPORT_INTERVAL,
        }
    }
}

impl SignalConfig for MetricsConfig {
    fn signal(&self) -> SignalKind {
        SignalKind::Metrics
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn default_attributes(&self) -> &Attributes {
        &self.default_attributes
    }
}

/// Logs pipeline configuration.
#[derive(Clone, Debug, Default)]
pub struct LogsConfig {
    /// Whether logs are emitted.
    pub enabled: bool,
    /// Base context merged into every record.
    pub default_attributes: Attributes,
    /// Minimum severity written.
    pub level: LogLevel,
    /// Where records go.
    pub output: LogOutput,
}

impl LogsConfig {
    /// Starts a logger sub-builder.
    #[must_use]
    pub fn builder() -> LoggerConfigBuilder {
        LoggerConfigBuilder::new()
    }

    /// Checks attribute keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAttribute`] for a bad key.
    pub fn validate(&self) -> ConfigResult<()> {
        validate_keys(&self.default_attributes)
    }
}

impl SignalConfig for LogsConfig {
    fn signal(&self) -> SignalKind {
        SignalKind::Logs
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn default_attributes(&self) -> &Attributes {
        &self.default_attributes
    }
}

/// Complete client configuration. Treated as immutable once handed to a client.
#[derive(Clone, Debug, Default)]
pub struct ObservabilityConfig {
    /// Logical service name; required.
    pub service_name: String,
    /// Deployment environment, such as `production`.
    pub environment: String,
    /// Service version.
    pub version: Option<String>,
    /// Attributes added to the resource; these win over everything else.
    pub global_attributes: Attributes,
    /// Metrics pipeline, if configured.
    pub metrics: Option<MetricsConfig>,
    /// Logs pipeline, if configured.
    pub logs: Option<LogsConfig>,
}

impl ObservabilityConfig {
    /// Configuration naming only the service.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Checks the service name and global attribute keys.
    ///
    /// Signal configurations are checked by their managers at init time.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingServiceName`] or
    /// [`ConfigError::InvalidAttribute`].
    pub fn validate(&self) -> ConfigResult<()> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::MissingServiceName);
        }
        validate_keys(&self.global_attributes)
    }

    /// Metrics configuration when present and enabled.
    #[must_use]
    pub fn enabled_metrics(&self) -> Option<&MetricsConfig> {
        self.metrics.as_ref().filter(|config| config.enabled)
    }

    /// Logs configuration when present and enabled.
    #[must_use]
    pub fn enabled_logs(&self) -> Option<&LogsConfig> {
        self.logs.as_ref().filter(|config| config.enabled)
    }
}

fn validate_keys(attributes: &Attributes) -> ConfigResult<()> {
    attributes
        .keys()
        .try_for_each(|key| validate_attribute_key(key))
        .map_err(ConfigError::from)
}
