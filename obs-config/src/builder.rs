//! Per-signal sub-builders.
//!
//! Setters never fail; `build()` performs validation. Exporter registration is
//! idempotent per [`ExporterKind`](obs_exporters::ExporterKind).

use std::time::Duration;

use obs_exporters::{
    ConsoleExporter, DatadogExporter, ExporterAdapter, LogOutput, OtlpExporter,
    PrometheusExporter,
};
use obs_primitives::{Attributes, LogLevel};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{DEFAULT_EXPORT_INTERVAL, LogsConfig, MetricsConfig};

/// Builder for [`MetricsConfig`].
#[derive(Clone, Debug)]
pub struct MetricsConfigBuilder {
    enabled: bool,
    default_attributes: Attributes,
    exporters: Vec<ExporterAdapter>,
    export_interval: Duration,
}

impl Default for MetricsConfigBuilder {
    fn default() -> Self {
        Self {
            enabled: true,
            default_attributes: Attributes::new(),
            exporters: Vec::new(),
            export_interval: DEFAULT_EXPORT_INTERVAL,
        }
    }
}

impl MetricsConfigBuilder {
    /// Builder with metrics enabled and no exporters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables metrics collection.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Replaces the default labels.
    #[must_use]
    pub fn default_attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.default_attributes = attributes
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self
    }

    /// Sets the push period.
    #[must_use]
    pub fn export_interval(mut self, interval: Duration) -> Self {
        self.export_interval = interval;
        self
    }

    /// Adds a console exporter writing to stdout.
    #[must_use]
    pub fn add_console_exporter(self) -> Self {
        self.add_exporter(ConsoleExporter::new())
    }

    /// Adds a Prometheus scrape endpoint.
    #[must_use]
    pub fn add_prometheus_exporter(self, exporter: PrometheusExporter) -> Self {
        self.add_exporter(exporter)
    }

    /// Adds an OTLP/HTTP push exporter.
    #[must_use]
    pub fn add_otlp_exporter(self, exporter: OtlpExporter) -> Self {
        self.add_exporter(exporter)
    }

    /// Adds a Datadog push exporter.
    #[must_use]
    pub fn add_datadog_exporter(self, exporter: DatadogExporter) -> Self {
        self.add_exporter(exporter)
    }

    /// Adds any exporter unless one of the same kind is already registered.
    #[must_use]
    pub fn add_exporter(mut self, exporter: impl Into<ExporterAdapter>) -> Self {
        let exporter = exporter.into();
        let kind = exporter.kind();
        if self.exporters.iter().any(|existing| existing.kind() == kind) {
            debug!(exporter = %kind, "exporter already registered; ignoring");
        } else {
            self.exporters.push(exporter);
        }
        self
    }

    /// Number of registered exporters.
    #[must_use]
    pub fn exporter_count(&self) -> usize {
        self.exporters.len()
    }

    /// Finalises the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoExporters`] if metrics are enabled without
    /// exporters, or [`ConfigError::InvalidAttribute`] for a bad label key.
    pub fn build(self) -> ConfigResult<MetricsConfig> {
        let config = MetricsConfig {
            enabled: self.enabled,
            default_attributes: self.default_attributes,
            exporters: self.exporters,
            export_interval: self.export_interval,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Builder for [`LogsConfig`].
#[derive(Clone, Debug)]
pub struct LoggerConfigBuilder {
    enabled: bool,
    default_attributes: Attributes,
    level: Result<LogLevel, String>,
    output: LogOutput,
}

impl Default for LoggerConfigBuilder {
    fn default() -> Self {
        Self {
            enabled: true,
            default_attributes: Attributes::new(),
            level: Ok(LogLevel::default()),
            output: LogOutput::default(),
        }
    }
}

impl LoggerConfigBuilder {
    /// Builder with logs enabled at `info` on stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables logging.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the minimum severity.
    #[must_use]
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = Ok(level);
        self
    }

    /// Sets the minimum severity by name; an unknown name fails at `build()`.
    #[must_use]
    pub fn level_str(mut self, level: &str) -> Self {
        self.level = level.parse().map_err(|_| level.to_owned());
        self
    }

    /// Replaces the base context.
    #[must_use]
    pub fn default_attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.default_attributes = attributes
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self
    }

    /// Selects the output.
    #[must_use]
    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Finalises the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidLogLevel`] or [`ConfigError::InvalidAttribute`].
    pub fn build(self) -> ConfigResult<LogsConfig> {
        let level = self
            .level
            .map_err(|value| ConfigError::InvalidLogLevel { value })?;
        let config = LogsConfig {
            enabled: self.enabled,
            default_attributes: self.default_attributes,
            level,
            output: self.output,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obs_exporters::ExporterKind;

    #[test]
    fn duplicate_kinds_are_ignored() {
        let config = MetricsConfigBuilder::new()
            .add_console_exporter()
            .add_console_exporter()
            .add_otlp_exporter(OtlpExporter::new())
            .add_otlp_exporter(OtlpExporter::new().with_url("http://other:4318/v1/metrics"))
            .build()
            .unwrap();

        let kinds: Vec<_> = config.exporters.iter().map(ExporterAdapter::kind).collect();
        assert_eq!(kinds, vec![ExporterKind::Console, ExporterKind::Otlp]);
    }

    #[test]
    fn first_registration_wins() {
        let config = MetricsConfigBuilder::new()
            .add_prometheus_exporter(PrometheusExporter::new().with_port(9000))
            .add_prometheus_exporter(PrometheusExporter::new().with_port(9001))
            .build()
            .unwrap();
        let ExporterAdapter::Prometheus(prometheus) = &config.exporters[0] else {
            panic!("expected prometheus exporter");
        };
        assert_eq!(prometheus.port(), 9000);
    }

    #[test]
    fn enabled_without_exporters_fails() {
        let err = MetricsConfigBuilder::new().build().unwrap_err();
        assert_eq!(err, ConfigError::NoExporters);
        assert!(MetricsConfigBuilder::new().enabled(false).build().is_ok());
    }

    #[test]
    fn logger_defaults_to_info() {
        let config = LoggerConfigBuilder::new().build().unwrap();
        assert!(config.enabled);
        assert_eq!(config.level, LogLevel::Info);
    }

    #[test]
    fn unknown_level_fails_at_build() {
        let err = LoggerConfigBuilder::new().level_str("loud").build().unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidLogLevel {
                value: "loud".into()
            }
        );
        let config = LoggerConfigBuilder::new().level_str("WARN").build().unwrap();
        assert_eq!(config.level, LogLevel::Warn);
    }
}
