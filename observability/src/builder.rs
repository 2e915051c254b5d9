//! Fluent client builder with nested per-signal sub-builders.

use obs_config::{
    ConfigResult, EnvOverlay, LoggerConfigBuilder, LogsConfig, MetricsConfig,
    MetricsConfigBuilder, ObservabilityConfig,
};
use obs_primitives::Attributes;

use crate::client::ObservabilityClient;
use crate::error::ObservabilityResult;

/// Accumulates configuration for an [`ObservabilityClient`].
///
/// Setters never fail. Errors from the metrics and logger sub-builders are
/// kept and raised by [`build`](Self::build); the service name is checked by
/// the client itself.
#[derive(Clone, Debug, Default)]
pub struct ObservabilityClientBuilder {
    service_name: Option<String>,
    version: Option<String>,
    environment: Option<String>,
    global_attributes: Option<Attributes>,
    metrics: Option<ConfigResult<MetricsConfig>>,
    logs: Option<ConfigResult<LogsConfig>>,
}

impl ObservabilityClientBuilder {
    /// Empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder seeded from `OTEL_SERVICE_NAME`, `SERVICE_VERSION`,
    /// `DEPLOYMENT_ENVIRONMENT` and `OTEL_RESOURCE_ATTRIBUTES`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_overlay(EnvOverlay::from_env())
    }

    /// Builder seeded from an already-read overlay.
    #[must_use]
    pub fn from_overlay(overlay: EnvOverlay) -> Self {
        Self {
            service_name: overlay.service_name,
            version: overlay.version,
            environment: overlay.environment,
            global_attributes: (!overlay.resource_attributes.is_empty())
                .then_some(overlay.resource_attributes),
            ..Self::default()
        }
    }

    /// Sets the service name.
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Sets the service version.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the deployment environment.
    #[must_use]
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Replaces the global attribute map. Earlier calls are discarded, not
    /// merged.
    #[must_use]
    pub fn with_global_attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.global_attributes = Some(
            attributes
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        );
        self
    }

    /// Configures metrics through a fresh [`MetricsConfigBuilder`].
    #[must_use]
    pub fn with_metrics(
        mut self,
        configure: impl FnOnce(MetricsConfigBuilder) -> MetricsConfigBuilder,
    ) -> Self {
        self.metrics = Some(configure(MetricsConfigBuilder::new()).build());
        self
    }

    /// Configures logging through a fresh [`LoggerConfigBuilder`].
    #[must_use]
    pub fn with_logger(
        mut self,
        configure: impl FnOnce(LoggerConfigBuilder) -> LoggerConfigBuilder,
    ) -> Self {
        self.logs = Some(configure(LoggerConfigBuilder::new()).build());
        self
    }

    /// Assembles the configuration without constructing a client.
    ///
    /// # Errors
    ///
    /// Returns the first stored sub-builder error.
    pub fn build_config(self) -> ObservabilityResult<ObservabilityConfig> {
        Ok(ObservabilityConfig {
            service_name: self.service_name.unwrap_or_default(),
            environment: self.environment.unwrap_or_default(),
            version: self.version,
            global_attributes: self.global_attributes.unwrap_or_default(),
            metrics: self.metrics.transpose()?,
            logs: self.logs.transpose()?,
        })
    }

    /// Assembles the configuration and constructs the client.
    ///
    /// # Errors
    ///
    /// Returns stored sub-builder errors, then anything
    /// [`ObservabilityClient::new`] rejects.
    pub fn build(self) -> ObservabilityResult<ObservabilityClient> {
        ObservabilityClient::new(self.build_config()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ObservabilityError;
    use obs_config::ConfigError;

    #[test]
    fn global_attributes_are_replaced() {
        let config = ObservabilityClientBuilder::new()
            .service_name("svc")
            .with_global_attributes([("team", "core"), ("tier", "1")])
            .with_global_attributes([("region", "eu")])
            .build_config()
            .unwrap();

        assert_eq!(config.global_attributes.len(), 1);
        assert_eq!(config.global_attributes["region"], "eu");
    }

    #[test]
    fn sub_builder_errors_surface_at_build() {
        let err = ObservabilityClientBuilder::new()
            .service_name("svc")
            .with_metrics(|metrics| metrics)
            .build_config()
            .unwrap_err();
        assert!(matches!(err, ObservabilityError::Config(ConfigError::NoExporters)));
    }

    #[test]
    fn explicit_calls_override_environment() {
        let overlay = EnvOverlay {
            service_name: Some("from-env".into()),
            environment: Some("staging".into()),
            resource_attributes: [("team".to_owned(), "env".to_owned())].into(),
            ..EnvOverlay::default()
        };
        let config = ObservabilityClientBuilder::from_overlay(overlay)
            .service_name("explicit")
            .build_config()
            .unwrap();

        assert_eq!(config.service_name, "explicit");
        assert_eq!(config.environment, "staging");
        assert_eq!(config.global_attributes["team"], "env");
    }
}
