//! The observability client: resource, managers, and their shared lifecycle.

use std::sync::Arc;

use futures::future::join_all;
use obs_config::ObservabilityConfig;
use obs_primitives::{Attributes, Resource, SignalKind, semconv};
use obs_signals::{LogsManager, Logger, Meter, MeterProvider, MetricsManager, SignalManager};
use tracing::{debug, info, warn};

use crate::builder::ObservabilityClientBuilder;
use crate::error::{ObservabilityError, ObservabilityResult, ShutdownFailures};
use crate::health::{HealthReport, SignalHealth};

/// Owns the enabled signal managers of one service.
///
/// A constructed client has initialized every enabled signal; there is no
/// separate start step. Call [`shutdown`](Self::shutdown) before exit so
/// exporters flush and release their sockets.
#[derive(Debug)]
pub struct ObservabilityClient {
    config: ObservabilityConfig,
    resource: Resource,
    metrics: Option<MetricsManager>,
    logs: Option<LogsManager>,
}

impl ObservabilityClient {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> ObservabilityClientBuilder {
        ObservabilityClientBuilder::new()
    }

    /// Validates `config`, computes the resource, and initializes every
    /// enabled signal.
    ///
    /// Push exporters are exported periodically only when called inside a
    /// tokio runtime; the Prometheus exporter requires one.
    ///
    /// # Errors
    ///
    /// Returns [`ObservabilityError::Config`] for a missing service name or an
    /// enabled metrics signal without exporters, and
    /// [`ObservabilityError::Signal`] when an exporter cannot be created. No
    /// client is returned in either case.
    pub fn new(config: ObservabilityConfig) -> ObservabilityResult<Self> {
        config.validate()?;
        let resource = build_resource(&config);

        let logs = config
            .enabled_logs()
            .map(|logs| {
                let mut manager = LogsManager::new(logs.clone(), resource.clone());
                manager
                    .init()
                    .map_err(|err| ObservabilityError::signal(SignalKind::Logs, err))?;
                Ok::<_, ObservabilityError>(manager)
            })
            .transpose()?;

        let metrics = config
            .enabled_metrics()
            .map(|metrics| {
                let mut manager = MetricsManager::new(metrics.clone(), resource.clone());
                manager
                    .init()
                    .map_err(|err| ObservabilityError::signal(SignalKind::Metrics, err))?;
                Ok::<_, ObservabilityError>(manager)
            })
            .transpose()
            .inspect_err(|_| {
                if let Some(Err(err)) = logs.as_ref().map(LogsManager::close) {
                    warn!(error = %err, "logs teardown after failed init");
                }
            })?;

        info!(
            service = %config.service_name,
            metrics = metrics.is_some(),
            logs = logs.is_some(),
            "observability client initialized"
        );

        Ok(Self {
            config,
            resource,
            metrics,
            logs,
        })
    }

    /// Configuration the client was built from.
    #[must_use]
    pub fn config(&self) -> &ObservabilityConfig {
        &self.config
    }

    /// Merged resource shared by every signal.
    #[must_use]
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Live meter provider.
    ///
    /// # Errors
    ///
    /// Returns [`ObservabilityError::SignalNotEnabled`] when metrics are off.
    pub fn metrics(&self) -> ObservabilityResult<Arc<MeterProvider>> {
        self.metrics_manager()?
            .provider()
            .map_err(|err| ObservabilityError::signal(SignalKind::Metrics, err))
    }

    /// Meter scoped to this service's name and version.
    ///
    /// # Errors
    ///
    /// Returns [`ObservabilityError::SignalNotEnabled`] when metrics are off.
    pub fn meter(&self) -> ObservabilityResult<Meter> {
        Ok(self
            .metrics()?
            .meter(self.config.service_name.clone(), self.config.version.clone()))
    }

    /// Live structured logger.
    ///
    /// # Errors
    ///
    /// Returns [`ObservabilityError::SignalNotEnabled`] when logs are off.
    pub fn logger(&self) -> ObservabilityResult<Logger> {
        self.logs_manager()?
            .logger()
            .map_err(|err| ObservabilityError::signal(SignalKind::Logs, err))
    }

    /// Metrics manager.
    ///
    /// # Errors
    ///
    /// Returns [`ObservabilityError::SignalNotEnabled`] when metrics are off.
    pub fn metrics_manager(&self) -> ObservabilityResult<&MetricsManager> {
        self.metrics.as_ref().ok_or(ObservabilityError::SignalNotEnabled {
            signal: SignalKind::Metrics,
        })
    }

    /// Logs manager.
    ///
    /// # Errors
    ///
    /// Returns [`ObservabilityError::SignalNotEnabled`] when logs are off.
    pub fn logs_manager(&self) -> ObservabilityResult<&LogsManager> {
        self.logs.as_ref().ok_or(ObservabilityError::SignalNotEnabled {
            signal: SignalKind::Logs,
        })
    }

    /// Whether `signal` has an instantiated, enabled manager.
    #[must_use]
    pub fn is_enabled(&self, signal: SignalKind) -> bool {
        self.managers()
            .into_iter()
            .any(|manager| manager.signal() == signal && manager.is_enabled())
    }

    /// Every instantiated manager.
    #[must_use]
    pub fn managers(&self) -> Vec<&dyn SignalManager> {
        let mut managers: Vec<&dyn SignalManager> = Vec::with_capacity(2);
        if let Some(metrics) = &self.metrics {
            managers.push(metrics);
        }
        if let Some(logs) = &self.logs {
            managers.push(logs);
        }
        managers
    }

    /// Snapshot of every manager's state and export health.
    #[must_use]
    pub fn health(&self) -> HealthReport {
        let mut signals = Vec::with_capacity(2);
        if let Some(metrics) = &self.metrics {
            let mut health = SignalHealth::new(SignalKind::Metrics, metrics.state());
            if let Ok(provider) = metrics.provider() {
                health.export_failures = provider.export_failures();
                health.degraded = provider.is_degraded();
            }
            signals.push(health);
        }
        if let Some(logs) = &self.logs {
            let mut health = SignalHealth::new(SignalKind::Logs, logs.state());
            if let Ok(logger) = logs.logger() {
                health.dropped_records = logger.dropped_records();
            }
            signals.push(health);
        }
        HealthReport::from_signals(signals)
    }

    /// Pushes pending metrics and flushes the log sink.
    ///
    /// # Errors
    ///
    /// Returns [`ObservabilityError::Signal`] for the first failing signal.
    pub async fn force_flush(&self) -> ObservabilityResult<()> {
        if let Some(metrics) = &self.metrics {
            metrics
                .force_flush()
                .await
                .map_err(|err| ObservabilityError::signal(SignalKind::Metrics, err))?;
        }
        if let Some(logs) = &self.logs {
            logs.force_flush()
                .map_err(|err| ObservabilityError::signal(SignalKind::Logs, err))?;
        }
        Ok(())
    }

    /// Shuts every manager down concurrently and waits for all of them.
    ///
    /// A failing manager never prevents the others from shutting down. Later
    /// calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`ObservabilityError::Shutdown`] listing each failing signal.
    pub async fn shutdown(&self) -> ObservabilityResult<()> {
        let results = join_all(self.managers().into_iter().map(|manager| async move {
            (manager.signal(), manager.shutdown().await)
        }))
        .await;

        let failures: Vec<_> = results
            .into_iter()
            .filter_map(|(signal, result)| result.err().map(|err| (signal, err)))
            .collect();
        for (signal, err) in &failures {
            warn!(%signal, error = %err, "signal shutdown failed");
        }

        match ShutdownFailures::new(failures) {
            Some(failures) => Err(failures.into()),
            None => {
                info!(service = %self.config.service_name, "observability client shut down");
                Ok(())
            }
        }
    }
}

/// Process defaults, overridden by service identity, overridden by global
/// attributes.
fn build_resource(config: &ObservabilityConfig) -> Resource {
    let mut attributes = Attributes::new();
    attributes.insert(
        semconv::SERVICE_NAME.to_owned(),
        config.service_name.trim().to_owned(),
    );
    if let Some(version) = config.version.as_deref().filter(|v| !v.trim().is_empty()) {
        attributes.insert(semconv::SERVICE_VERSION.to_owned(), version.to_owned());
    }
    if !config.environment.trim().is_empty() {
        attributes.insert(
            semconv::DEPLOYMENT_ENVIRONMENT.to_owned(),
            config.environment.clone(),
        );
    }
    attributes.extend(config.global_attributes.clone());
    let resource = Resource::process_default().merge(&Resource::new(attributes));
    debug!(attributes = resource.len(), "resource computed");
    resource
}

impl TryFrom<ObservabilityConfig> for ObservabilityClient {
    type Error = ObservabilityError;

    fn try_from(config: ObservabilityConfig) -> ObservabilityResult<Self> {
        Self::new(config)
    }
}
