//! Metrics signal manager.

use std::sync::Arc;

use async_trait::async_trait;
use obs_config::{ConfigError, MetricsConfig, SignalConfig};
use obs_exporters::MetricReader;
use obs_primitives::{Resource, SignalKind};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{SignalError, SignalResult};
use crate::lifecycle::{Lifecycle, LifecycleEvent, SignalState};
use crate::manager::SignalManager;
use crate::provider::{Meter, MeterProvider};

/// Owns the meter provider and its readers.
#[derive(Debug)]
pub struct MetricsManager {
    config: MetricsConfig,
    resource: Resource,
    lifecycle: Mutex<Lifecycle>,
    provider: Option<Arc<MeterProvider>>,
}

impl MetricsManager {
    /// Manager for `config`; nothing is created until [`SignalManager::init`].
    #[must_use]
    pub fn new(config: MetricsConfig, resource: Resource) -> Self {
        Self {
            config,
            resource,
            lifecycle: Mutex::new(Lifecycle::new(SignalKind::Metrics)),
            provider: None,
        }
    }

    /// Configuration the manager was built from.
    #[must_use]
    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Live provider handle.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::NotInitialized`] before `init`.
    pub fn provider(&self) -> SignalResult<Arc<MeterProvider>> {
        self.provider.clone().ok_or(SignalError::NotInitialized {
            signal: SignalKind::Metrics,
        })
    }

    /// Meter for the given instrumentation scope.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::NotInitialized`] before `init`.
    pub fn meter(&self, name: impl Into<String>, version: Option<String>) -> SignalResult<Meter> {
        Ok(self.provider()?.meter(name, version))
    }

    /// Flushes every reader.
    ///
    /// # Errors
    ///
    /// Returns the collected reader failures.
    pub async fn force_flush(&self) -> SignalResult<()> {
        match &self.provider {
            Some(provider) => provider.force_flush().await,
            None => Ok(()),
        }
    }

    fn create_readers(&self) -> SignalResult<Vec<Box<dyn MetricReader>>> {
        self.config
            .exporters
            .iter()
            .map(|adapter| {
                let reader = adapter.create().map_err(|source| SignalError::Exporter {
                    kind: adapter.kind(),
                    source,
                })?;
                debug!(exporter = %reader.kind(), "metric reader created");
                Ok(reader)
            })
            .collect()
    }
}

#[async_trait]
impl SignalManager for MetricsManager {
    fn signal(&self) -> SignalKind {
        SignalKind::Metrics
    }

    fn resource(&self) -> &Resource {
        &self.resource
    }

    fn state(&self) -> SignalState {
        self.lifecycle.lock().state()
    }

    /// Enabled and at least one exporter configured.
    fn is_enabled(&self) -> bool {
        self.config.enabled() && !self.config.exporters.is_empty()
    }

    fn init(&mut self) -> SignalResult<()> {
        if self.lifecycle.get_mut().state().is_ready() {
            return Ok(());
        }
        self.lifecycle.get_mut().check(LifecycleEvent::Init)?;
        if self.config.exporters.is_empty() {
            return Err(ConfigError::NoExporters.into());
        }
        self.config.validate()?;

        let readers = self.create_readers()?;
        let provider = MeterProvider::new(
            self.resource.clone(),
            self.config.default_attributes.clone(),
            readers,
            self.config.export_interval,
        )?;
        self.provider = Some(Arc::new(provider));
        self.lifecycle.get_mut().transition(LifecycleEvent::Init)?;
        Ok(())
    }

    async fn shutdown(&self) -> SignalResult<()> {
        let previous = {
            let mut lifecycle = self.lifecycle.lock();
            let previous = lifecycle.state();
            lifecycle.transition(LifecycleEvent::Shutdown)?;
            previous
        };
        if previous != SignalState::Initialized {
            return Ok(());
        }
        match &self.provider {
            Some(provider) => provider.shutdown().await,
            None => Ok(()),
        }
    }
}
