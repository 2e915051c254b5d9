//! Health reporting for a running client.

use chrono::{DateTime, Utc};
use obs_primitives::SignalKind;
use obs_signals::SignalState;
use serde::Serialize;

/// Overall client health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every manager is initialized and the latest exports succeeded.
    Healthy,
    /// Managers are running but the latest export failed.
    Degraded,
    /// At least one manager has shut down.
    Unhealthy,
}

/// Health of one signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalHealth {
    /// Signal described.
    pub signal: SignalKind,
    /// Lifecycle state.
    pub state: SignalState,
    /// Failed push exports since creation.
    pub export_failures: u64,
    /// Log records the sink refused since creation.
    pub dropped_records: u64,
    /// Whether the latest export failed.
    pub degraded: bool,
}

impl SignalHealth {
    pub(crate) fn new(signal: SignalKind, state: SignalState) -> Self {
        Self {
            signal,
            state,
            export_failures: 0,
            dropped_records: 0,
            degraded: false,
        }
    }

    fn status(&self) -> HealthStatus {
        match self.state {
            SignalState::Initialized if self.degraded => HealthStatus::Degraded,
            SignalState::Initialized => HealthStatus::Healthy,
            SignalState::Uninitialized | SignalState::Shutdown => HealthStatus::Unhealthy,
        }
    }
}

/// Snapshot returned by [`ObservabilityClient::health`](crate::ObservabilityClient::health).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Worst status across signals.
    pub status: HealthStatus,
    /// Per-signal detail.
    pub signals: Vec<SignalHealth>,
    /// When the snapshot was taken.
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub(crate) fn from_signals(signals: Vec<SignalHealth>) -> Self {
        let status = signals
            .iter()
            .map(SignalHealth::status)
            .fold(HealthStatus::Healthy, worst);
        Self {
            status,
            signals,
            checked_at: Utc::now(),
        }
    }

    /// Health of one signal, if it was instantiated.
    #[must_use]
    pub fn signal(&self, signal: SignalKind) -> Option<&SignalHealth> {
        self.signals.iter().find(|health| health.signal == signal)
    }
}

fn worst(left: HealthStatus, right: HealthStatus) -> HealthStatus {
    match (left, right) {
        (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
        (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
        _ => HealthStatus::Healthy,
    }
}
