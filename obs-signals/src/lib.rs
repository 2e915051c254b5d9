//! Signal managers for the observability client.
//!
//! Each signal is owned by a [`SignalManager`]: [`MetricsManager`] drives a
//! [`MeterProvider`] and its readers, [`LogsManager`] drives a [`Logger`].
//! Managers move through [`SignalState`] in one direction only.

#![warn(missing_docs, clippy::pedantic)]

pub mod instruments;
pub mod lifecycle;
pub mod logs;
pub mod manager;
pub mod metrics;
pub mod provider;

mod error;

pub use error::{SignalError, SignalResult};
pub use instruments::{
    Counter, DEFAULT_HISTOGRAM_BUCKETS, Gauge, Histogram, Labels, MetricOptions,
    validate_instrument_name,
};
pub use lifecycle::{Lifecycle, LifecycleError, LifecycleEvent, LifecycleResult, SignalState};
pub use logs::{LogOptions, Logger, LogsManager};
pub use manager::SignalManager;
pub use metrics::MetricsManager;
pub use provider::{Meter, MeterProvider};
