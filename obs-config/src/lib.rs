//! Configuration for the observability client.
//!
//! The [`schema`] module holds the immutable values handed to the client,
//! [`builder`] holds the per-signal sub-builders that produce them, and
//! [`loader`] seeds configuration from the process environment.

#![warn(missing_docs, clippy::pedantic)]

pub mod builder;
pub mod loader;
pub mod schema;

mod error;

pub use builder::{LoggerConfigBuilder, MetricsConfigBuilder};
pub use error::{ConfigError, ConfigResult};
pub use loader::{EnvOverlay, parse_resource_attributes};
pub use schema::{
    DEFAULT_EXPORT_INTERVAL, LogsConfig, MetricsConfig, ObservabilityConfig, SignalConfig,
};
