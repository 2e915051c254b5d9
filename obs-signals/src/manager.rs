//! The capability shared by every signal manager.

use std::fmt;

use async_trait::async_trait;
use obs_primitives::{Resource, SignalKind};

use crate::error::SignalResult;
use crate::lifecycle::SignalState;

/// Owner of one signal's live pipeline.
///
/// `init` runs once, synchronously, before the manager is published to
/// consumers, which is why it takes `&mut self`. `shutdown` may run
/// concurrently with other managers and only needs a shared reference.
#[async_trait]
pub trait SignalManager: Send + Sync + fmt::Debug {
    /// Signal this manager owns.
    fn signal(&self) -> SignalKind;

    /// Resource attached to everything the signal emits.
    fn resource(&self) -> &Resource;

    /// Current lifecycle state.
    fn state(&self) -> SignalState;

    /// Pure predicate over the configuration.
    fn is_enabled(&self) -> bool;

    /// Creates the runtime object. Repeated calls are no-ops.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is unusable or the manager was shut down.
    fn init(&mut self) -> SignalResult<()>;

    /// Flushes and releases the runtime object. Repeated calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns the collected exporter or sink failures.
    async fn shutdown(&self) -> SignalResult<()>;
}
