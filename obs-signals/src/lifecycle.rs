//! Lifecycle state machine for signal managers.

use obs_primitives::SignalKind;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// States a signal manager moves through. Transitions only go forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalState {
    /// Manager constructed; no runtime object yet.
    Uninitialized,
    /// Runtime object created and accepting data.
    Initialized,
    /// Resources released; no further data is accepted.
    Shutdown,
}

impl SignalState {
    /// Returns `true` while the signal accepts data.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Initialized)
    }

    /// Returns `true` once the signal has shut down.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Shutdown)
    }
}

/// Events that drive lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Create the runtime object.
    Init,
    /// Release the runtime object.
    Shutdown,
}

/// Lifecycle state holder for one signal.
#[derive(Debug, Clone, Copy)]
pub struct Lifecycle {
    signal: SignalKind,
    state: SignalState,
}

impl Lifecycle {
    /// Lifecycle for the given signal, starting uninitialized.
    #[must_use]
    pub const fn new(signal: SignalKind) -> Self {
        Self {
            signal,
            state: SignalState::Uninitialized,
        }
    }

    /// Owning signal.
    #[must_use]
    pub const fn signal(&self) -> SignalKind {
        self.signal
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SignalState {
        self.state
    }

    /// State `event` would lead to, without applying it.
    ///
    /// Repeating `Init` or `Shutdown` is a no-op. `Shutdown` is accepted from
    /// every state.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] for `Init` after shutdown.
    pub fn check(&self, event: LifecycleEvent) -> LifecycleResult<SignalState> {
        match (self.state, event) {
            (SignalState::Uninitialized | SignalState::Initialized, LifecycleEvent::Init) => {
                Ok(SignalState::Initialized)
            }
            (_, LifecycleEvent::Shutdown) => Ok(SignalState::Shutdown),
            (SignalState::Shutdown, LifecycleEvent::Init) => {
                Err(LifecycleError::InvalidTransition {
                    signal: self.signal,
                    from: self.state,
                    event,
                })
            }
        }
    }

    /// Applies an event, returning the resulting state.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] when [`check`](Self::check)
    /// refuses the event.
    pub fn transition(&mut self, event: LifecycleEvent) -> LifecycleResult<SignalState> {
        let next_state = self.check(event)?;

        if next_state != self.state {
            debug!(
                signal = %self.signal,
                ?self.state,
                ?next_state,
                ?event,
                "signal lifecycle transition"
            );
            self.state = next_state;
        }

        Ok(self.state)
    }
}

/// Errors emitted by the lifecycle controller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Transition was not permitted from the current state.
    #[error("invalid lifecycle transition from {from:?} via {event:?} for {signal} signal")]
    InvalidTransition {
        /// Signal whose transition failed.
        signal: SignalKind,
        /// State prior to the attempted transition.
        from: SignalState,
        /// Event that triggered the failure.
        event: LifecycleEvent,
    },
}

/// Result alias used for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_shutdown() {
        let mut lifecycle = Lifecycle::new(SignalKind::Metrics);

        assert_eq!(lifecycle.state(), SignalState::Uninitialized);
        lifecycle.transition(LifecycleEvent::Init).unwrap();
        assert!(lifecycle.state().is_ready());
        lifecycle.transition(LifecycleEvent::Shutdown).unwrap();
        assert!(lifecycle.state().is_terminal());
    }

    #[test]
    fn repeated_events_are_idempotent() {
        let mut lifecycle = Lifecycle::new(SignalKind::Logs);

        lifecycle.transition(LifecycleEvent::Init).unwrap();
        assert_eq!(
            lifecycle.transition(LifecycleEvent::Init).unwrap(),
            SignalState::Initialized
        );
        lifecycle.transition(LifecycleEvent::Shutdown).unwrap();
        assert_eq!(
            lifecycle.transition(LifecycleEvent::Shutdown).unwrap(),
            SignalState::Shutdown
        );
    }

    #[test]
    fn shutdown_skips_init() {
        let mut lifecycle = Lifecycle::new(SignalKind::Logs);
        lifecycle.transition(LifecycleEvent::Shutdown).unwrap();
        assert!(lifecycle.state().is_terminal());
    }

    #[test]
    fn init_after_shutdown_errors() {
        let mut lifecycle = Lifecycle::new(SignalKind::Metrics);
        lifecycle.transition(LifecycleEvent::Shutdown).unwrap();

        let err = lifecycle
            .transition(LifecycleEvent::Init)
            .expect_err("init should fail after shutdown");

        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }
}
