//! Readiness tracking for the consuming runtime.
//!
//! A plain two-phase state machine: the runtime must be attached *and* the
//! listener must have registered before anything is delivered. Lifecycle
//! callbacks from the host map onto `on_runtime_resumed`,
//! `on_runtime_suspended` and `on_listener_registered`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::ReadinessState;

/// Result of applying a lifecycle signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ReadinessState,
    pub to: ReadinessState,
}

impl Transition {
    /// Whether the state actually changed
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// Whether this transition moved the tracker into `Ready`
    pub fn entered_ready(&self) -> bool {
        self.changed() && self.to == ReadinessState::Ready
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: ReadinessState,
    /// Identity of the current runtime attachment (for log correlation)
    runtime_id: Option<Uuid>,
}

/// Process-local readiness state, created fresh on every process start
#[derive(Debug, Default)]
pub struct ReadinessTracker {
    inner: Mutex<Inner>,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state (pure read)
    pub fn current_state(&self) -> ReadinessState {
        self.lock().state
    }

    /// Identity of the attached runtime, if any
    pub fn runtime_id(&self) -> Option<Uuid> {
        self.lock().runtime_id
    }

    /// Runtime came to the foreground. `Cold` → `RuntimeAttached`, else no-op.
    pub fn on_runtime_resumed(&self) -> Transition {
        let mut inner = self.lock();
        let from = inner.state;

        if from == ReadinessState::Cold {
            let runtime_id = Uuid::new_v4();
            inner.state = ReadinessState::RuntimeAttached;
            inner.runtime_id = Some(runtime_id);
            info!(%runtime_id, "Runtime attached");
        } else {
            debug!(state = %from, "Runtime resumed while already attached");
        }

        Transition {
            from,
            to: inner.state,
        }
    }

    /// Runtime torn down. Always returns to `Cold`; the listener must
    /// register again under the next runtime.
    pub fn on_runtime_suspended(&self) -> Transition {
        let mut inner = self.lock();
        let from = inner.state;

        if let Some(runtime_id) = inner.runtime_id.take() {
            info!(%runtime_id, state = %from, "Runtime detached");
        }
        inner.state = ReadinessState::Cold;

        Transition {
            from,
            to: inner.state,
        }
    }

    /// Listener announced it can receive. Only `RuntimeAttached` → `Ready`;
    /// repeated announcements in `Ready` are no-ops, and announcements while
    /// `Cold` are ignored because no runtime owns the listener.
    pub fn on_listener_registered(&self) -> Transition {
        let mut inner = self.lock();
        let from = inner.state;

        match from {
            ReadinessState::RuntimeAttached => {
                inner.state = ReadinessState::Ready;
                info!(runtime_id = ?inner.runtime_id, "Listener registered, delivery enabled");
            }
            ReadinessState::Ready => {
                debug!("Listener registered again");
            }
            ReadinessState::Cold => {
                debug!("Listener registration ignored: no runtime attached");
            }
        }

        Transition {
            from,
            to: inner.state,
        }
    }
}
