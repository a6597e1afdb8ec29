//! Readiness states of the consuming application.

use serde::{Deserialize, Serialize};

/// Whether the application can currently receive deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    /// No runtime attached since process start (or since the last teardown)
    Cold,

    /// Runtime alive, listener not yet registered
    RuntimeAttached,

    /// Runtime alive and listener registered
    Ready,
}

impl ReadinessState {
    /// Delivery is only attempted in `Ready`
    pub fn can_deliver(self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl Default for ReadinessState {
    fn default() -> Self {
        Self::Cold
    }
}

impl std::fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Cold => "cold",
            Self::RuntimeAttached => "runtime_attached",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}
