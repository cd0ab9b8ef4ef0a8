//! Connection lifecycle state machine.
//!
//! The session moves `Disconnected → Connecting → Ready ⇄ Reconnecting`,
//! and only an explicit destroy forces `Disconnected` again. `Ready` is
//! re-enterable: a platform-driven resume goes `Ready → Reconnecting →
//! Ready` without ever passing through `Disconnected`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Lifecycle state of the remote gateway session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session; the resting and terminal state.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Session is live and identified.
    Ready,
    /// Session dropped unexpectedly; the platform is re-establishing it.
    Reconnecting,
}

impl ConnectionState {
    /// Whether a transition from `self` to `next` is legal.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::{Connecting, Disconnected, Ready, Reconnecting};
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Ready)
                | (Connecting, Disconnected)
                | (Ready, Reconnecting)
                | (Ready, Disconnected)
                | (Reconnecting, Ready)
                | (Reconnecting, Disconnected)
        )
    }

    /// Validate and perform a transition.
    pub fn transition_to(self, next: Self) -> Result<Self, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Whether an authenticated session currently exists (possibly mid-resume).
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Ready | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}
