//! Session lifecycle states.

use strum::Display;

use crate::error::{Result, VoxError};

/// Lifecycle of a session: `Idle → Connecting → Live → Closing → Idle`.
///
/// A connect that fails or is stopped goes `Connecting → Closing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Live,
    Closing,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Live)
                | (Connecting, Closing)
                | (Live, Closing)
                | (Closing, Idle)
        )
    }

    /// The state after moving to `next`, or `InvalidState` for a forbidden edge.
    pub fn transition(self, next: SessionState) -> Result<SessionState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(VoxError::InvalidState(format!(
                "session cannot move from {self} to {next}"
            )))
        }
    }

    /// Holding or acquiring the microphone or transport.
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Live)
    }
}
