//! Error types for voxline.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

use crate::session::SessionState;

/// Primary error type for all voxline operations.
#[derive(Error, Debug)]
pub enum VoxError {
    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VoxError {
    /// Error for an operation invoked from a state that forbids it.
    pub fn invalid_state(operation: &str, state: SessionState) -> Self {
        Self::InvalidState(format!("cannot {operation} while session is {state}"))
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Permission(_) => ErrorCategory::Permission,
            Self::Transport(_) => ErrorCategory::Transport,
            Self::Format(_) => ErrorCategory::Format,
            Self::InvalidState(_) => ErrorCategory::State,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Device(_) => ErrorCategory::Device,
            Self::Io(_) | Self::Serialization(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether the error only affects a single chunk and the session may continue.
    pub fn is_local(&self) -> bool {
        matches!(self.category(), ErrorCategory::Format)
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Permission => RecoverySuggestion::GrantMicrophoneAccess,
            ErrorCategory::Transport => RecoverySuggestion::RestartSession,
            ErrorCategory::Format => RecoverySuggestion::DropChunk,
            ErrorCategory::State => RecoverySuggestion::CheckSessionState,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Device => RecoverySuggestion::CheckAudioDevice,
            ErrorCategory::Unknown => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, VoxError>;
