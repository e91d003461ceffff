//! Unified error classification and recovery.

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Permission,
    Transport,
    Format,
    State,
    Configuration,
    Device,
    Unknown,
}

/// Suggested recovery action for the UI layer.
///
/// The core never retries on its own; these are hints for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    GrantMicrophoneAccess,
    RestartSession,
    DropChunk,
    CheckSessionState,
    CheckConfiguration,
    CheckAudioDevice,
    ContactSupport,
}
