//! Convenience re-exports for common use.

pub use crate::audio::{
    AudioChunk, AudioInput, AudioOutput, EncodedFrame, InputStream, PlaybackHandle,
    PlaybackScheduler, SpeechClip,
};
pub use crate::config::{SessionConfig, VoxConfig};
pub use crate::error::{Result, VoxError};
pub use crate::realtime::{Connection, FrameSink, InboundEvent, Transport, TransportEvent};
pub use crate::session::{SessionController, SessionState, SessionUpdate};
