//! Audio: PCM codec, microphone capture, and scheduled playback.

pub mod capture;
pub mod codec;
#[cfg(feature = "device")]
pub mod device;
pub mod playback;
pub mod speech;
pub mod types;

pub use capture::{AudioInput, BlockWindow, CaptureEvent, CapturePipeline, InputStream};
pub use playback::{AudioOutput, PlaybackHandle, PlaybackScheduler, SourceId};
pub use speech::SpeechClip;
pub use types::*;
