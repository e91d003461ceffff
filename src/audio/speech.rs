//! One-shot speech clips (synthesized replies delivered as a single payload).

use std::time::Duration;

use super::codec;
use super::types::{AudioChunk, EncodedFrame};
use crate::error::Result;

/// A complete PCM16 clip, validated to hold whole frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechClip {
    frame: EncodedFrame,
}

impl SpeechClip {
    /// Clip from base64 PCM16, as returned by text-to-speech endpoints.
    pub fn from_base64(data: &str, sample_rate: u32, channels: u16) -> Result<Self> {
        Self::from_frame(codec::decode_base64(data, sample_rate, channels)?)
    }

    /// Clip from raw PCM16 bytes, e.g. read from a `.pcm` file.
    pub fn from_pcm_bytes(bytes: Vec<u8>, sample_rate: u32, channels: u16) -> Result<Self> {
        Self::from_frame(EncodedFrame::new(bytes, sample_rate, channels))
    }

    fn from_frame(frame: EncodedFrame) -> Result<Self> {
        // Validate up front so a bad clip fails before it reaches the scheduler.
        codec::decode(&frame, frame.sample_rate(), frame.channels())?;
        Ok(Self { frame })
    }

    pub fn decode(&self) -> Result<AudioChunk> {
        codec::decode(&self.frame, self.frame.sample_rate(), self.frame.channels())
    }

    pub fn duration(&self) -> Duration {
        let bytes_per_second =
            u128::from(self.frame.sample_rate()) * 2 * u128::from(self.frame.channels());
        if bytes_per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((self.frame.len() as u128 * 1_000_000_000 / bytes_per_second) as u64)
    }

    pub fn frame(&self) -> &EncodedFrame {
        &self.frame
    }
}
