//! Audio-related types.

use std::time::Duration;

use crate::error::{Result, VoxError};

/// Rate the remote agent expects for microphone audio.
pub const OUTBOUND_SAMPLE_RATE: u32 = 16_000;

/// Rate the remote agent streams its speech at.
pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Capture window size, in samples.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

const PCM_MIME_TYPE: &str = "audio/pcm";

/// A finite, immutable buffer of de-interleaved samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioChunk {
    /// Single-channel chunk.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    /// Build a chunk from per-channel sample buffers of equal length.
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        let Some(first) = channels.first() else {
            return Err(VoxError::Format("audio chunk needs at least one channel".into()));
        };
        let frames = first.len();
        if channels.iter().any(|channel| channel.len() != frames) {
            return Err(VoxError::Format(
                "audio chunk channels have different lengths".into(),
            ));
        }
        if channels.len() > usize::from(u16::MAX) {
            return Err(VoxError::Format(format!(
                "audio chunk has too many channels ({})",
                channels.len()
            )));
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Playback length at the chunk's own sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = self.frames() as u128 * 1_000_000_000 / u128::from(self.sample_rate);
        Duration::from_nanos(nanos as u64)
    }

    /// Samples in frame order (`L R L R ...`).
    pub fn interleaved(&self) -> Vec<f32> {
        let channel_count = self.channels.len();
        let mut out = Vec::with_capacity(self.frames() * channel_count);
        for frame in 0..self.frames() {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
        out
    }
}

/// Wire representation of audio: little-endian PCM16 bytes plus a format tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    data: Vec<u8>,
    sample_rate: u32,
    channels: u16,
}

impl EncodedFrame {
    pub fn new(data: Vec<u8>, sample_rate: u32, channels: u16) -> Self {
        Self {
            data,
            sample_rate,
            channels,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Format tag, e.g. `audio/pcm;rate=16000`.
    pub fn mime_type(&self) -> String {
        pcm_mime_type(self.sample_rate, self.channels)
    }
}

/// Render a PCM16 format tag. Mono omits the channel parameter.
pub fn pcm_mime_type(sample_rate: u32, channels: u16) -> String {
    if channels == 1 {
        format!("{PCM_MIME_TYPE};rate={sample_rate}")
    } else {
        format!("{PCM_MIME_TYPE};rate={sample_rate};channels={channels}")
    }
}

/// Parse a PCM16 format tag into `(sample_rate, channels)`.
pub fn parse_pcm_mime_type(mime: &str) -> Result<(u32, u16)> {
    let mut parts = mime.split(';').map(str::trim);
    let essence = parts.next().unwrap_or_default();
    if !essence.eq_ignore_ascii_case(PCM_MIME_TYPE) {
        return Err(VoxError::Format(format!("unsupported audio format '{mime}'")));
    }

    let mut sample_rate = None;
    let mut channels = 1u16;
    for param in parts.filter(|part| !part.is_empty()) {
        let (key, value) = param
            .split_once('=')
            .ok_or_else(|| VoxError::Format(format!("malformed format parameter '{param}'")))?;
        match key.trim().to_ascii_lowercase().as_str() {
            "rate" => {
                sample_rate = Some(value.trim().parse::<u32>().map_err(|_| {
                    VoxError::Format(format!("invalid sample rate '{value}'"))
                })?)
            }
            "channels" => {
                channels = value.trim().parse::<u16>().map_err(|_| {
                    VoxError::Format(format!("invalid channel count '{value}'"))
                })?
            }
            _ => {}
        }
    }

    match sample_rate {
        Some(rate) if rate > 0 && channels > 0 => Ok((rate, channels)),
        Some(_) => Err(VoxError::Format(format!("degenerate audio format '{mime}'"))),
        None => Err(VoxError::Format(format!("audio format '{mime}' has no rate"))),
    }
}
