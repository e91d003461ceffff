//! PCM16 codec between float samples and the little-endian wire format.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::types::{AudioChunk, EncodedFrame, OUTBOUND_SAMPLE_RATE};
use crate::error::{Result, VoxError};

/// Scale between `[-1, 1]` floats and signed 16-bit integers.
pub const PCM16_SCALE: f32 = 32768.0;

const BYTES_PER_SAMPLE: usize = 2;

/// Quantize mono samples into an outbound frame.
///
/// The frame is always tagged with [`OUTBOUND_SAMPLE_RATE`]; samples are not
/// resampled, so capture devices should run at that rate.
pub fn encode(samples: &[f32], source_rate: u32) -> EncodedFrame {
    if source_rate != OUTBOUND_SAMPLE_RATE {
        tracing::trace!(
            source_rate,
            outbound_rate = OUTBOUND_SAMPLE_RATE,
            "encoding samples captured at a non-outbound rate"
        );
    }

    let mut data = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for &sample in samples {
        data.extend_from_slice(&quantize(sample).to_le_bytes());
    }
    EncodedFrame::new(data, OUTBOUND_SAMPLE_RATE, 1)
}

/// Decode a PCM16 frame into a de-interleaved chunk.
///
/// Fails without producing anything when the byte length does not divide
/// into whole frames of `channels` samples.
pub fn decode(frame: &EncodedFrame, target_rate: u32, channels: u16) -> Result<AudioChunk> {
    if channels == 0 {
        return Err(VoxError::Format("channel count must be at least 1".into()));
    }
    if target_rate == 0 {
        return Err(VoxError::Format("sample rate must be positive".into()));
    }

    let bytes = frame.data();
    let stride = BYTES_PER_SAMPLE * usize::from(channels);
    if bytes.len() % stride != 0 {
        return Err(VoxError::Format(format!(
            "frame of {} bytes does not hold whole PCM16 frames of {channels} channel(s)",
            bytes.len()
        )));
    }

    let frames = bytes.len() / stride;
    let mut out = vec![Vec::with_capacity(frames); usize::from(channels)];
    for frame_bytes in bytes.chunks_exact(stride) {
        for (channel, sample) in frame_bytes.chunks_exact(BYTES_PER_SAMPLE).enumerate() {
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            out[channel].push(f32::from(value) / PCM16_SCALE);
        }
    }
    AudioChunk::from_channels(out, target_rate)
}

/// Base64 text form of a frame's bytes, as carried in JSON messages.
pub fn encode_base64(frame: &EncodedFrame) -> String {
    STANDARD.encode(frame.data())
}

/// Parse base64 PCM16 bytes into a frame with the given format.
pub fn decode_base64(data: &str, sample_rate: u32, channels: u16) -> Result<EncodedFrame> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|error| VoxError::Format(format!("invalid base64 audio payload: {error}")))?;
    Ok(EncodedFrame::new(bytes, sample_rate, channels))
}

fn quantize(sample: f32) -> i16 {
    (sample * PCM16_SCALE)
        .round()
        .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_quantizes_little_endian_and_clamps() {
        let frame = encode(&[0.0, 0.5, -1.0, 1.0, -0.25], OUTBOUND_SAMPLE_RATE);
        let values: Vec<i16> = frame
            .data()
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(values, vec![0, 16_384, -32_768, 32_767, -8_192]);
        assert_eq!(frame.sample_rate(), OUTBOUND_SAMPLE_RATE);
        assert_eq!(frame.channels(), 1);
        assert_eq!(frame.mime_type(), "audio/pcm;rate=16000");
    }

    #[test]
    fn decode_deinterleaves_stereo() {
        let mut bytes = Vec::new();
        for value in [16_384i16, -16_384, 8_192, -8_192] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let chunk = decode(&EncodedFrame::new(bytes, 24_000, 2), 24_000, 2)
            .expect("stereo frame should decode");
        assert_eq!(chunk.channel_count(), 2);
        assert_eq!(chunk.channel(0), Some(&[0.5, 0.25][..]));
        assert_eq!(chunk.channel(1), Some(&[-0.5, -0.25][..]));
    }

    #[test]
    fn decode_rejects_partial_frames() {
        let odd = EncodedFrame::new(vec![0, 1, 2], 24_000, 1);
        assert!(matches!(decode(&odd, 24_000, 1), Err(VoxError::Format(_))));

        let half_stereo = EncodedFrame::new(vec![0; 6], 24_000, 2);
        assert!(matches!(decode(&half_stereo, 24_000, 2), Err(VoxError::Format(_))));
        assert!(matches!(decode(&half_stereo, 24_000, 0), Err(VoxError::Format(_))));
    }

    #[test]
    fn round_trip_stays_within_one_quantization_step() {
        let samples: Vec<f32> = (0..512)
            .map(|i| ((i as f32) * 0.037).sin() * 0.9)
            .chain([1.0, -1.0, 0.0])
            .collect();
        let chunk = decode(&encode(&samples, 16_000), 16_000, 1).expect("round trip decode");
        let decoded = chunk.channel(0).expect("mono channel");
        assert_eq!(decoded.len(), samples.len());
        for (original, restored) in samples.iter().zip(decoded) {
            assert!((original - restored).abs() <= 1.0 / PCM16_SCALE);
        }
    }

    #[test]
    fn base64_helpers_reject_garbage() {
        let frame = encode(&[0.1, -0.1], OUTBOUND_SAMPLE_RATE);
        let text = encode_base64(&frame);
        let parsed = decode_base64(&text, OUTBOUND_SAMPLE_RATE, 1).expect("valid base64");
        assert_eq!(parsed, frame);
        assert!(matches!(
            decode_base64("not base64!", 24_000, 1),
            Err(VoxError::Format(_))
        ));
    }
}
