//! Tests for the PCM16 codec, speech clips, and playback scheduling.

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;

use common::FakeOutput;
use voxline::audio::codec::{self, PCM16_SCALE};
use voxline::audio::{
    parse_pcm_mime_type, AudioChunk, EncodedFrame, PlaybackScheduler, SpeechClip,
};
use voxline::error::VoxError;

#[test]
fn encode_clamps_and_rounds_to_pcm16() {
    let frame = codec::encode(&[0.0, 1.0, -1.0, 2.0, -2.0, 0.25], 16_000);
    let samples: Vec<i16> = frame
        .data()
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    assert_eq!(samples, vec![0, 32767, -32768, 32767, -32768, 8192]);
    assert_eq!(frame.mime_type(), "audio/pcm;rate=16000");
}

#[test]
fn decode_recovers_samples_within_one_quantization_step() {
    let input: Vec<f32> = (0..480)
        .map(|i| (i as f32 / 480.0 * std::f32::consts::TAU).sin() * 0.9)
        .collect();
    let chunk = codec::decode(&codec::encode(&input, 16_000), 24_000, 1).expect("decode");

    assert_eq!(chunk.sample_rate(), 24_000);
    let output = chunk.channel(0).expect("mono channel");
    for (before, after) in input.iter().zip(output) {
        assert!((before - after).abs() <= 1.0 / PCM16_SCALE);
    }
}

#[test]
fn decode_deinterleaves_stereo() {
    let bytes: Vec<u8> = [16384i16, -16384, 8192, -8192]
        .iter()
        .flat_map(|sample| sample.to_le_bytes())
        .collect();
    let chunk = codec::decode(&EncodedFrame::new(bytes, 24_000, 2), 24_000, 2).expect("decode");

    assert_eq!(chunk.channel_count(), 2);
    assert_eq!(chunk.frames(), 2);
    assert_eq!(chunk.channel(0), Some(&[0.5, 0.25][..]));
    assert_eq!(chunk.channel(1), Some(&[-0.5, -0.25][..]));
}

#[test]
fn decode_rejects_partial_frames() {
    let cases = [
        (vec![0u8; 3], 1u16),
        (vec![0u8; 6], 2),
        (vec![0u8; 2], 0),
    ];
    for (bytes, channels) in cases {
        let frame = EncodedFrame::new(bytes, 24_000, channels);
        assert!(matches!(
            codec::decode(&frame, 24_000, channels),
            Err(VoxError::Format(_))
        ));
    }
}

#[test]
fn empty_frame_decodes_to_empty_chunk() {
    let chunk = codec::decode(&EncodedFrame::new(Vec::new(), 24_000, 1), 24_000, 1)
        .expect("empty decode");
    assert!(chunk.is_empty());
    assert_eq!(chunk.duration(), Duration::ZERO);
}

#[test]
fn base64_payloads_round_trip_bytes() {
    let frame = codec::encode(&[0.1, -0.2, 0.3], 16_000);
    let text = codec::encode_base64(&frame);
    let parsed = codec::decode_base64(&text, 16_000, 1).expect("base64");
    assert_eq!(parsed, frame);
    assert!(matches!(
        codec::decode_base64("not base64!", 16_000, 1),
        Err(VoxError::Format(_))
    ));
}

#[test]
fn mime_type_parses_rate_and_channels() {
    assert_eq!(
        parse_pcm_mime_type("audio/pcm;rate=24000").expect("mono"),
        (24_000, 1)
    );
    assert_eq!(
        parse_pcm_mime_type("audio/pcm;rate=48000;channels=2").expect("stereo"),
        (48_000, 2)
    );
    assert!(parse_pcm_mime_type("audio/wav").is_err());
}

#[test]
fn speech_clip_reports_duration_and_validates() {
    let clip = SpeechClip::from_pcm_bytes(vec![0; 48_000], 24_000, 1).expect("clip");
    assert_eq!(clip.duration(), Duration::from_secs(1));
    assert_eq!(clip.decode().expect("decode").frames(), 24_000);

    assert!(matches!(
        SpeechClip::from_pcm_bytes(vec![0; 7], 24_000, 1),
        Err(VoxError::Format(_))
    ));
}

#[test]
fn scheduler_never_starts_in_the_past_and_never_overlaps() {
    let mut scheduler = PlaybackScheduler::new(FakeOutput::default());
    let clock_steps_ms = [0u64, 0, 50, 900, 900, 2_000];
    let mut previous_end = Duration::ZERO;

    for step in clock_steps_ms {
        scheduler.output_mut().now = Duration::from_millis(step);
        let handle = scheduler
            .schedule(&AudioChunk::mono(vec![0.0; 7_200], 24_000))
            .expect("schedule");
        assert!(handle.start() >= Duration::from_millis(step));
        assert!(handle.start() >= previous_end);
        assert_eq!(handle.duration(), Duration::from_millis(300));
        previous_end = handle.end();
    }
}
