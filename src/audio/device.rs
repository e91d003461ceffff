//! cpal-backed microphone and speaker.
//!
//! cpal streams are not `Send` on every platform, so each stream lives on a
//! dedicated thread that holds it until released.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    mpsc as std_mpsc, Arc, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample, StreamConfig};
use tokio::sync::{mpsc, oneshot};

use super::capture::{AudioInput, InputStream};
use super::playback::{AudioOutput, SourceId};
use super::types::{AudioChunk, OUTBOUND_SAMPLE_RATE};
use crate::error::{Result, VoxError};

/// Default system microphone.
#[derive(Debug, Clone)]
pub struct CpalInput {
    preferred_rate: u32,
}

impl Default for CpalInput {
    fn default() -> Self {
        Self::new(OUTBOUND_SAMPLE_RATE)
    }
}

impl CpalInput {
    /// Prefer `preferred_rate` when the device supports it, else use the
    /// device default.
    pub fn new(preferred_rate: u32) -> Self {
        Self { preferred_rate }
    }
}

#[async_trait]
impl AudioInput for CpalInput {
    async fn acquire(&self) -> Result<Box<dyn InputStream>> {
        let (blocks_tx, blocks_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (release_tx, release_rx) = std_mpsc::channel::<()>();
        let preferred_rate = self.preferred_rate;

        let thread = thread::Builder::new()
            .name("voxline-capture".into())
            .spawn(move || {
                let stream = match open_input_stream(preferred_rate, blocks_tx) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(error) => {
                        let _ = ready_tx.send(Err(error));
                        return;
                    }
                };
                // Blocks until released or the handle is dropped.
                let _ = release_rx.recv();
                drop(stream);
            })?;

        let sample_rate = ready_rx
            .await
            .map_err(|_| VoxError::Device("capture thread exited before starting".into()))??;
        tracing::debug!(sample_rate, "microphone acquired");

        Ok(Box::new(CpalInputStream {
            sample_rate,
            blocks_rx,
            release_tx: Some(release_tx),
            thread: Some(thread),
        }))
    }
}

struct CpalInputStream {
    sample_rate: u32,
    blocks_rx: mpsc::UnboundedReceiver<Vec<f32>>,
    release_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

#[async_trait]
impl InputStream for CpalInputStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn next_block(&mut self) -> Option<Vec<f32>> {
        self.blocks_rx.recv().await
    }

    fn release(&mut self) {
        if let Some(release_tx) = self.release_tx.take() {
            let _ = release_tx.send(());
            tracing::debug!("microphone released");
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CpalInputStream {
    fn drop(&mut self) {
        self.release();
    }
}

fn open_input_stream(
    preferred_rate: u32,
    blocks_tx: mpsc::UnboundedSender<Vec<f32>>,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| VoxError::Device("no audio input device available".into()))?;
    let default_config = device
        .default_input_config()
        .map_err(|error| VoxError::Permission(format!("microphone unavailable: {error}")))?;
    let sample_format = default_config.sample_format();

    let supports_preferred = device
        .supported_input_configs()
        .map(|mut configs| {
            configs.any(|range| {
                range.sample_format() == sample_format
                    && range.min_sample_rate().0 <= preferred_rate
                    && range.max_sample_rate().0 >= preferred_rate
            })
        })
        .unwrap_or(false);

    let mut config: StreamConfig = default_config.config();
    if supports_preferred {
        config.sample_rate = cpal::SampleRate(preferred_rate);
    }

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_input::<f32>(&device, &config, blocks_tx),
        cpal::SampleFormat::I16 => build_input::<i16>(&device, &config, blocks_tx),
        cpal::SampleFormat::U16 => build_input::<u16>(&device, &config, blocks_tx),
        other => Err(VoxError::Device(format!(
            "unsupported microphone sample format {other:?}"
        ))),
    }?;
    stream
        .play()
        .map_err(|error| VoxError::Permission(format!("microphone could not start: {error}")))?;
    Ok((stream, config.sample_rate.0))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    blocks_tx: mpsc::UnboundedSender<Vec<f32>>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Downmix to mono.
                let block: Vec<f32> = data
                    .chunks(channels)
                    .map(|frame| {
                        frame.iter().map(|s| s.to_sample::<f32>()).sum::<f32>()
                            / frame.len() as f32
                    })
                    .collect();
                let _ = blocks_tx.send(block);
            },
            |error| tracing::error!(%error, "microphone stream error"),
            None,
        )
        .map_err(|error| VoxError::Permission(format!("microphone could not open: {error}")))
}

struct ScheduledSource {
    id: SourceId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl ScheduledSource {
    fn end_frame(&self, channels: usize) -> u64 {
        self.start_frame + (self.samples.len() / channels) as u64
    }
}

#[derive(Default)]
struct Mixer {
    sources: Vec<ScheduledSource>,
    finished: Vec<SourceId>,
}

/// Default system speaker with a sample-accurate playback clock.
pub struct CpalOutput {
    mixer: Arc<Mutex<Mixer>>,
    frames_rendered: Arc<AtomicU64>,
    sample_rate: u32,
    channels: u16,
    next_id: SourceId,
    release_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalOutput {
    /// Open the default output device.
    pub fn open() -> Result<Self> {
        let mixer = Arc::new(Mutex::new(Mixer::default()));
        let frames_rendered = Arc::new(AtomicU64::new(0));
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (release_tx, release_rx) = std_mpsc::channel::<()>();

        let thread_mixer = Arc::clone(&mixer);
        let thread_frames = Arc::clone(&frames_rendered);
        let thread = thread::Builder::new()
            .name("voxline-playback".into())
            .spawn(move || {
                let stream = match open_output_stream(thread_mixer, thread_frames) {
                    Ok((stream, rate, channels)) => {
                        let _ = ready_tx.send(Ok((rate, channels)));
                        stream
                    }
                    Err(error) => {
                        let _ = ready_tx.send(Err(error));
                        return;
                    }
                };
                let _ = release_rx.recv();
                drop(stream);
            })?;

        let (sample_rate, channels) = ready_rx
            .recv()
            .map_err(|_| VoxError::Device("playback thread exited before starting".into()))??;
        tracing::debug!(sample_rate, channels, "speaker opened");

        Ok(Self {
            mixer,
            frames_rendered,
            sample_rate,
            channels,
            next_id: 1,
            release_tx: Some(release_tx),
            thread: Some(thread),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl AudioOutput for CpalOutput {
    fn current_time(&self) -> Duration {
        let frames = self.frames_rendered.load(Ordering::Relaxed);
        Duration::from_nanos(
            (u128::from(frames) * 1_000_000_000 / u128::from(self.sample_rate)) as u64,
        )
    }

    fn start(&mut self, chunk: &AudioChunk, at: Duration) -> Result<SourceId> {
        let samples = render_for_device(chunk, self.sample_rate, self.channels);
        let start_frame = (at.as_nanos() * u128::from(self.sample_rate) / 1_000_000_000) as u64;
        let id = self.next_id;
        self.next_id += 1;

        let mut mixer = self
            .mixer
            .lock()
            .map_err(|_| VoxError::Device("playback mixer lock poisoned".into()))?;
        mixer.sources.push(ScheduledSource {
            id,
            start_frame,
            samples,
        });
        Ok(id)
    }

    fn stop(&mut self, source: SourceId) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.sources.retain(|scheduled| scheduled.id != source);
        }
    }

    fn drain_finished(&mut self) -> Vec<SourceId> {
        self.mixer
            .lock()
            .map(|mut mixer| std::mem::take(&mut mixer.finished))
            .unwrap_or_default()
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        if let Some(release_tx) = self.release_tx.take() {
            let _ = release_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn open_output_stream(
    mixer: Arc<Mutex<Mixer>>,
    frames_rendered: Arc<AtomicU64>,
) -> Result<(cpal::Stream, u32, u16)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| VoxError::Device("no audio output device available".into()))?;
    let supported = device
        .default_output_config()
        .map_err(|error| VoxError::Device(format!("speaker unavailable: {error}")))?;
    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(VoxError::Device(format!(
            "unsupported speaker sample format {:?}",
            supported.sample_format()
        )));
    }
    let config: StreamConfig = supported.config();
    let channels = usize::from(config.channels.max(1));

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let first_frame = frames_rendered.load(Ordering::Relaxed);
                let frame_count = (data.len() / channels) as u64;
                data.fill(0.0);
                if let Ok(mut mixer) = mixer.lock() {
                    mix_into(&mut mixer, data, channels, first_frame);
                }
                frames_rendered.fetch_add(frame_count, Ordering::Relaxed);
            },
            |error| tracing::error!(%error, "speaker stream error"),
            None,
        )
        .map_err(|error| VoxError::Device(format!("speaker could not open: {error}")))?;
    stream
        .play()
        .map_err(|error| VoxError::Device(format!("speaker could not start: {error}")))?;
    Ok((stream, config.sample_rate.0, config.channels))
}

fn mix_into(mixer: &mut Mixer, data: &mut [f32], channels: usize, first_frame: u64) {
    let last_frame = first_frame + (data.len() / channels) as u64;
    for source in &mixer.sources {
        let source_end = source.end_frame(channels);
        if source.start_frame >= last_frame || source_end <= first_frame {
            continue;
        }
        let from = source.start_frame.max(first_frame);
        let to = source_end.min(last_frame);
        for frame in from..to {
            let out = ((frame - first_frame) as usize) * channels;
            let src = ((frame - source.start_frame) as usize) * channels;
            for channel in 0..channels {
                data[out + channel] += source.samples[src + channel];
            }
        }
    }

    let Mixer { sources, finished } = mixer;
    sources.retain(|source| {
        let done = source.end_frame(channels) <= last_frame;
        if done {
            finished.push(source.id);
        }
        !done
    });
}

/// Resample (linear) and map channels so a chunk can be mixed directly.
fn render_for_device(chunk: &AudioChunk, device_rate: u32, device_channels: u16) -> Vec<f32> {
    let source_channels = usize::from(chunk.channel_count().max(1));
    let device_channels = usize::from(device_channels.max(1));
    let resampled: Vec<Vec<f32>> = (0..source_channels)
        .map(|index| {
            resample_linear(
                chunk.channel(index).unwrap_or_default(),
                chunk.sample_rate(),
                device_rate,
            )
        })
        .collect();

    let frames = resampled.first().map_or(0, Vec::len);
    let mut out = Vec::with_capacity(frames * device_channels);
    for frame in 0..frames {
        for channel in 0..device_channels {
            out.push(resampled[channel % source_channels][frame]);
        }
    }
    out
}

fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }
    let out_len =
        (samples.len() as u64 * u64::from(to_rate) / u64::from(from_rate)).max(1) as usize;
    let step = f64::from(from_rate) / f64::from(to_rate);
    (0..out_len)
        .map(|index| {
            let position = index as f64 * step;
            let left = position.floor() as usize;
            let right = (left + 1).min(samples.len() - 1);
            let fraction = (position - left as f64) as f32;
            let left = left.min(samples.len() - 1);
            samples[left] * (1.0 - fraction) + samples[right] * fraction
        })
        .collect()
}
