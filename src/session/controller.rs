//! Session lifecycle controller.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::state::SessionState;
use crate::audio::capture::{AudioInput, CaptureEvent, CapturePipeline};
use crate::audio::codec;
use crate::audio::playback::{AudioOutput, PlaybackHandle, PlaybackScheduler};
use crate::audio::speech::SpeechClip;
use crate::config::SessionConfig;
use crate::error::{Result, VoxError};
use crate::realtime::events::{InboundEvent, TransportEvent};
use crate::realtime::transport::{Connection, Transport};

/// What the session reports to the UI layer.
#[derive(Debug)]
pub enum SessionUpdate {
    StateChanged(SessionState),
    AudioScheduled(PlaybackHandle),
    Interrupted { stopped: usize },
    /// An inbound chunk was malformed and skipped; the session continues.
    ChunkDropped(VoxError),
    /// The session was torn down because of this error.
    Failed(VoxError),
}

struct LiveSession {
    connection: Box<dyn Connection>,
    capture: CapturePipeline,
    capture_events: Option<mpsc::UnboundedReceiver<CaptureEvent>>,
}

enum Wake {
    Transport(Option<TransportEvent>),
    Capture(Option<CaptureEvent>),
}

/// Drives one realtime voice session at a time.
///
/// The controller is the sole owner of the microphone stream (through the
/// capture pipeline), the output device (through the scheduler) and the
/// connection, and releases all of them on every exit path.
pub struct SessionController<O> {
    id: Uuid,
    config: SessionConfig,
    input: Arc<dyn AudioInput>,
    transport: Arc<dyn Transport>,
    scheduler: PlaybackScheduler<O>,
    state: SessionState,
    live: Option<LiveSession>,
    pending: VecDeque<SessionUpdate>,
}

impl<O: AudioOutput> SessionController<O> {
    pub fn new(
        config: SessionConfig,
        input: Arc<dyn AudioInput>,
        output: O,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            input,
            transport,
            scheduler: PlaybackScheduler::new(output),
            state: SessionState::Idle,
            live: None,
            pending: VecDeque::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &PlaybackScheduler<O> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut PlaybackScheduler<O> {
        &mut self.scheduler
    }

    /// Frames the current capture pipeline has sent, or 0 when not live.
    pub fn frames_sent(&self) -> u64 {
        self.live
            .as_ref()
            .map_or(0, |live| live.capture.frames_sent())
    }

    /// Acquire the microphone, connect, and start streaming.
    ///
    /// Only valid from `Idle`. On failure every acquired resource is
    /// released and the session is back in `Idle` before the error returns.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(VoxError::invalid_state("start", self.state));
        }
        self.config.validate()?;

        self.id = Uuid::new_v4();
        self.enter(SessionState::Connecting);

        let mut stream = match self.input.acquire().await {
            Ok(stream) => stream,
            Err(error) => {
                tracing::warn!(session_id = %self.id, %error, "microphone unavailable");
                self.finish_teardown();
                return Err(error);
            }
        };

        let connection = match self.transport.connect(&self.config).await {
            Ok(connection) => connection,
            Err(error) => {
                tracing::warn!(session_id = %self.id, %error, "transport connect failed");
                stream.release();
                self.finish_teardown();
                return Err(error);
            }
        };

        if stream.sample_rate() != self.config.input_sample_rate {
            tracing::warn!(
                session_id = %self.id,
                device_rate = stream.sample_rate(),
                expected_rate = self.config.input_sample_rate,
                "microphone rate differs from the outbound rate; audio is sent unresampled"
            );
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let capture =
            CapturePipeline::spawn(stream, connection.sink(), self.config.block_size, events_tx);
        self.live = Some(LiveSession {
            connection,
            capture,
            capture_events: Some(events_rx),
        });
        self.enter(SessionState::Live);
        Ok(())
    }

    /// Stop playback, release the microphone, and close the connection.
    ///
    /// A no-op when already idle.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Ok(());
        }
        tracing::debug!(session_id = %self.id, state = %self.state, "stopping session");
        self.teardown().await;
        Ok(())
    }

    /// Wait for the next thing worth telling the UI about.
    ///
    /// Returns `None` once the session is idle and every update has been
    /// delivered.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        loop {
            if let Some(update) = self.pending.pop_front() {
                return Some(update);
            }

            let LiveSession {
                connection,
                capture_events,
                ..
            } = self.live.as_mut()?;
            let wake = tokio::select! {
                event = connection.next_event() => Wake::Transport(event),
                event = recv_capture(capture_events) => Wake::Capture(event),
            };

            match wake {
                Wake::Transport(Some(event)) => self.handle_event(event).await,
                Wake::Transport(None) => self.handle_event(TransportEvent::Closed).await,
                Wake::Capture(Some(event)) => self.handle_capture_event(event).await,
                Wake::Capture(None) => {
                    if let Some(live) = self.live.as_mut() {
                        live.capture_events = None;
                    }
                }
            }
        }
    }

    /// React to one transport event. Events arriving when not `Live` are
    /// ignored.
    pub async fn handle_event(&mut self, event: TransportEvent) {
        if self.state != SessionState::Live {
            tracing::debug!(session_id = %self.id, state = %self.state, ?event, "ignoring event outside live session");
            return;
        }

        match event {
            TransportEvent::Opened => {
                tracing::debug!(session_id = %self.id, "transport opened");
            }
            TransportEvent::Message(InboundEvent::AudioData { data, format }) => {
                self.play_inbound(&data, format);
            }
            TransportEvent::Message(InboundEvent::Interrupted) => {
                let stopped = self.scheduler.interrupt();
                self.pending.push_back(SessionUpdate::Interrupted { stopped });
            }
            TransportEvent::Message(InboundEvent::Unknown) => {
                tracing::trace!(session_id = %self.id, "ignoring unrecognised message");
            }
            TransportEvent::Error { message } => {
                tracing::error!(session_id = %self.id, %message, "transport error");
                self.pending
                    .push_back(SessionUpdate::Failed(VoxError::Transport(message)));
                self.teardown().await;
            }
            TransportEvent::Closed => {
                tracing::debug!(session_id = %self.id, "transport closed by remote");
                self.teardown().await;
            }
        }
    }

    /// Play a complete base64 PCM16 clip through the session's output.
    ///
    /// Allowed in any state; shares the scheduler with live audio.
    pub fn play_clip(
        &mut self,
        data: &str,
        sample_rate: u32,
        channels: u16,
    ) -> Result<PlaybackHandle> {
        let chunk = SpeechClip::from_base64(data, sample_rate, channels)?.decode()?;
        self.scheduler.schedule(&chunk)
    }

    async fn handle_capture_event(&mut self, event: CaptureEvent) {
        if self.state != SessionState::Live {
            return;
        }
        match event {
            CaptureEvent::Failed(error) => {
                tracing::error!(session_id = %self.id, %error, "capture failed");
                self.pending.push_back(SessionUpdate::Failed(error));
                self.teardown().await;
            }
            CaptureEvent::Ended => {
                tracing::warn!(session_id = %self.id, "microphone stream ended");
                self.pending.push_back(SessionUpdate::Failed(VoxError::Device(
                    "microphone stream ended".into(),
                )));
                self.teardown().await;
            }
        }
    }

    /// Decode at the format the agent declared, else the configured one.
    fn play_inbound(&mut self, data: &str, format: Option<(u32, u16)>) {
        let (rate, channels) =
            format.unwrap_or((self.config.output_sample_rate, self.config.output_channels));
        let scheduled = codec::decode_base64(data, rate, channels)
            .and_then(|frame| codec::decode(&frame, rate, channels))
            .and_then(|chunk| self.scheduler.schedule(&chunk));
        match scheduled {
            Ok(handle) => self.pending.push_back(SessionUpdate::AudioScheduled(handle)),
            Err(error) => {
                tracing::warn!(session_id = %self.id, %error, "dropping inbound audio chunk");
                self.pending.push_back(SessionUpdate::ChunkDropped(error));
            }
        }
    }

    async fn teardown(&mut self) {
        self.scheduler.interrupt();
        if let Some(mut live) = self.live.take() {
            live.capture.shutdown().await;
            if let Err(error) = live.connection.close().await {
                tracing::warn!(session_id = %self.id, %error, "closing transport failed");
            }
        }
        self.finish_teardown();
    }

    fn finish_teardown(&mut self) {
        if self.state.is_active() {
            self.enter(SessionState::Closing);
        }
        if self.state == SessionState::Closing {
            self.enter(SessionState::Idle);
        }
    }

    fn enter(&mut self, next: SessionState) {
        match self.state.transition(next) {
            Ok(state) => {
                tracing::debug!(session_id = %self.id, from = %self.state, to = %state, "session state changed");
                self.state = state;
                self.pending.push_back(SessionUpdate::StateChanged(state));
            }
            Err(error) => {
                tracing::warn!(session_id = %self.id, %error, "ignoring invalid state transition");
            }
        }
    }
}

async fn recv_capture(
    events: &mut Option<mpsc::UnboundedReceiver<CaptureEvent>>,
) -> Option<CaptureEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
