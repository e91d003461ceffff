//! Shared test helpers: a scripted microphone, an in-memory transport, and a
//! manually clocked output.

#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use voxline::audio::codec;
use voxline::audio::{AudioChunk, AudioInput, AudioOutput, EncodedFrame, InputStream, SourceId};
use voxline::config::SessionConfig;
use voxline::error::{Result, VoxError};
use voxline::realtime::{
    ChannelSink, Connection, FrameSink, InboundEvent, Transport, TransportEvent,
};
use voxline::session::{SessionController, SessionUpdate};

/// A microphone fed by the test.
#[derive(Default)]
pub struct FakeMic {
    deny: AtomicBool,
    acquisitions: AtomicUsize,
    released: Arc<AtomicUsize>,
    feed: Mutex<Option<mpsc::UnboundedSender<Vec<f32>>>>,
}

impl FakeMic {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn denying() -> Arc<Self> {
        let mic = Self::default();
        mic.deny.store(true, Ordering::SeqCst);
        Arc::new(mic)
    }

    /// Deliver one device buffer to the current stream.
    pub fn feed(&self, block: Vec<f32>) {
        if let Some(tx) = self.feed.lock().expect("feed lock").as_ref() {
            let _ = tx.send(block);
        }
    }

    /// Make the current stream stop producing.
    pub fn end(&self) {
        self.feed.lock().expect("feed lock").take();
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioInput for FakeMic {
    async fn acquire(&self) -> Result<Box<dyn InputStream>> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(VoxError::Permission("microphone access denied".into()));
        }
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.feed.lock().expect("feed lock") = Some(tx);
        Ok(Box::new(FakeStream {
            rx,
            released: Arc::clone(&self.released),
            done: false,
        }))
    }
}

struct FakeStream {
    rx: mpsc::UnboundedReceiver<Vec<f32>>,
    released: Arc<AtomicUsize>,
    done: bool,
}

#[async_trait]
impl InputStream for FakeStream {
    fn sample_rate(&self) -> u32 {
        16_000
    }

    async fn next_block(&mut self) -> Option<Vec<f32>> {
        self.rx.recv().await
    }

    fn release(&mut self) {
        if !self.done {
            self.done = true;
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// The far side of a [`FakeTransport`] connection.
pub struct FakeRemote {
    pub events_tx: mpsc::UnboundedSender<TransportEvent>,
    pub frames_rx: mpsc::UnboundedReceiver<EncodedFrame>,
    pub closed: Arc<AtomicBool>,
}

impl FakeRemote {
    pub fn send(&self, event: InboundEvent) {
        let _ = self.events_tx.send(TransportEvent::Message(event));
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// In-memory transport. Each connect parks a [`FakeRemote`] for the test.
#[derive(Default)]
pub struct FakeTransport {
    refuse: AtomicBool,
    connects: AtomicUsize,
    remotes: Mutex<Vec<FakeRemote>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refusing() -> Arc<Self> {
        let transport = Self::default();
        transport.refuse.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn take_remote(&self) -> FakeRemote {
        self.remotes
            .lock()
            .expect("remotes lock")
            .pop()
            .expect("a connection should have been opened")
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, _config: &SessionConfig) -> Result<Box<dyn Connection>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(VoxError::Transport("connection refused".into()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let _ = events_tx.send(TransportEvent::Opened);
        self.remotes.lock().expect("remotes lock").push(FakeRemote {
            events_tx,
            frames_rx,
            closed: Arc::clone(&closed),
        });

        Ok(Box::new(FakeConnection {
            sink: Arc::new(ChannelSink::new(frames_tx)),
            events_rx,
            closed,
        }))
    }
}

struct FakeConnection {
    sink: Arc<ChannelSink>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Connection for FakeConnection {
    fn sink(&self) -> Arc<dyn FrameSink> {
        self.sink.clone()
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events_rx.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Output whose clock only moves when the test moves it.
#[derive(Debug, Default)]
pub struct FakeOutput {
    pub now: Duration,
    pub started: Vec<(SourceId, Duration, usize)>,
    pub stopped: Vec<SourceId>,
}

impl AudioOutput for FakeOutput {
    fn current_time(&self) -> Duration {
        self.now
    }

    fn start(&mut self, chunk: &AudioChunk, at: Duration) -> Result<SourceId> {
        let id = self.started.len() as SourceId + 1;
        self.started.push((id, at, chunk.frames()));
        Ok(id)
    }

    fn stop(&mut self, source: SourceId) {
        self.stopped.push(source);
    }
}

pub type TestSession = SessionController<FakeOutput>;

pub fn session_with(
    config: SessionConfig,
    mic: &Arc<FakeMic>,
    transport: &Arc<FakeTransport>,
) -> TestSession {
    SessionController::new(
        config,
        mic.clone(),
        FakeOutput::default(),
        transport.clone(),
    )
}

/// Base64 PCM16 for `samples`, as the agent would send it.
pub fn pcm_base64(samples: &[f32]) -> String {
    codec::encode_base64(&codec::encode(samples, 24_000))
}

/// Base64 payload holding `ms` of 24 kHz mono silence.
pub fn silence_ms(ms: u64) -> String {
    pcm_base64(&vec![0.0; (ms * 24) as usize])
}

pub fn audio_event(data: String) -> TransportEvent {
    TransportEvent::Message(InboundEvent::audio(data))
}

/// Collect updates until the session goes quiet for a moment or ends.
pub async fn drain_updates(session: &mut TestSession) -> Vec<SessionUpdate> {
    let mut updates = Vec::new();
    while let Ok(Some(update)) =
        tokio::time::timeout(Duration::from_millis(50), session.next_update()).await
    {
        updates.push(update);
    }
    updates
}
