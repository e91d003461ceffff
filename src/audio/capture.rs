//! Microphone capture: fixed-size windows, PCM16 encoding, in-order send.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::codec;
use crate::error::{Result, VoxError};
use crate::realtime::transport::FrameSink;

/// A microphone that can be acquired for the lifetime of a session.
#[async_trait]
pub trait AudioInput: Send + Sync {
    /// Request the device. Denied access is [`VoxError::Permission`].
    async fn acquire(&self) -> Result<Box<dyn InputStream>>;
}

/// A live mono input stream.
///
/// Implementations must also release the device when dropped.
#[async_trait]
pub trait InputStream: Send {
    /// Native processing rate of the device.
    fn sample_rate(&self) -> u32;

    /// Next buffer of samples in `[-1, 1]`, of any length. `None` once the
    /// device stops producing.
    async fn next_block(&mut self) -> Option<Vec<f32>>;

    /// Give the device back. Must be idempotent.
    fn release(&mut self);
}

/// Re-windows arbitrary input buffers into constant-size blocks.
#[derive(Debug, Clone)]
pub struct BlockWindow {
    block_size: usize,
    pending: Vec<f32>,
}

impl BlockWindow {
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            pending: Vec::with_capacity(block_size),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Samples buffered towards the next block.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Append samples and return every block completed by them, in order.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        let mut blocks = Vec::new();
        let mut rest = samples;
        while !rest.is_empty() {
            let take = (self.block_size - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.pending.len() == self.block_size {
                blocks.push(std::mem::replace(
                    &mut self.pending,
                    Vec::with_capacity(self.block_size),
                ));
            }
        }
        blocks
    }
}

/// Reported by a capture pipeline when it stops on its own.
#[derive(Debug)]
pub enum CaptureEvent {
    /// Sending failed; capture has stopped and will not retry.
    Failed(VoxError),
    /// The input stream ended.
    Ended,
}

/// Push producer that encodes microphone windows and sends them in order.
pub struct CapturePipeline {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    frames_sent: Arc<AtomicU64>,
}

impl CapturePipeline {
    /// Start capturing from `stream` into `sink`.
    ///
    /// The pipeline owns the stream and releases it when it stops, whether
    /// cancelled, ended, or failed.
    pub fn spawn(
        stream: Box<dyn InputStream>,
        sink: Arc<dyn FrameSink>,
        block_size: usize,
        events_tx: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let frames_sent = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(run_capture(
            stream,
            sink,
            BlockWindow::new(block_size),
            cancel.clone(),
            events_tx,
            Arc::clone(&frames_sent),
        ));
        Self {
            cancel,
            task: Some(task),
            frames_sent,
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop capturing and wait until the microphone has been released.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::warn!(%error, "capture task ended abnormally");
            }
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_capture(
    mut stream: Box<dyn InputStream>,
    sink: Arc<dyn FrameSink>,
    mut window: BlockWindow,
    cancel: CancellationToken,
    events_tx: mpsc::UnboundedSender<CaptureEvent>,
    frames_sent: Arc<AtomicU64>,
) {
    let source_rate = stream.sample_rate();
    tracing::debug!(source_rate, block_size = window.block_size(), "capture started");

    let outcome = 'capture: loop {
        let block = tokio::select! {
            biased;
            _ = cancel.cancelled() => break None,
            block = stream.next_block() => block,
        };
        let Some(block) = block else {
            break Some(CaptureEvent::Ended);
        };

        for samples in window.push(&block) {
            let frame = codec::encode(&samples, source_rate);
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'capture None,
                sent = sink.send(frame) => sent,
            };
            if let Err(error) = sent {
                tracing::error!(%error, "capture send failed");
                break 'capture Some(CaptureEvent::Failed(error));
            }
            frames_sent.fetch_add(1, Ordering::Relaxed);
        }
    };

    stream.release();
    tracing::debug!(
        frames_sent = frames_sent.load(Ordering::Relaxed),
        "capture stopped"
    );
    if let Some(event) = outcome {
        let _ = events_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use super::*;
    use crate::audio::types::EncodedFrame;
    use crate::realtime::transport::ChannelSink;

    struct ScriptedStream {
        blocks: mpsc::UnboundedReceiver<Vec<f32>>,
        released: Arc<AtomicBool>,
    }

    #[async_trait]
    impl InputStream for ScriptedStream {
        fn sample_rate(&self) -> u32 {
            16_000
        }

        async fn next_block(&mut self) -> Option<Vec<f32>> {
            self.blocks.recv().await
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn scripted() -> (
        Box<dyn InputStream>,
        mpsc::UnboundedSender<Vec<f32>>,
        Arc<AtomicBool>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let released = Arc::new(AtomicBool::new(false));
        let stream = ScriptedStream {
            blocks: rx,
            released: Arc::clone(&released),
        };
        (Box::new(stream), tx, released)
    }

    #[test]
    fn block_window_emits_full_blocks_only() {
        let mut window = BlockWindow::new(4);
        assert!(window.push(&[0.1, 0.2, 0.3]).is_empty());
        let blocks = window.push(&[0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);
        assert_eq!(
            blocks,
            vec![vec![0.1, 0.2, 0.3, 0.4], vec![0.5, 0.6, 0.7, 0.8]]
        );
        assert_eq!(window.pending(), 1);
    }

    #[tokio::test]
    async fn frames_are_sent_in_capture_order() {
        let (stream, mic, released) = scripted();
        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<EncodedFrame>();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let mut pipeline =
            CapturePipeline::spawn(stream, Arc::new(ChannelSink::new(frames_tx)), 2, events_tx);

        mic.send(vec![0.0, 0.5, -0.5]).expect("mic open");
        mic.send(vec![1.0]).expect("mic open");

        let first = frames_rx.recv().await.expect("first frame");
        let second = frames_rx.recv().await.expect("second frame");
        assert_eq!(first.data(), codec::encode(&[0.0, 0.5], 16_000).data());
        assert_eq!(second.data(), codec::encode(&[-0.5, 1.0], 16_000).data());
        assert!(pipeline.is_running());

        pipeline.shutdown().await;
        assert!(!pipeline.is_running());
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(pipeline.frames_sent(), 2);
    }

    #[tokio::test]
    async fn send_failure_is_reported_without_retry() {
        let (stream, mic, released) = scripted();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel::<EncodedFrame>();
        drop(frames_rx);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let pipeline =
            CapturePipeline::spawn(stream, Arc::new(ChannelSink::new(frames_tx)), 1, events_tx);

        mic.send(vec![0.25, 0.25]).expect("mic open");

        let event = tokio::time::timeout(Duration::from_secs(1), events_rx.recv())
            .await
            .expect("failure should be reported")
            .expect("event channel open");
        assert!(matches!(event, CaptureEvent::Failed(VoxError::Transport(_))));
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(pipeline.frames_sent(), 0);
    }

    #[tokio::test]
    async fn end_of_stream_is_reported() {
        let (stream, mic, released) = scripted();
        let (frames_tx, _frames_rx) = mpsc::unbounded_channel::<EncodedFrame>();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let _pipeline =
            CapturePipeline::spawn(stream, Arc::new(ChannelSink::new(frames_tx)), 4, events_tx);

        drop(mic);

        let event = events_rx.recv().await.expect("event channel open");
        assert!(matches!(event, CaptureEvent::Ended));
        assert!(released.load(Ordering::SeqCst));
    }
}
