//! Transport contract consumed by the session controller.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::events::TransportEvent;
use crate::audio::types::EncodedFrame;
use crate::config::SessionConfig;
use crate::error::{Result, VoxError};

/// Outbound path for encoded microphone frames.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Deliver one frame. Fire-and-forget from the caller's point of view;
    /// an error means the link is gone.
    async fn send(&self, frame: EncodedFrame) -> Result<()>;
}

/// An open duplex channel to the remote agent.
#[async_trait]
pub trait Connection: Send {
    /// Shared handle used by the capture pipeline.
    fn sink(&self) -> Arc<dyn FrameSink>;

    /// Next inbound event, or `None` once the connection is fully gone.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Close the connection and wait for its runtime to stop.
    async fn close(&mut self) -> Result<()>;
}

/// Opens connections to a remote agent.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, config: &SessionConfig) -> Result<Box<dyn Connection>>;
}

/// [`FrameSink`] that forwards frames into a channel drained by a connection
/// runtime.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EncodedFrame>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<EncodedFrame>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&self, frame: EncodedFrame) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| VoxError::Transport("outbound audio channel is closed".into()))
    }
}
