//! Realtime link to the remote agent.

pub mod events;
pub mod transport;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use events::{InboundEvent, TransportEvent};
pub use transport::{ChannelSink, Connection, FrameSink, Transport};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;
