//! Voxline — realtime duplex voice sessions
//!
//! Streams microphone audio to a remote conversational agent as PCM16 frames
//! and plays the agent's audio back gaplessly, cutting it off the moment the
//! agent reports it was interrupted.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use voxline::prelude::*;
//! use voxline::audio::device::{CpalInput, CpalOutput};
//! use voxline::realtime::WebSocketTransport;
//!
//! # async fn example() -> voxline::Result<()> {
//! let config = SessionConfig::builder()
//!     .url("wss://agent.example/v1/live")
//!     .voice("Kore")
//!     .build();
//! let mut session = SessionController::new(
//!     config,
//!     Arc::new(CpalInput::default()),
//!     CpalOutput::open()?,
//!     Arc::new(WebSocketTransport::new()),
//! );
//! session.start().await?;
//! while let Some(update) = session.next_update().await {
//!     println!("{update:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod prelude;
pub mod realtime;
pub mod session;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{Result, VoxError};
