//! Session lifecycle: owns the microphone, the output, and the connection.

pub mod controller;
pub mod state;

pub use controller::{SessionController, SessionUpdate};
pub use state::SessionState;
