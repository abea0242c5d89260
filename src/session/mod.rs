//! Client side of the duplex relay
//!
//! This module provides the `LiveSession` abstraction that manages:
//! - Capture device acquisition and frame forwarding (with pause/resume)
//! - The websocket to the relay server
//! - Inbound dispatch of audio and JSON control frames
//! - Gapless playback of AI speech with barge-in
//! - Transcript commits and the visible walk stage
//! - Connection lifecycle and statistics

mod config;
mod events;
mod session;
mod state;
mod stats;
mod transcript;

pub use config::SessionConfig;
pub use events::{LifecycleEvent, SessionEvent};
pub use session::{DefaultDevices, DeviceProvider, LiveSession};
pub use state::ConnectionState;
pub use stats::SessionStats;
pub use transcript::{Conversation, Message, Role};
