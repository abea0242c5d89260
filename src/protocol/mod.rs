//! Wire protocol between a walk client and the relay server
//!
//! One websocket carries both directions:
//! - client → server: binary PCM16 mono @ 16 kHz, or JSON `text` / `image` turns
//! - server → client: binary PCM16 mono @ 24 kHz, or JSON lifecycle events
//!
//! Some intermediaries deliver text frames as binary, so binary payloads that
//! look like JSON are parsed speculatively before being treated as audio.

pub mod frame;
pub mod messages;

pub use frame::{classify_binary, InboundFrame};
pub use messages::{ClientMessage, ServerMessage};

/// Path of the duplex endpoint
pub const LIVE_PATH: &str = "/ws/gemini-live";

/// Sample rate of client microphone audio on the wire
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Sample rate of AI speech on the wire
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;
