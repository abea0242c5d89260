//! Conversational-AI backend session
//!
//! The relay talks to the live API through `UpstreamConnector`, which hands
//! back an `UpstreamSession`: a command sender for audio and turns, and a
//! receiver of lifecycle events already flattened from the API's nested
//! message shapes.

pub mod client;
pub mod messages;
pub mod prompt;

pub use client::{GeminiLiveConnector, UpstreamConnector, UpstreamSession};
pub use messages::{Blob, Content, Part, UpstreamCommand, UpstreamEvent};
