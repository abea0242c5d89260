use std::time::Duration;

use crate::config::ClientConfig;
use crate::protocol::{CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE};

/// Configuration for a client relay session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Websocket URL of the relay endpoint
    pub server_url: String,

    /// Bound on opening the transport
    pub connect_timeout: Duration,

    /// Bound on acquiring the capture device
    pub device_timeout: Duration,

    /// Rate captured audio is sent at (the server declares it upstream)
    pub capture_sample_rate: u32,

    /// Rate AI speech arrives at
    pub playback_sample_rate: u32,

    /// Capture frame size in milliseconds
    pub frame_duration_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:3003/ws/gemini-live".to_string(),
            connect_timeout: Duration::from_secs(10),
            device_timeout: Duration::from_secs(10),
            capture_sample_rate: CAPTURE_SAMPLE_RATE,
            playback_sample_rate: PLAYBACK_SAMPLE_RATE,
            frame_duration_ms: 100,
        }
    }
}

impl From<&ClientConfig> for SessionConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            server_url: config.server_url.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            device_timeout: Duration::from_secs(config.device_timeout_secs),
            capture_sample_rate: config.capture_sample_rate,
            playback_sample_rate: config.playback_sample_rate,
            frame_duration_ms: config.frame_duration_ms,
        }
    }
}
