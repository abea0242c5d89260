use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::ConnectionState;
use crate::walk::Stage;

/// Statistics about a client session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Current connection state
    pub state: ConnectionState,

    /// When the last `connect` succeeded
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since `started_at`
    pub duration_secs: f64,

    /// Microphone frames sent to the server
    pub frames_sent: u64,

    /// Microphone frames withheld while capture was paused
    pub frames_paused: u64,

    /// AI audio segments received and queued for playback
    pub audio_segments_received: u64,

    /// Number of committed transcript messages
    pub messages_committed: usize,

    /// Visible walk stage
    pub stage: Stage,
}
