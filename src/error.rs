//! Error types for the garden walk relay

use thiserror::Error;

/// Result type alias for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors surfaced by the client session and the server proxy.
///
/// A `Parse` error only ever drops the frame it arrived in.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Malformed control message: {0}")]
    Parse(String),
}

impl RelayError {
    /// Message suitable for an `error` event sent to a client.
    pub fn client_message(&self) -> String {
        match self {
            RelayError::Upstream(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Parse(err.to_string())
    }
}
