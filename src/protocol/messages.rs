use serde::{Deserialize, Serialize};

/// JSON control message sent by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A single text-only user turn
    Text { text: String },
    /// A single user turn with an inline JPEG and accompanying text
    Image {
        /// Base64 image bytes without any `data:` URL prefix
        #[serde(rename = "imageData")]
        image_data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
}

impl ClientMessage {
    /// Build an image turn, stripping a `data:image/...;base64,` prefix if present
    pub fn image(image_data: &str, text: impl Into<String>) -> Self {
        let base64 = match image_data.split_once(',') {
            Some((_, data)) => data,
            None => image_data,
        };
        ClientMessage::Image {
            image_data: base64.to_string(),
            text: Some(text.into()),
        }
    }
}

/// JSON lifecycle message sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Upstream session is ready
    SetupComplete {
        #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    /// Fragment of what the user said
    InputTranscript { text: String },
    /// Fragment of what the AI is saying
    OutputTranscript { text: String },
    /// The AI finished its turn
    TurnComplete,
    /// The user barged in while the AI was speaking
    Interrupted,
    /// The AI signed off; the walk is over
    WalkComplete,
    Error { message: String },
    Closed,
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::SetupComplete { .. } => "setup_complete",
            ServerMessage::InputTranscript { .. } => "input_transcript",
            ServerMessage::OutputTranscript { .. } => "output_transcript",
            ServerMessage::TurnComplete => "turn_complete",
            ServerMessage::Interrupted => "interrupted",
            ServerMessage::WalkComplete => "walk_complete",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Closed => "closed",
        }
    }
}
