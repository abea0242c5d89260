use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

// ============================================================================
// Shared content shapes
// ============================================================================

/// Inline binary payload (base64 `data` plus its MIME type)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

/// One part of a turn: text or inline data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: None,
            inline_data: Some(Blob {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
        }
    }
}

/// A conversational turn
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }
}

// ============================================================================
// Relay → upstream
// ============================================================================

/// Something the relay asks the upstream session to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamCommand {
    /// Streamed microphone audio
    RealtimeInput(Blob),
    /// Discrete turns (text, or text plus image)
    ClientContent {
        turns: Vec<Content>,
        turn_complete: bool,
    },
}

impl UpstreamCommand {
    /// A single complete user turn with the given parts
    pub fn user_turn(parts: Vec<Part>) -> Self {
        UpstreamCommand::ClientContent {
            turns: vec![Content::user(parts)],
            turn_complete: true,
        }
    }

    /// JSON frame as the live API expects it
    pub fn to_wire(&self) -> Value {
        match self {
            UpstreamCommand::RealtimeInput(blob) => json!({
                "realtimeInput": { "audio": blob }
            }),
            UpstreamCommand::ClientContent {
                turns,
                turn_complete,
            } => json!({
                "clientContent": {
                    "turns": turns,
                    "turnComplete": turn_complete,
                }
            }),
        }
    }
}

// ============================================================================
// Upstream → relay
// ============================================================================

/// Flat lifecycle events produced by the upstream session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    SetupComplete { session_id: Option<String> },
    InputTranscription(String),
    OutputTranscription(String),
    /// Raw PCM16 @ 24 kHz, already base64-decoded
    Audio(Vec<u8>),
    TurnComplete,
    Interrupted,
    Error(String),
    Closed,
}

/// Server message of the live API (only the fields the relay uses)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveServerMessage {
    #[serde(default)]
    pub setup_complete: Option<SetupComplete>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupComplete {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

impl LiveServerMessage {
    /// Flatten into relay events, in the order they should reach the client
    pub fn into_events(self) -> Vec<UpstreamEvent> {
        if let Some(setup) = self.setup_complete {
            return vec![UpstreamEvent::SetupComplete {
                session_id: setup.session_id,
            }];
        }

        let mut events = Vec::new();

        if let Some(content) = self.server_content {
            if let Some(text) = content.input_transcription.and_then(|t| t.text) {
                if !text.is_empty() {
                    events.push(UpstreamEvent::InputTranscription(text));
                }
            }

            if let Some(text) = content.output_transcription.and_then(|t| t.text) {
                if !text.is_empty() {
                    events.push(UpstreamEvent::OutputTranscription(text));
                }
            }

            if let Some(turn) = content.model_turn {
                for blob in turn.parts.into_iter().filter_map(|p| p.inline_data) {
                    match base64::engine::general_purpose::STANDARD.decode(&blob.data) {
                        Ok(bytes) if !bytes.is_empty() => events.push(UpstreamEvent::Audio(bytes)),
                        Ok(_) => {}
                        Err(e) => warn!("Dropping undecodable audio part: {}", e),
                    }
                }
            }

            if content.turn_complete {
                events.push(UpstreamEvent::TurnComplete);
            }

            if content.interrupted {
                events.push(UpstreamEvent::Interrupted);
            }
        }

        if self.go_away.is_some() {
            warn!("Upstream announced it will close the session soon");
        }

        events
    }
}
