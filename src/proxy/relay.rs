use base64::Engine;

use crate::config::{RelayConfig, UpstreamConfig};
use crate::error::RelayResult;
use crate::protocol::{classify_binary, ClientMessage, InboundFrame, ServerMessage};
use crate::upstream::{Blob, Part, UpstreamCommand, UpstreamEvent};

/// Something to send back down the client socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientBound {
    Control(ServerMessage),
    Audio(Vec<u8>),
}

/// Translation settings for one relay connection
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub input_sample_rate: u32,
    pub default_image_prompt: String,
    /// Lowercased phrase that ends the walk
    pub completion_phrase: String,
}

impl RelaySettings {
    pub fn from_config(relay: &RelayConfig, upstream: &UpstreamConfig) -> Self {
        Self {
            input_sample_rate: relay.input_sample_rate,
            default_image_prompt: relay.default_image_prompt.clone(),
            completion_phrase: upstream.completion_phrase.to_lowercase(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default(), &UpstreamConfig::default())
    }
}

/// Per-connection translator between the client protocol and the upstream session
///
/// Holds the only per-connection state the proxy needs: the AI text spoken
/// so far in the current turn, used to spot the sign-off phrase.
#[derive(Debug)]
pub struct ProxyRelay {
    settings: RelaySettings,
    ai_text: String,
}

impl ProxyRelay {
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            settings,
            ai_text: String::new(),
        }
    }

    /// Binary frame from the client: JSON control if it parses, otherwise mic audio.
    /// Empty audio produces nothing.
    pub fn from_client_binary(&self, bytes: &[u8]) -> Option<UpstreamCommand> {
        match classify_binary::<ClientMessage>(bytes) {
            InboundFrame::Control(message) => Some(self.client_turn(message)),
            InboundFrame::Audio(audio) if audio.is_empty() => None,
            InboundFrame::Audio(audio) => Some(UpstreamCommand::RealtimeInput(Blob {
                mime_type: format!("audio/pcm;rate={}", self.settings.input_sample_rate),
                data: base64::engine::general_purpose::STANDARD.encode(audio),
            })),
        }
    }

    /// Text frame from the client; anything but a known control message is a parse error
    pub fn from_client_text(&self, text: &str) -> RelayResult<UpstreamCommand> {
        let message: ClientMessage = serde_json::from_str(text)?;
        Ok(self.client_turn(message))
    }

    fn client_turn(&self, message: ClientMessage) -> UpstreamCommand {
        match message {
            ClientMessage::Text { text } => UpstreamCommand::user_turn(vec![Part::text(text)]),
            ClientMessage::Image { image_data, text } => {
                let prompt = text
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| self.settings.default_image_prompt.clone());
                UpstreamCommand::user_turn(vec![
                    Part::text(prompt),
                    Part::inline("image/jpeg", image_data),
                ])
            }
        }
    }

    /// Map one upstream event to what the client should see, in order
    pub fn from_upstream(&mut self, event: UpstreamEvent) -> Vec<ClientBound> {
        match event {
            UpstreamEvent::SetupComplete { session_id } => {
                vec![ClientBound::Control(ServerMessage::SetupComplete { session_id })]
            }
            UpstreamEvent::InputTranscription(text) => {
                vec![ClientBound::Control(ServerMessage::InputTranscript { text })]
            }
            UpstreamEvent::OutputTranscription(text) => {
                self.ai_text.push_str(&text);
                vec![ClientBound::Control(ServerMessage::OutputTranscript { text })]
            }
            UpstreamEvent::Audio(bytes) => vec![ClientBound::Audio(bytes)],
            UpstreamEvent::TurnComplete => {
                let mut out = Vec::with_capacity(2);
                if self.turn_signs_off() {
                    out.push(ClientBound::Control(ServerMessage::WalkComplete));
                }
                out.push(ClientBound::Control(ServerMessage::TurnComplete));
                self.ai_text.clear();
                out
            }
            // The AI may resume the same turn, so the text is kept
            UpstreamEvent::Interrupted => vec![ClientBound::Control(ServerMessage::Interrupted)],
            UpstreamEvent::Error(message) => {
                vec![ClientBound::Control(ServerMessage::Error { message })]
            }
            UpstreamEvent::Closed => vec![ClientBound::Control(ServerMessage::Closed)],
        }
    }

    fn turn_signs_off(&self) -> bool {
        !self.settings.completion_phrase.is_empty()
            && self
                .ai_text
                .to_lowercase()
                .contains(&self.settings.completion_phrase)
    }

    /// AI text accumulated in the current turn
    pub fn accumulated_text(&self) -> &str {
        &self.ai_text
    }
}
