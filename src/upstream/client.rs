use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::messages::{LiveServerMessage, Part, UpstreamCommand, UpstreamEvent};
use super::prompt::SYSTEM_PROMPT;
use crate::config::UpstreamConfig;
use crate::error::{RelayError, RelayResult};

/// Opens upstream sessions for the relay
///
/// The server holds one connector and calls it once per client connection.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(&self) -> RelayResult<UpstreamSession>;
}

/// A live upstream session: commands in, flattened events out
pub struct UpstreamSession {
    commands: mpsc::UnboundedSender<UpstreamCommand>,
    events: mpsc::UnboundedReceiver<UpstreamEvent>,
    reader: Option<JoinHandle<()>>,
}

impl UpstreamSession {
    /// Wrap a pair of channels; the other ends belong to whatever drives the session
    pub fn new(
        commands: mpsc::UnboundedSender<UpstreamCommand>,
        events: mpsc::UnboundedReceiver<UpstreamEvent>,
    ) -> Self {
        Self {
            commands,
            events,
            reader: None,
        }
    }

    /// Queue a command; returns false once the session has gone away
    pub fn send(&self, command: UpstreamCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub async fn next_event(&mut self) -> Option<UpstreamEvent> {
        self.events.recv().await
    }

    /// Close the session; the writer sends a close frame once the command channel drops
    pub fn close(self) {
        debug!("Closing upstream session");
    }
}

impl Drop for UpstreamSession {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Connector for the Gemini Live bidirectional websocket API
pub struct GeminiLiveConnector {
    config: UpstreamConfig,
}

impl GeminiLiveConnector {
    pub fn new(config: UpstreamConfig) -> Self {
        Self { config }
    }

    fn api_key(&self) -> RelayResult<String> {
        std::env::var(&self.config.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| RelayError::Upstream(format!("{} not set", self.config.api_key_env)))
    }

    /// First frame of every session: model, voice, prompt and transcription switches
    pub fn setup_message(&self) -> Value {
        json!({
            "setup": {
                "model": format!("models/{}", self.config.model),
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                    "temperature": self.config.temperature,
                    "speechConfig": {
                        "voiceConfig": {
                            "prebuiltVoiceConfig": { "voiceName": self.config.voice_name }
                        },
                        "languageCode": self.config.language_code,
                    },
                },
                "systemInstruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
                "inputAudioTranscription": {},
                "outputAudioTranscription": {},
            }
        })
    }

    /// User turn that makes the AI open the walk
    pub fn kickoff_command(&self) -> UpstreamCommand {
        UpstreamCommand::user_turn(vec![Part::text(self.config.kickoff_text.clone())])
    }
}

#[async_trait]
impl UpstreamConnector for GeminiLiveConnector {
    async fn connect(&self) -> RelayResult<UpstreamSession> {
        let api_key = self.api_key()?;
        let url = format!("{}?key={}", self.config.endpoint, api_key);

        info!("Connecting to Gemini Live (model={})", self.config.model);

        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let (ws, _) = tokio::time::timeout(timeout, connect_async(url))
            .await
            .map_err(|_| RelayError::Upstream("Timed out connecting to Gemini".to_string()))?
            .map_err(|e| RelayError::Upstream(format!("Failed to connect to Gemini: {}", e)))?;

        let (mut write, mut read) = ws.split();

        write
            .send(Message::Text(self.setup_message().to_string()))
            .await
            .map_err(|e| RelayError::Upstream(format!("Failed to send setup: {}", e)))?;
        write
            .send(Message::Text(self.kickoff_command().to_wire().to_string()))
            .await
            .map_err(|e| RelayError::Upstream(format!("Failed to send kickoff turn: {}", e)))?;

        info!("Gemini Live session created");

        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<UpstreamCommand>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<UpstreamEvent>();

        // Writer: exits (and closes the socket) when the session handle drops
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                let frame = command.to_wire().to_string();
                if let Err(e) = write.send(Message::Text(frame)).await {
                    warn!("Failed to send to Gemini: {}", e);
                    break;
                }
            }
            let _ = write.send(Message::Close(None)).await;
        });

        let reader = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let payload = match message {
                    Ok(Message::Text(text)) => text.into_bytes(),
                    Ok(Message::Binary(bytes)) => bytes,
                    Ok(Message::Close(frame)) => {
                        info!("Gemini connection closed: {:?}", frame);
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        error!("Gemini connection error: {}", e);
                        let _ = event_tx.send(UpstreamEvent::Error("Gemini connection error".to_string()));
                        break;
                    }
                };

                match serde_json::from_slice::<LiveServerMessage>(&payload) {
                    Ok(parsed) => {
                        for event in parsed.into_events() {
                            if event_tx.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => warn!("Ignoring unparseable Gemini message: {}", e),
                }
            }
            let _ = event_tx.send(UpstreamEvent::Closed);
        });

        Ok(UpstreamSession {
            commands: command_tx,
            events: event_rx,
            reader: Some(reader),
        })
    }
}
