use super::state::ConnectionState;
use super::transcript::Message;
use crate::protocol::ServerMessage;
use crate::walk::Stage;

/// Lifecycle signals carried over the relay, in client terms
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    SetupReady { session_id: Option<String> },
    InputTranscriptDelta { text: String },
    OutputTranscriptDelta { text: String },
    TurnComplete,
    Interrupted,
    ConversationComplete,
    Error { message: String },
    Closed,
}

impl From<ServerMessage> for LifecycleEvent {
    fn from(message: ServerMessage) -> Self {
        match message {
            ServerMessage::SetupComplete { session_id } => LifecycleEvent::SetupReady { session_id },
            ServerMessage::InputTranscript { text } => LifecycleEvent::InputTranscriptDelta { text },
            ServerMessage::OutputTranscript { text } => LifecycleEvent::OutputTranscriptDelta { text },
            ServerMessage::TurnComplete => LifecycleEvent::TurnComplete,
            ServerMessage::Interrupted => LifecycleEvent::Interrupted,
            ServerMessage::WalkComplete => LifecycleEvent::ConversationComplete,
            ServerMessage::Error { message } => LifecycleEvent::Error { message },
            ServerMessage::Closed => LifecycleEvent::Closed,
        }
    }
}

/// Everything a session reports to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Lifecycle(LifecycleEvent),
    StateChanged(ConnectionState),
    MessageCommitted(Message),
    StageAdvanced(Stage),
    SpeakingStarted,
    SpeakingEnded,
    /// Barge-in cut the AI off mid-episode
    PlaybackInterrupted,
}
