pub mod audio;
pub mod config;
pub mod error;
pub mod protocol;
pub mod proxy;
pub mod session;
pub mod upstream;
pub mod walk;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioOutput,
    AudioSink, AudioSource, ChannelBackend, MicrophoneBackend, PacedSink, PlaybackEvent,
    PlaybackScheduler, SpeakerSink, WavSink,
};
pub use config::Config;
pub use error::{RelayError, RelayResult};
pub use protocol::{ClientMessage, ServerMessage};
pub use proxy::{create_router, AppState, ProxyRelay, RelaySettings};
pub use session::{
    ConnectionState, Conversation, DefaultDevices, DeviceProvider, LifecycleEvent, LiveSession,
    Message, Role, SessionConfig, SessionEvent, SessionStats,
};
pub use upstream::{GeminiLiveConnector, UpstreamConnector, UpstreamSession};
pub use walk::{infer_stage, is_affirmative, is_negative, PhotoFlow, Stage, StageTracker};
