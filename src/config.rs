use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub upstream: UpstreamConfig,
    pub relay: RelayConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "garden-walk".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3003,
        }
    }
}

/// Settings for the conversational-AI backend session
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Websocket endpoint of the live API (API key is appended as `?key=`)
    pub endpoint: String,
    pub model: String,
    pub voice_name: String,
    pub language_code: String,
    pub temperature: f32,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    /// User turn sent right after setup so the AI opens the walk
    pub kickoff_text: String,
    /// Phrase that marks the end of the walk in AI output (matched case-insensitively)
    pub completion_phrase: String,
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string(),
            model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            voice_name: "Kore".to_string(),
            language_code: "en-US".to_string(),
            temperature: 0.8,
            api_key_env: "GEMINI_API_KEY".to_string(),
            kickoff_text: "Start the garden walk".to_string(),
            completion_phrase: "happy gardening".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

/// Per-connection proxy behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Interval between liveness pings sent to the client
    pub ping_interval_secs: u64,
    /// Declared sample rate of client microphone audio
    pub input_sample_rate: u32,
    /// Text sent with an image turn when the client supplies none
    pub default_image_prompt: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 5,
            input_sample_rate: 16000,
            default_image_prompt: "Here is a photo of my plant. What do you see?".to_string(),
        }
    }
}

/// Settings for the client relay session
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    pub connect_timeout_secs: u64,
    pub device_timeout_secs: u64,
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
    pub frame_duration_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:3003/ws/gemini-live".to_string(),
            connect_timeout_secs: 10,
            device_timeout_secs: 10,
            capture_sample_rate: 16000,
            playback_sample_rate: 24000,
            frame_duration_ms: 100,
        }
    }
}

impl Config {
    /// Load `<path>.toml` (optional) layered with `GARDEN_WALK__*` environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("GARDEN_WALK").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
