use super::config::SessionConfig;
use super::events::{LifecycleEvent, SessionEvent};
use super::state::ConnectionState;
use super::stats::SessionStats;
use super::transcript::{Conversation, Message};
use crate::audio::{
    codec, resample_linear, AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame,
    AudioOutput, AudioSink, AudioSource, PlaybackEvent, PlaybackScheduler,
};
use crate::error::{RelayError, RelayResult};
use crate::protocol::{classify_binary, ClientMessage, InboundFrame, ServerMessage};
use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CONNECTION_LOST: &str = "connection lost, please retry";

/// Source of the capture device and the speaker for each `connect`
///
/// Called once per connection so a reconnect never reuses a stale handle.
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    fn capture(&self, config: &AudioBackendConfig) -> Result<Box<dyn AudioBackend>>;
    async fn output(&self, sample_rate: u32) -> Result<Box<dyn AudioSink>>;
}

/// Capture from `source`, play through `output`
#[derive(Debug, Clone)]
pub struct DefaultDevices {
    pub source: AudioSource,
    pub output: AudioOutput,
}

impl Default for DefaultDevices {
    /// Default microphone and speaker
    fn default() -> Self {
        Self {
            source: AudioSource::Microphone(None),
            output: AudioOutput::Speaker(None),
        }
    }
}

#[async_trait]
impl DeviceProvider for DefaultDevices {
    fn capture(&self, config: &AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        AudioBackendFactory::create(self.source.clone(), config.clone())
    }

    async fn output(&self, sample_rate: u32) -> Result<Box<dyn AudioSink>> {
        self.output.open(sample_rate).await
    }
}

enum SessionCommand {
    Send(ClientMessage),
    Disconnect,
}

#[derive(Debug, Default)]
struct Counters {
    frames_sent: AtomicU64,
    frames_paused: AtomicU64,
    segments_received: AtomicU64,
}

struct ActiveSession {
    commands: mpsc::UnboundedSender<SessionCommand>,
    task: JoinHandle<()>,
}

/// A client relay session: one capture device, one websocket, one playback queue
pub struct LiveSession {
    /// Session configuration
    config: SessionConfig,

    /// Capture and output devices
    devices: Arc<dyn DeviceProvider>,

    /// Connection lifecycle state
    state: Arc<watch::Sender<ConnectionState>>,

    /// Mic-paused flag, independent of connection state
    paused: Arc<AtomicBool>,

    /// Transcript of the current (or last) connection
    conversation: Arc<Mutex<Conversation>>,

    counters: Arc<Counters>,

    /// When the last connect succeeded
    started_at: Option<DateTime<Utc>>,

    /// Actor task of the open connection
    active: Option<ActiveSession>,
}

impl LiveSession {
    pub fn new(config: SessionConfig, devices: Arc<dyn DeviceProvider>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            config,
            devices,
            state: Arc::new(state),
            paused: Arc::new(AtomicBool::new(false)),
            conversation: Arc::new(Mutex::new(Conversation::new())),
            counters: Arc::new(Counters::default()),
            started_at: None,
            active: None,
        }
    }

    /// Acquire the capture device and open the transport, concurrently.
    ///
    /// Returns once both are ready; the backend handshake is not awaited.
    /// Any previous connection is torn down first.
    pub async fn connect(&mut self) -> RelayResult<mpsc::UnboundedReceiver<SessionEvent>> {
        self.disconnect().await;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        set_state(&self.state, &events_tx, ConnectionState::Connecting);

        self.paused.store(false, Ordering::SeqCst);
        self.conversation = Arc::new(Mutex::new(Conversation::new()));
        self.counters = Arc::new(Counters::default());

        info!("Connecting live session to {}", self.config.server_url);

        let backend_config = AudioBackendConfig {
            target_sample_rate: self.config.capture_sample_rate,
            buffer_duration_ms: self.config.frame_duration_ms,
        };

        let (device, transport) = tokio::join!(
            acquire_devices(
                self.devices.as_ref(),
                &backend_config,
                self.config.playback_sample_rate,
                self.config.device_timeout,
            ),
            open_transport(&self.config.server_url, self.config.connect_timeout),
        );

        let (backend, frames, sink, ws) = match (device, transport) {
            (Ok((backend, frames, sink)), Ok(ws)) => (backend, frames, sink, ws),
            (Err(e), transport) => {
                if let Ok(mut ws) = transport {
                    let _ = ws.close(None).await;
                }
                return Err(self.fail(&events_tx, e));
            }
            (Ok((mut backend, _, _)), Err(e)) => {
                if let Err(stop_err) = backend.stop().await {
                    warn!("Failed to release capture device: {}", stop_err);
                }
                return Err(self.fail(&events_tx, e));
            }
        };

        let (playback_tx, playback_rx) = mpsc::unbounded_channel();
        let playback = PlaybackScheduler::spawn(sink, self.config.playback_sample_rate, playback_tx);

        set_state(&self.state, &events_tx, ConnectionState::Open);
        self.started_at = Some(Utc::now());

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let actor = SessionActor {
            ws,
            frames,
            capture_live: true,
            backend: Some(backend),
            playback: Some(playback),
            playback_events: playback_rx,
            playback_live: true,
            commands: command_rx,
            events: events_tx,
            state: Arc::clone(&self.state),
            paused: Arc::clone(&self.paused),
            conversation: Arc::clone(&self.conversation),
            counters: Arc::clone(&self.counters),
            capture_sample_rate: self.config.capture_sample_rate,
            remote_closed: false,
        };
        let task = tokio::spawn(actor.run());

        self.active = Some(ActiveSession {
            commands: command_tx,
            task,
        });

        info!("Live session open");
        Ok(events_rx)
    }

    fn fail(&self, events: &mpsc::UnboundedSender<SessionEvent>, err: RelayError) -> RelayError {
        error!("Live session failed to connect: {}", err);
        set_state(&self.state, events, ConnectionState::Errored);
        err
    }

    /// Tear down capture, playback and transport; idempotent
    pub async fn disconnect(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        info!("Disconnecting live session");
        let _ = active.commands.send(SessionCommand::Disconnect);
        if let Err(e) = active.task.await {
            error!("Session task panicked: {}", e);
        }
    }

    fn send(&self, message: ClientMessage) {
        if !self.state().is_open() {
            debug!("Dropping {:?} turn: session not open", message);
            return;
        }
        if let Some(active) = &self.active {
            let _ = active.commands.send(SessionCommand::Send(message));
        }
    }

    /// Send a text-only user turn; dropped unless the session is open
    pub fn send_text(&self, text: &str) {
        self.send(ClientMessage::Text {
            text: text.to_string(),
        });
    }

    /// Send an image turn from base64 data (a `data:` URL prefix is stripped)
    pub fn send_image(&self, image_data: &str, text: &str) {
        self.send(ClientMessage::image(image_data, text));
    }

    /// Send an image turn from raw JPEG bytes
    pub fn send_image_bytes(&self, image: &[u8], text: &str) {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        self.send_image(&encoded, text);
    }

    /// Stop forwarding captured frames; the device and transport stay up
    pub fn pause_capture(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            info!("Capture paused");
        }
    }

    pub fn resume_capture(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            info!("Capture resumed");
        }
    }

    /// Pause or resume to match an external flag, e.g. an open side UI
    pub fn set_capture_paused(&self, paused: bool) {
        if paused {
            self.pause_capture();
        } else {
            self.resume_capture();
        }
    }

    pub fn is_capture_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Committed transcript of the current or last connection
    pub async fn messages(&self) -> Vec<Message> {
        self.conversation.lock().await.messages().to_vec()
    }

    pub async fn summary(&self) -> String {
        self.conversation.lock().await.summary()
    }

    /// Get current session statistics
    pub async fn stats(&self) -> SessionStats {
        let (messages_committed, stage) = {
            let conversation = self.conversation.lock().await;
            (conversation.messages().len(), conversation.stage())
        };

        let duration_secs = self
            .started_at
            .map(|start| Utc::now().signed_duration_since(start).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionStats {
            state: self.state(),
            started_at: self.started_at,
            duration_secs,
            frames_sent: self.counters.frames_sent.load(Ordering::SeqCst),
            frames_paused: self.counters.frames_paused.load(Ordering::SeqCst),
            audio_segments_received: self.counters.segments_received.load(Ordering::SeqCst),
            messages_committed,
            stage,
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = active.commands.send(SessionCommand::Disconnect);
        }
    }
}

fn set_state(
    state: &watch::Sender<ConnectionState>,
    events: &mpsc::UnboundedSender<SessionEvent>,
    next: ConnectionState,
) {
    let previous = state.send_replace(next);
    if previous != next {
        debug!("Session state {} -> {}", previous, next);
        let _ = events.send(SessionEvent::StateChanged(next));
    }
}

async fn acquire_devices(
    devices: &dyn DeviceProvider,
    config: &AudioBackendConfig,
    playback_sample_rate: u32,
    timeout: std::time::Duration,
) -> RelayResult<(Box<dyn AudioBackend>, mpsc::Receiver<AudioFrame>, Box<dyn AudioSink>)> {
    let acquire = async {
        let mut backend = devices.capture(config)?;
        let frames = backend.start().await?;
        let sink = match devices.output(playback_sample_rate).await {
            Ok(sink) => sink,
            Err(e) => {
                let _ = backend.stop().await;
                return Err(e);
            }
        };
        info!("Capture device ready: {}", backend.name());
        Ok::<_, anyhow::Error>((backend, frames, sink))
    };

    match tokio::time::timeout(timeout, acquire).await {
        Ok(Ok(devices)) => Ok(devices),
        Ok(Err(e)) => Err(RelayError::Device(format!("{:#}", e))),
        Err(_) => Err(RelayError::Device(format!(
            "Timed out acquiring capture device after {:?}",
            timeout
        ))),
    }
}

async fn open_transport(url: &str, timeout: std::time::Duration) -> RelayResult<WsStream> {
    match tokio::time::timeout(timeout, connect_async(url)).await {
        Ok(Ok((ws, _))) => Ok(ws),
        Ok(Err(e)) => Err(RelayError::Connection(format!(
            "Failed to connect to {}: {}",
            url, e
        ))),
        Err(_) => Err(RelayError::Connection(format!(
            "Timed out connecting to {} after {:?}",
            url, timeout
        ))),
    }
}

// ============================================================================
// Actor
// ============================================================================

enum Wake {
    Command(Option<SessionCommand>),
    Frame(Option<AudioFrame>),
    Inbound(Option<Result<WsMessage, WsError>>),
    Playback(Option<PlaybackEvent>),
}

/// Owns everything belonging to one open connection
struct SessionActor {
    ws: WsStream,
    frames: mpsc::Receiver<AudioFrame>,
    capture_live: bool,
    backend: Option<Box<dyn AudioBackend>>,
    playback: Option<PlaybackScheduler>,
    playback_events: mpsc::UnboundedReceiver<PlaybackEvent>,
    playback_live: bool,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: Arc<watch::Sender<ConnectionState>>,
    paused: Arc<AtomicBool>,
    conversation: Arc<Mutex<Conversation>>,
    counters: Arc<Counters>,
    capture_sample_rate: u32,
    remote_closed: bool,
}

impl SessionActor {
    async fn run(mut self) {
        debug!("Session task started");

        loop {
            let wake = tokio::select! {
                command = self.commands.recv() => Wake::Command(command),
                frame = self.frames.recv(), if self.capture_live => Wake::Frame(frame),
                inbound = self.ws.next() => Wake::Inbound(inbound),
                event = self.playback_events.recv(), if self.playback_live => Wake::Playback(event),
            };

            match wake {
                Wake::Command(Some(SessionCommand::Send(message))) => {
                    self.send_control(message).await;
                }
                Wake::Command(Some(SessionCommand::Disconnect)) | Wake::Command(None) => break,
                Wake::Frame(Some(frame)) => self.forward_frame(frame).await,
                Wake::Frame(None) => {
                    info!("Capture stream ended");
                    self.capture_live = false;
                }
                Wake::Inbound(inbound) => {
                    if !self.handle_inbound(inbound).await {
                        break;
                    }
                }
                Wake::Playback(Some(event)) => {
                    let event = match event {
                        PlaybackEvent::SpeakingStarted => SessionEvent::SpeakingStarted,
                        PlaybackEvent::SpeakingEnded => SessionEvent::SpeakingEnded,
                        PlaybackEvent::Interrupted => SessionEvent::PlaybackInterrupted,
                    };
                    self.emit(event);
                }
                Wake::Playback(None) => self.playback_live = false,
            }
        }

        self.teardown().await;
        debug!("Session task stopped");
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn is_open(&self) -> bool {
        self.state.borrow().is_open()
    }

    /// Unexpected drop while open: surface an actionable error
    fn connection_lost(&mut self) {
        if self.is_open() {
            warn!("Connection lost");
            self.emit(SessionEvent::Lifecycle(LifecycleEvent::Error {
                message: CONNECTION_LOST.to_string(),
            }));
            set_state(&self.state, &self.events, ConnectionState::Errored);
        }
    }

    async fn send_control(&mut self, message: ClientMessage) {
        if !self.is_open() {
            return;
        }
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize client message: {}", e);
                return;
            }
        };
        if let Err(e) = self.ws.send(WsMessage::Text(json)).await {
            warn!("Failed to send control message: {}", e);
            self.connection_lost();
        }
    }

    async fn forward_frame(&mut self, frame: AudioFrame) {
        if self.paused.load(Ordering::SeqCst) {
            self.counters.frames_paused.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if !self.is_open() || frame.samples.is_empty() {
            return;
        }

        let bytes = if frame.sample_rate == self.capture_sample_rate {
            codec::encode_frame(&frame.samples)
        } else {
            let resampled =
                resample_linear(&frame.samples, frame.sample_rate, self.capture_sample_rate);
            codec::encode_frame(&resampled)
        };

        if let Err(e) = self.ws.send(WsMessage::Binary(bytes)).await {
            warn!("Failed to send audio frame: {}", e);
            self.connection_lost();
            return;
        }
        self.counters.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Single dispatch point for inbound frames. Returns false when the transport is done.
    async fn handle_inbound(&mut self, inbound: Option<Result<WsMessage, WsError>>) -> bool {
        match inbound {
            Some(Ok(WsMessage::Binary(bytes))) => {
                match classify_binary::<ServerMessage>(&bytes) {
                    InboundFrame::Control(message) => self.handle_control(message).await,
                    InboundFrame::Audio(audio) => self.enqueue_audio(&audio),
                }
                true
            }
            Some(Ok(WsMessage::Text(text))) => {
                match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(message) => self.handle_control(message).await,
                    Err(e) => warn!("Dropping malformed control message: {}", RelayError::from(e)),
                }
                true
            }
            Some(Ok(WsMessage::Close(frame))) => {
                let normal = matches!(&frame, Some(f) if f.code == CloseCode::Normal);
                info!("Server closed the connection: {:?}", frame);
                if !normal {
                    self.connection_lost();
                }
                self.remote_closed = true;
                false
            }
            Some(Ok(_)) => true,
            Some(Err(e)) => {
                warn!("Transport error: {}", e);
                self.connection_lost();
                self.remote_closed = true;
                false
            }
            None => {
                self.connection_lost();
                self.remote_closed = true;
                false
            }
        }
    }

    fn enqueue_audio(&mut self, bytes: &[u8]) {
        if !self.is_open() {
            return;
        }
        let samples = codec::decode_frame(bytes);
        if samples.is_empty() {
            return;
        }
        self.counters.segments_received.fetch_add(1, Ordering::Relaxed);
        if let Some(playback) = &self.playback {
            playback.enqueue(samples);
        }
    }

    async fn handle_control(&mut self, message: ServerMessage) {
        debug!("Control message: {}", message.kind());
        let mut conversation = self.conversation.lock().await;

        let mut after: Vec<SessionEvent> = Vec::new();
        let mut before: Vec<SessionEvent> = Vec::new();

        match &message {
            ServerMessage::SetupComplete { session_id } => {
                info!("Upstream session ready: {:?}", session_id);
            }
            ServerMessage::InputTranscript { text } => conversation.push_user_delta(text),
            ServerMessage::OutputTranscript { text } => {
                if let Some(stage) = conversation.push_ai_delta(text) {
                    after.push(SessionEvent::StageAdvanced(stage));
                }
            }
            ServerMessage::TurnComplete => {
                before.extend(conversation.commit_turn().into_iter().map(SessionEvent::MessageCommitted));
                if let Some(stage) = conversation.refresh_stage() {
                    before.push(SessionEvent::StageAdvanced(stage));
                }
            }
            ServerMessage::Interrupted => {
                if let Some(playback) = &self.playback {
                    playback.interrupt();
                }
                before.extend(
                    conversation
                        .commit_interrupted()
                        .into_iter()
                        .map(SessionEvent::MessageCommitted),
                );
                if let Some(stage) = conversation.refresh_stage() {
                    before.push(SessionEvent::StageAdvanced(stage));
                }
            }
            ServerMessage::WalkComplete => {
                info!("Conversation complete");
                if let Some(stage) = conversation.complete() {
                    after.push(SessionEvent::StageAdvanced(stage));
                }
            }
            ServerMessage::Error { message } => {
                error!("Error from server: {}", message);
            }
            ServerMessage::Closed => info!("Upstream session closed"),
        }
        drop(conversation);

        let is_error = matches!(message, ServerMessage::Error { .. });

        for event in before {
            self.emit(event);
        }
        self.emit(SessionEvent::Lifecycle(LifecycleEvent::from(message)));
        for event in after {
            self.emit(event);
        }

        if is_error {
            set_state(&self.state, &self.events, ConnectionState::Errored);
        }
    }

    async fn teardown(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            if let Err(e) = backend.stop().await {
                warn!("Failed to stop {} capture: {}", backend.name(), e);
            }
        }

        if let Some(playback) = self.playback.take() {
            playback.shutdown().await;
        }

        let flushed = self.conversation.lock().await.flush();
        for message in flushed {
            self.emit(SessionEvent::MessageCommitted(message));
        }

        if !self.remote_closed {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: Cow::from(""),
            };
            if let Err(e) = self.ws.close(Some(frame)).await {
                debug!("Close handshake failed: {}", e);
            }
        }

        if *self.state.borrow() != ConnectionState::Errored {
            set_state(&self.state, &self.events, ConnectionState::Closed);
        }
        info!(
            "Live session closed ({} frames sent, {} segments received)",
            self.counters.frames_sent.load(Ordering::Relaxed),
            self.counters.segments_received.load(Ordering::Relaxed)
        );
    }
}
