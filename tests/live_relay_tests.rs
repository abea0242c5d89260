// End-to-end tests: a real client session talking to the relay server over
// websockets, with the AI backend replaced by in-memory channels.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use base64::Engine;
use garden_walk::audio::{codec, AudioBackend, AudioBackendConfig, AudioFrame, AudioSink, ChannelBackend};
use garden_walk::error::{RelayError, RelayResult};
use garden_walk::protocol::LIVE_PATH;
use garden_walk::proxy::{create_router, AppState, RelaySettings};
use garden_walk::session::{
    ConnectionState, DeviceProvider, LifecycleEvent, LiveSession, Message, Role, SessionConfig,
    SessionEvent,
};
use garden_walk::upstream::{Part, UpstreamCommand, UpstreamConnector, UpstreamEvent, UpstreamSession};
use garden_walk::walk::{PhotoFlow, PhotoTransition, Stage};
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Fakes
// ============================================================================

/// The far side of one upstream session
struct FakeUpstream {
    commands: mpsc::UnboundedReceiver<UpstreamCommand>,
    events: mpsc::UnboundedSender<UpstreamEvent>,
}

struct FakeConnector {
    sessions: mpsc::UnboundedSender<FakeUpstream>,
    fail: Option<String>,
}

#[async_trait]
impl UpstreamConnector for FakeConnector {
    async fn connect(&self) -> RelayResult<UpstreamSession> {
        if let Some(message) = &self.fail {
            return Err(RelayError::Upstream(message.clone()));
        }
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let _ = self.sessions.send(FakeUpstream {
            commands: command_rx,
            events: event_tx,
        });
        Ok(UpstreamSession::new(command_tx, event_rx))
    }
}

struct CollectingSink {
    played: Arc<Mutex<Vec<f32>>>,
}

#[async_trait]
impl AudioSink for CollectingSink {
    async fn play(&mut self, samples: &[f32], _sample_rate: u32) -> anyhow::Result<()> {
        self.played.lock().unwrap().extend_from_slice(samples);
        Ok(())
    }

    fn name(&self) -> &str {
        "collecting"
    }
}

/// Hands the test a fresh frame sender for every capture acquisition
struct TestDevices {
    capture_senders: mpsc::UnboundedSender<mpsc::Sender<AudioFrame>>,
    played: Arc<Mutex<Vec<f32>>>,
    fail_capture: bool,
}

#[async_trait]
impl DeviceProvider for TestDevices {
    fn capture(&self, _config: &AudioBackendConfig) -> anyhow::Result<Box<dyn AudioBackend>> {
        if self.fail_capture {
            bail!("microphone permission denied");
        }
        let (tx, rx) = mpsc::channel(16);
        self.capture_senders
            .send(tx)
            .map_err(|_| anyhow!("test dropped capture receiver"))?;
        Ok(Box::new(ChannelBackend::new(rx)))
    }

    async fn output(&self, _sample_rate: u32) -> anyhow::Result<Box<dyn AudioSink>> {
        Ok(Box::new(CollectingSink {
            played: Arc::clone(&self.played),
        }))
    }
}

struct Harness {
    url: String,
    upstreams: mpsc::UnboundedReceiver<FakeUpstream>,
}

async fn start_server(fail: Option<&str>) -> Result<Harness> {
    let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
    let connector = FakeConnector {
        sessions: sessions_tx,
        fail: fail.map(str::to_string),
    };
    let state = AppState::new(
        Arc::new(connector),
        RelaySettings::default(),
        Duration::from_secs(5),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, create_router(state)).await;
    });

    Ok(Harness {
        url: format!("ws://{}{}", addr, LIVE_PATH),
        upstreams: sessions_rx,
    })
}

/// A bare websocket server that accepts one connection and hands it to `serve`
async fn single_connection_server<F, Fut>(serve: F) -> Result<String>
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                serve(ws).await;
            }
        }
    });
    Ok(format!("ws://{}{}", addr, LIVE_PATH))
}

struct Client {
    session: LiveSession,
    captures: mpsc::UnboundedReceiver<mpsc::Sender<AudioFrame>>,
    played: Arc<Mutex<Vec<f32>>>,
}

fn client(url: &str, fail_capture: bool) -> Client {
    let (capture_tx, capture_rx) = mpsc::unbounded_channel();
    let played = Arc::new(Mutex::new(Vec::new()));
    let devices = TestDevices {
        capture_senders: capture_tx,
        played: Arc::clone(&played),
        fail_capture,
    };
    let config = SessionConfig {
        server_url: url.to_string(),
        connect_timeout: Duration::from_secs(2),
        device_timeout: Duration::from_secs(2),
        ..SessionConfig::default()
    };
    Client {
        session: LiveSession::new(config, Arc::new(devices)),
        captures: capture_rx,
        played,
    }
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Result<T> {
    timeout(WAIT, rx.recv())
        .await
        .map_err(|_| anyhow!("timed out waiting"))?
        .ok_or_else(|| anyhow!("channel closed"))
}

/// Collect events up to and including the first one matching `stop`
async fn events_until(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    stop: impl Fn(&SessionEvent) -> bool,
) -> Result<Vec<SessionEvent>> {
    let mut seen = Vec::new();
    loop {
        let event = recv(events).await?;
        let done = stop(&event);
        seen.push(event);
        if done {
            return Ok(seen);
        }
    }
}

async fn wait_until<F, Fut>(check: F) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check().await {
        if tokio::time::Instant::now() > deadline {
            bail!("condition not met in time");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

fn frame(value: f32, len: usize) -> AudioFrame {
    AudioFrame {
        samples: vec![value; len],
        sample_rate: 16000,
        timestamp_ms: 0,
    }
}

fn audio_payload(command: &UpstreamCommand) -> Option<Vec<u8>> {
    match command {
        UpstreamCommand::RealtimeInput(blob) => base64::engine::general_purpose::STANDARD
            .decode(&blob.data)
            .ok(),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_image_turn_forwarded_as_single_complete_turn() -> Result<()> {
    let mut harness = start_server(None).await?;
    let mut client = client(&harness.url, false);

    let _events = client.session.connect().await?;
    assert_eq!(client.session.state(), ConnectionState::Open);
    let mut upstream = recv(&mut harness.upstreams).await?;

    client
        .session
        .send_image("data:image/jpeg;base64,QUJD", "Here is the photo of my plant");

    let command = recv(&mut upstream.commands).await?;
    assert_eq!(
        command,
        UpstreamCommand::user_turn(vec![
            Part::text("Here is the photo of my plant"),
            Part::inline("image/jpeg", "QUJD"),
        ])
    );
    assert!(upstream.commands.try_recv().is_err(), "no audio expected");

    client.session.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn test_walk_complete_precedes_turn_complete() -> Result<()> {
    let mut harness = start_server(None).await?;
    let mut client = client(&harness.url, false);

    let mut events = client.session.connect().await?;
    let upstream = recv(&mut harness.upstreams).await?;

    upstream.events.send(UpstreamEvent::OutputTranscription("That's all, ".to_string()))?;
    upstream.events.send(UpstreamEvent::OutputTranscription("happy gardening!".to_string()))?;
    upstream.events.send(UpstreamEvent::TurnComplete)?;

    let seen = events_until(&mut events, |e| {
        matches!(e, SessionEvent::Lifecycle(LifecycleEvent::TurnComplete))
    })
    .await?;

    let lifecycle: Vec<&LifecycleEvent> = seen
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Lifecycle(l) => Some(l),
            _ => None,
        })
        .collect();
    assert_eq!(
        lifecycle,
        vec![
            &LifecycleEvent::OutputTranscriptDelta {
                text: "That's all, ".to_string()
            },
            &LifecycleEvent::OutputTranscriptDelta {
                text: "happy gardening!".to_string()
            },
            &LifecycleEvent::ConversationComplete,
            &LifecycleEvent::TurnComplete,
        ]
    );
    assert!(seen.contains(&SessionEvent::StageAdvanced(Stage::Complete)));

    assert_eq!(
        client.session.messages().await,
        vec![Message::new(Role::Assistant, "That's all, happy gardening!")]
    );

    client.session.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn test_capture_frames_forwarded_unless_paused() -> Result<()> {
    let mut harness = start_server(None).await?;
    let mut client = client(&harness.url, false);

    let _events = client.session.connect().await?;
    let mut upstream = recv(&mut harness.upstreams).await?;
    let mic = recv(&mut client.captures).await?;

    mic.send(frame(0.5, 160)).await?;
    let first = recv(&mut upstream.commands).await?;
    match &first {
        UpstreamCommand::RealtimeInput(blob) => assert_eq!(blob.mime_type, "audio/pcm;rate=16000"),
        other => bail!("expected audio, got {:?}", other),
    }
    assert_eq!(audio_payload(&first), Some(codec::encode_frame(&[0.5; 160])));

    client.session.pause_capture();
    mic.send(frame(0.25, 160)).await?;
    let session = &client.session;
    wait_until(|| async move { session.stats().await.frames_paused == 1 }).await?;
    client.session.resume_capture();
    mic.send(frame(-0.25, 160)).await?;

    let next = recv(&mut upstream.commands).await?;
    assert_eq!(audio_payload(&next), Some(codec::encode_frame(&[-0.25; 160])));

    wait_until(|| async move { session.stats().await.frames_sent == 2 }).await?;
    assert_eq!(client.session.stats().await.frames_paused, 1);

    client.session.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn test_photo_request_holds_capture_until_declined() -> Result<()> {
    let mut harness = start_server(None).await?;
    let mut client = client(&harness.url, false);

    let mut events = client.session.connect().await?;
    let mut upstream = recv(&mut harness.upstreams).await?;
    let mic = recv(&mut client.captures).await?;

    upstream.events.send(UpstreamEvent::OutputTranscription(
        "Could you send a photo of the leaves?".to_string(),
    ))?;
    upstream.events.send(UpstreamEvent::TurnComplete)?;

    let seen = events_until(&mut events, |e| matches!(e, SessionEvent::MessageCommitted(_))).await?;
    let Some(SessionEvent::MessageCommitted(request)) = seen.last() else {
        bail!("no committed message in {:?}", seen);
    };

    let mut flow = PhotoFlow::new();
    assert_eq!(flow.observe(request.role, &request.content), Some(PhotoTransition::Opened));
    client.session.set_capture_paused(flow.capture_paused());
    assert!(client.session.is_capture_paused());

    // Speech while the user is choosing a photo never reaches the AI
    mic.send(frame(0.3, 160)).await?;
    let session = &client.session;
    wait_until(|| async move { session.stats().await.frames_paused == 1 }).await?;
    assert!(upstream.commands.try_recv().is_err());

    assert_eq!(flow.observe(Role::User, "not right now"), Some(PhotoTransition::Declined));
    client.session.set_capture_paused(flow.capture_paused());

    mic.send(frame(-0.3, 160)).await?;
    let next = recv(&mut upstream.commands).await?;
    assert_eq!(audio_payload(&next), Some(codec::encode_frame(&[-0.3; 160])));

    client.session.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn test_upstream_audio_is_played() -> Result<()> {
    let mut harness = start_server(None).await?;
    let mut client = client(&harness.url, false);

    let mut events = client.session.connect().await?;
    let upstream = recv(&mut harness.upstreams).await?;

    let speech = codec::encode_frame(&[0.25; 480]);
    upstream.events.send(UpstreamEvent::Audio(speech))?;

    let seen = events_until(&mut events, |e| matches!(e, SessionEvent::SpeakingEnded)).await?;
    assert_eq!(
        seen.iter()
            .filter(|e| matches!(e, SessionEvent::SpeakingStarted))
            .count(),
        1
    );

    let played = client.played.lock().unwrap().clone();
    assert_eq!(played.len(), 480);
    assert!((played[0] - 0.25).abs() < 1.0 / 16384.0);

    client.session.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn test_upstream_failure_reaches_client_as_error() -> Result<()> {
    let harness = start_server(Some("GEMINI_API_KEY not set")).await?;
    let mut client = client(&harness.url, false);

    let mut events = client.session.connect().await?;

    let seen = events_until(&mut events, |e| {
        matches!(e, SessionEvent::StateChanged(ConnectionState::Errored))
    })
    .await?;
    assert!(seen.contains(&SessionEvent::Lifecycle(LifecycleEvent::Error {
        message: "GEMINI_API_KEY not set".to_string()
    })));
    assert_eq!(client.session.state(), ConnectionState::Errored);

    // Sends are dropped once errored
    client.session.send_text("hello?");

    client.session.disconnect().await;
    assert_eq!(client.session.state(), ConnectionState::Errored);
    Ok(())
}

#[tokio::test]
async fn test_connection_refused_is_connection_error() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let mut client = client(&format!("ws://{}{}", addr, LIVE_PATH), false);
    match client.session.connect().await {
        Err(RelayError::Connection(_)) => {}
        Err(other) => bail!("expected connection error, got {}", other),
        Ok(_) => bail!("connected to a closed port"),
    }
    assert_eq!(client.session.state(), ConnectionState::Errored);
    Ok(())
}

#[tokio::test]
async fn test_device_failure_is_device_error() -> Result<()> {
    let harness = start_server(None).await?;
    let mut client = client(&harness.url, true);

    match client.session.connect().await {
        Err(RelayError::Device(message)) => assert!(message.contains("permission denied")),
        Err(other) => bail!("expected device error, got {}", other),
        Ok(_) => bail!("connected without a capture device"),
    }
    assert_eq!(client.session.state(), ConnectionState::Errored);
    Ok(())
}

#[tokio::test]
async fn test_upstream_close_closes_session_normally() -> Result<()> {
    let mut harness = start_server(None).await?;
    let mut client = client(&harness.url, false);

    let mut events = client.session.connect().await?;
    let upstream = recv(&mut harness.upstreams).await?;

    upstream.events.send(UpstreamEvent::Closed)?;

    let seen = events_until(&mut events, |e| {
        matches!(
            e,
            SessionEvent::StateChanged(ConnectionState::Closed | ConnectionState::Errored)
        )
    })
    .await?;
    assert!(seen.contains(&SessionEvent::Lifecycle(LifecycleEvent::Closed)));
    assert_eq!(seen.last(), Some(&SessionEvent::StateChanged(ConnectionState::Closed)));
    assert!(!seen
        .iter()
        .any(|e| matches!(e, SessionEvent::Lifecycle(LifecycleEvent::Error { .. }))));
    Ok(())
}

#[tokio::test]
async fn test_disconnect_flushes_pending_text() -> Result<()> {
    let mut harness = start_server(None).await?;
    let mut client = client(&harness.url, false);

    let mut events = client.session.connect().await?;
    let upstream = recv(&mut harness.upstreams).await?;

    upstream.events.send(UpstreamEvent::InputTranscription("It's a fern".to_string()))?;
    events_until(&mut events, |e| {
        matches!(e, SessionEvent::Lifecycle(LifecycleEvent::InputTranscriptDelta { .. }))
    })
    .await?;

    client.session.disconnect().await;
    client.session.disconnect().await;

    assert_eq!(
        client.session.messages().await,
        vec![Message::new(Role::User, "It's a fern")]
    );
    assert_eq!(client.session.state(), ConnectionState::Closed);
    Ok(())
}

#[tokio::test]
async fn test_reconnect_uses_fresh_device_and_session() -> Result<()> {
    let mut harness = start_server(None).await?;
    let mut client = client(&harness.url, false);

    let mut old_events = client.session.connect().await?;
    let _old_upstream = recv(&mut harness.upstreams).await?;
    let old_mic = recv(&mut client.captures).await?;

    client.session.disconnect().await;
    let mut new_events = client.session.connect().await?;
    let mut new_upstream = recv(&mut harness.upstreams).await?;
    let new_mic = recv(&mut client.captures).await?;

    // The old device handle is gone
    assert!(old_mic.send(frame(0.1, 16)).await.is_err());

    // The old event stream ends with its own close; nothing from the new session leaks in
    let mut old_seen = Vec::new();
    while let Ok(Some(event)) = timeout(WAIT, old_events.recv()).await {
        old_seen.push(event);
    }
    assert_eq!(
        old_seen
            .iter()
            .filter(|e| **e == SessionEvent::StateChanged(ConnectionState::Open))
            .count(),
        1
    );
    assert_eq!(
        old_seen.last(),
        Some(&SessionEvent::StateChanged(ConnectionState::Closed))
    );

    new_mic.send(frame(0.2, 16)).await?;
    let command = recv(&mut new_upstream.commands).await?;
    assert_eq!(audio_payload(&command), Some(codec::encode_frame(&[0.2; 16])));

    let _ = new_events.try_recv();
    client.session.disconnect().await;
    Ok(())
}

fn assert_connection_lost(seen: &[SessionEvent]) {
    let lost = SessionEvent::Lifecycle(LifecycleEvent::Error {
        message: "connection lost, please retry".to_string(),
    });
    let error_at = seen.iter().position(|e| *e == lost);
    let errored_at = seen
        .iter()
        .position(|e| *e == SessionEvent::StateChanged(ConnectionState::Errored));
    assert!(error_at.is_some(), "no connection-lost error in {:?}", seen);
    assert!(error_at < errored_at, "error must precede Errored: {:?}", seen);
    assert!(!seen.contains(&SessionEvent::StateChanged(ConnectionState::Closed)));
}

fn is_terminal_state(event: &SessionEvent) -> bool {
    matches!(event, SessionEvent::StateChanged(state) if state.is_terminal())
}

#[tokio::test]
async fn test_abrupt_drop_surfaces_connection_lost() -> Result<()> {
    let url = single_connection_server(|ws| async move { drop(ws) }).await?;
    let mut client = client(&url, false);

    let mut events = client.session.connect().await?;
    let seen = events_until(&mut events, is_terminal_state).await?;

    assert_connection_lost(&seen);
    assert_eq!(client.session.state(), ConnectionState::Errored);

    client.session.disconnect().await;
    assert_eq!(client.session.state(), ConnectionState::Errored);
    Ok(())
}

#[tokio::test]
async fn test_abnormal_close_code_surfaces_connection_lost() -> Result<()> {
    let url = single_connection_server(|mut ws| async move {
        let frame = CloseFrame {
            code: CloseCode::Error,
            reason: Cow::from("internal error"),
        };
        if ws.send(WsMessage::Close(Some(frame))).await.is_ok() {
            while let Some(Ok(_)) = ws.next().await {}
        }
    })
    .await?;
    let mut client = client(&url, false);

    let mut events = client.session.connect().await?;
    let seen = events_until(&mut events, is_terminal_state).await?;

    assert_connection_lost(&seen);
    assert_eq!(client.session.state(), ConnectionState::Errored);
    client.session.disconnect().await;
    Ok(())
}
