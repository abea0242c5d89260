use super::relay::{ClientBound, ProxyRelay};
use super::state::{AppState, RelayInfo};
use crate::protocol::ServerMessage;
use crate::upstream::UpstreamEvent;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::borrow::Cow;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_relays: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /ws/gemini-live
/// Upgrade to the duplex audio/control socket
pub async fn live_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            active_relays: state.active_count().await,
        }),
    )
}

/// GET /relays
/// List active relay connections, oldest first
pub async fn list_relays(State(state): State<AppState>) -> impl IntoResponse {
    let relays = state.relays.read().await;
    let mut list: Vec<RelayInfo> = relays.values().cloned().collect();
    list.sort_by_key(|info| info.connected_at);
    (StatusCode::OK, Json(list))
}

/// GET /relays/:relay_id
pub async fn get_relay(
    State(state): State<AppState>,
    Path(relay_id): Path<Uuid>,
) -> impl IntoResponse {
    let relays = state.relays.read().await;

    match relays.get(&relay_id) {
        Some(info) => (StatusCode::OK, Json(info.clone())).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Relay {} not found", relay_id),
            }),
        )
            .into_response(),
    }
}

// ============================================================================
// Relay loop
// ============================================================================

fn to_ws_message(out: ClientBound) -> Option<Message> {
    match out {
        ClientBound::Audio(bytes) => Some(Message::Binary(bytes)),
        ClientBound::Control(message) => match serde_json::to_string(&message) {
            Ok(json) => Some(Message::Text(json)),
            Err(e) => {
                warn!("Failed to serialize {} event: {}", message.kind(), e);
                None
            }
        },
    }
}

async fn reject(mut socket: WebSocket, message: String) {
    let event = ServerMessage::Error { message };
    if let Some(frame) = to_ws_message(ClientBound::Control(event)) {
        let _ = socket.send(frame).await;
    }
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::ERROR,
            reason: Cow::from("Failed to connect to Gemini"),
        })))
        .await;
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let relay_id = Uuid::new_v4();
    info!("Client connected: {}", relay_id);

    let mut upstream = match state.connector.connect().await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to open upstream session for {}: {}", relay_id, e);
            reject(socket, e.client_message()).await;
            return;
        }
    };

    state.register(relay_id).await;

    let mut relay = ProxyRelay::new(state.settings.clone());
    let (mut sender, mut receiver) = socket.split();

    let mut ping = tokio::time::interval(state.ping_interval.max(Duration::from_millis(100)));
    ping.tick().await; // first tick fires immediately

    let mut frames_in = 0u64;
    let mut frames_out = 0u64;

    loop {
        tokio::select! {
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Binary(bytes))) => {
                    if let Some(command) = relay.from_client_binary(&bytes) {
                        frames_in += 1;
                        if !upstream.send(command) {
                            debug!("Upstream not connected, dropping audio on {}", relay_id);
                        }
                    }
                }
                Some(Ok(Message::Text(text))) => match relay.from_client_text(&text) {
                    Ok(command) => {
                        if !upstream.send(command) {
                            warn!("Upstream not connected, dropping turn on {}", relay_id);
                        }
                    }
                    Err(e) => warn!("Dropping client message on {}: {}", relay_id, e),
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client disconnected: {}", relay_id);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Client socket error on {}: {}", relay_id, e);
                    break;
                }
            },
            event = upstream.next_event() => {
                let Some(event) = event else { break };
                let upstream_closed = matches!(event, UpstreamEvent::Closed);

                if let UpstreamEvent::SetupComplete { session_id } = &event {
                    info!("Upstream setup complete for {} (session={:?})", relay_id, session_id);
                    let session_id = session_id.clone();
                    state.update(relay_id, |info| info.upstream_session_id = session_id).await;
                }

                let mut client_gone = false;
                for out in relay.from_upstream(event) {
                    match &out {
                        ClientBound::Audio(_) => frames_out += 1,
                        ClientBound::Control(ServerMessage::WalkComplete) => {
                            info!("Walk complete on {}", relay_id);
                            state.update(relay_id, |info| info.walk_complete = true).await;
                        }
                        ClientBound::Control(_) => {}
                    }
                    let Some(message) = to_ws_message(out) else { continue };
                    if sender.send(message).await.is_err() {
                        client_gone = true;
                        break;
                    }
                }

                if upstream_closed || client_gone {
                    break;
                }
            },
            _ = ping.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    debug!("Ping failed, client gone: {}", relay_id);
                    break;
                }
                state
                    .update(relay_id, |info| {
                        info.audio_frames_in = frames_in;
                        info.audio_frames_out = frames_out;
                    })
                    .await;
            }
        }
    }

    let _ = sender
        .send(Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: Cow::from(""),
        })))
        .await;
    upstream.close();

    state.unregister(relay_id).await;
    info!(
        "Relay {} finished ({} audio frames in, {} out)",
        relay_id, frames_in, frames_out
    );
}
