use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::relay::RelaySettings;
use crate::upstream::UpstreamConnector;

/// Bookkeeping for one live client connection
#[derive(Debug, Clone, Serialize)]
pub struct RelayInfo {
    pub relay_id: Uuid,
    pub connected_at: DateTime<Utc>,
    /// Session id reported by the upstream once setup completes
    pub upstream_session_id: Option<String>,
    pub audio_frames_in: u64,
    pub audio_frames_out: u64,
    pub walk_complete: bool,
}

/// Shared application state for HTTP and websocket handlers
#[derive(Clone)]
pub struct AppState {
    /// Opens one upstream session per client connection
    pub connector: Arc<dyn UpstreamConnector>,
    pub settings: RelaySettings,
    pub ping_interval: Duration,
    /// Active relays (relay_id → info)
    pub relays: Arc<RwLock<HashMap<Uuid, RelayInfo>>>,
}

impl AppState {
    pub fn new(
        connector: Arc<dyn UpstreamConnector>,
        settings: RelaySettings,
        ping_interval: Duration,
    ) -> Self {
        Self {
            connector,
            settings,
            ping_interval,
            relays: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, relay_id: Uuid) {
        let info = RelayInfo {
            relay_id,
            connected_at: Utc::now(),
            upstream_session_id: None,
            audio_frames_in: 0,
            audio_frames_out: 0,
            walk_complete: false,
        };
        self.relays.write().await.insert(relay_id, info);
    }

    pub async fn update<F>(&self, relay_id: Uuid, f: F)
    where
        F: FnOnce(&mut RelayInfo),
    {
        if let Some(info) = self.relays.write().await.get_mut(&relay_id) {
            f(info);
        }
    }

    pub async fn unregister(&self, relay_id: Uuid) -> Option<RelayInfo> {
        self.relays.write().await.remove(&relay_id)
    }

    pub async fn active_count(&self) -> usize {
        self.relays.read().await.len()
    }
}
