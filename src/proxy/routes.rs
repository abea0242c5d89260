use super::handlers;
use super::state::AppState;
use crate::protocol::LIVE_PATH;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Duplex relay socket
        .route(LIVE_PATH, get(handlers::live_socket))
        // Relay queries
        .route("/relays", get(handlers::list_relays))
        .route("/relays/:relay_id", get(handlers::get_relay))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
