//! Server-side relay between walk clients and the live AI backend
//!
//! Every websocket connection on `/ws/gemini-live` gets its own upstream
//! session and its own `ProxyRelay`:
//! - client audio → base64 realtime input upstream
//! - client `text` / `image` turns → single complete user turns upstream
//! - upstream audio, transcripts and lifecycle → client frames
//! - AI sign-off phrase → `walk_complete` just before `turn_complete`
//!
//! HTTP side:
//! - GET /health - Health check with active relay count
//! - GET /relays - Active relay connections
//! - GET /relays/:id - One relay connection

mod handlers;
mod relay;
mod routes;
mod state;

pub use relay::{ClientBound, ProxyRelay, RelaySettings};
pub use routes::create_router;
pub use state::{AppState, RelayInfo};
