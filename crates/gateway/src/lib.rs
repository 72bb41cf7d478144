//! Inspector gateway: HTTP + WebSocket server that relays a browser page to
//! one A2A agent per session.
//!
//! Lifecycle:
//! 1. Load + validate config
//! 2. Build the agent connector
//! 3. Start HTTP server (health, `/agent-card`, WebSocket upgrade)
//! 4. Each WebSocket connection owns one session

pub mod error;
pub mod markdown;
pub mod normalize;
pub mod server;
pub mod session;
pub mod state;
pub mod ws;

pub use {
    error::{Error, Result},
    server::{build_gateway_app, start_gateway},
    session::{SessionManager, SessionPhase},
    state::GatewayState,
};
