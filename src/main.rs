//! LexiScene · Vocabulary Exercise Engine
//!
//! - Axum HTTP + WebSocket API
//! - Scene detection, scoring, and progress reporting against a content backend
//! - Static host page fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT            : u16 (default 3000)
//!   BACKEND_URL     : content backend base, default "http://localhost:5000"
//!                     (scene images, /detect, /user_brick, /user_step, sounds)
//!   ENGINE_CONFIG_PATH : path to TOML config (sound cues)
//!   LOG_LEVEL       : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT      : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod geometry;
mod config;
mod session;
mod scene;
mod detect;
mod progress;
mod state;
mod protocol;
mod logic;
mod routes;

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (session store, backend clients, config).
  let state = AppState::new();

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state);

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "lexiscene_engine", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
