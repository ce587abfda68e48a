//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static host page from `./static` with index fallback
/// - CORS (allow any origin/method/headers), open so exercise pages can embed us
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: AppState) -> Router {
    // Static files with host-page fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/unit", post(http::http_open_unit))
        .route("/api/v1/select", post(http::http_select_prompt))
        .route("/api/v1/hint", post(http::http_request_hint))
        .route("/api/v1/layout", post(http::http_update_layout))
        .route("/api/v1/overlay", get(http::http_get_overlay))
        .route("/api/v1/leave", post(http::http_leave_unit))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Host page fallback
        .fallback_service(static_service)
}
