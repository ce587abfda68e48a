//! HTTP endpoint handlers. These are thin wrappers that forward to core logic
//! and answer with the same envelope the WebSocket uses. Detection work still
//! runs after a select or hint; polling the overlay endpoint picks it up.

use axum::{
  extract::{Query, State},
  response::IntoResponse,
  Json,
};
use tracing::instrument;

use crate::logic;
use crate::protocol::{
  HealthOut, HintIn, LayoutIn, LeaveIn, OpenUnitIn, OverlayQuery, SelectIn, ServerWsMessage,
};
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, body), fields(group_id = body.unit.group_id, username = %body.username))]
pub async fn http_open_unit(
  State(state): State<AppState>,
  Json(body): Json<OpenUnitIn>,
) -> impl IntoResponse {
  Json(logic::open_unit(&state, body.username, body.unit).await)
}

#[instrument(level = "info", skip(state, body), fields(session_id = %body.session_id, slot = body.slot))]
pub async fn http_select_prompt(
  State(state): State<AppState>,
  Json(body): Json<SelectIn>,
) -> impl IntoResponse {
  let (reply, job) = logic::select_prompt(&state, &body.session_id, body.slot).await;
  if let Some(job) = job {
    tokio::spawn(async move { logic::run_detection_job(&state, job).await });
  }
  Json(reply)
}

#[instrument(level = "info", skip(state, body), fields(session_id = %body.session_id))]
pub async fn http_request_hint(
  State(state): State<AppState>,
  Json(body): Json<HintIn>,
) -> impl IntoResponse {
  let (reply, job) = logic::request_hint(&state, &body.session_id).await;
  if let Some(job) = job {
    tokio::spawn(async move { logic::run_hint_job(&state, job).await });
  }
  Json(reply)
}

#[instrument(level = "info", skip(state, body), fields(session_id = %body.session_id))]
pub async fn http_update_layout(
  State(state): State<AppState>,
  Json(body): Json<LayoutIn>,
) -> impl IntoResponse {
  Json(logic::update_layout(&state, &body.session_id, body.layout).await)
}

#[instrument(level = "info", skip(state), fields(session_id = %q.session_id))]
pub async fn http_get_overlay(
  State(state): State<AppState>,
  Query(q): Query<OverlayQuery>,
) -> impl IntoResponse {
  match logic::overlay_snapshot(&state, &q.session_id).await {
    Some(overlay) => Json(ServerWsMessage::Overlay { session_id: q.session_id, overlay }),
    None => Json(ServerWsMessage::Error {
      message: format!("Unknown sessionId: {}", q.session_id),
    }),
  }
}

#[instrument(level = "info", skip(state, body), fields(session_id = %body.session_id))]
pub async fn http_leave_unit(
  State(state): State<AppState>,
  Json(body): Json<LeaveIn>,
) -> impl IntoResponse {
  Json(logic::leave_unit(&state, &body.session_id).await)
}
