//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! answered with a single JSON reply. Detection and hint probes finish later
//! and push one extra `overlay` message through the same socket.

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::logic::{self, DetectionJob, HintJob};
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;
use crate::util::trunc_for_log;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
  info!(target: "lexiscene_engine", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Overlay-bearing work queued behind a reply.
enum PushJob {
  Detection(DetectionJob),
  Hint(HintJob),
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(socket: WebSocket, state: AppState) {
  info!(target: "lexiscene_engine", "WebSocket connected");
  let (mut sink, mut stream) = socket.split();

  // Replies and async overlay pushes share one writer task.
  let (tx, mut rx) = mpsc::channel::<Message>(32);
  let writer = tokio::spawn(async move {
    while let Some(msg) = rx.recv().await {
      if let Err(e) = sink.send(msg).await {
        error!(target: "lexiscene_engine", error = %e, "WS send error");
        break;
      }
    }
  });

  // Sessions opened over this socket; forgotten when it drops.
  let mut opened: Vec<String> = Vec::new();

  while let Some(Ok(msg)) = stream.next().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "lexiscene_engine", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state, &tx, &mut opened).await
          }
          Err(e) => {
            warn!(target: "lexiscene_engine", raw = %trunc_for_log(&txt, 200), "WS message did not parse");
            ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }
          }
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });
        if tx.send(Message::Text(out)).await.is_err() {
          break;
        }
      }
      Message::Ping(payload) => { let _ = tx.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }

  for session_id in opened {
    state.remove_session(&session_id).await;
  }
  writer.abort();
  info!(target: "lexiscene_engine", "WebSocket disconnected");
}

#[instrument(level = "info", skip_all)]
async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &AppState,
  tx: &mpsc::Sender<Message>,
  opened: &mut Vec<String>,
) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::OpenUnit { username, unit } => {
      let reply = logic::open_unit(state, username, unit).await;
      if let ServerWsMessage::UnitReady { session } = &reply {
        opened.push(session.session_id.clone());
      }
      reply
    }

    ClientWsMessage::SelectPrompt { session_id, slot } => {
      let (reply, job) = logic::select_prompt(state, &session_id, slot).await;
      if let Some(job) = job {
        spawn_push(state.clone(), tx.clone(), PushJob::Detection(job));
      }
      reply
    }

    ClientWsMessage::RequestHint { session_id } => {
      let (reply, job) = logic::request_hint(state, &session_id).await;
      if let Some(job) = job {
        spawn_push(state.clone(), tx.clone(), PushJob::Hint(job));
      }
      reply
    }

    ClientWsMessage::UpdateLayout { session_id, layout } => {
      logic::update_layout(state, &session_id, layout).await
    }

    ClientWsMessage::LeaveUnit { session_id } => {
      opened.retain(|id| id != &session_id);
      logic::leave_unit(state, &session_id).await
    }
  }
}

/// Run overlay work off the message loop; push the result when it lands.
/// Stale or empty outcomes push nothing.
fn spawn_push(state: AppState, tx: mpsc::Sender<Message>, job: PushJob) {
  tokio::spawn(async move {
    let push = match job {
      PushJob::Detection(job) => logic::run_detection_job(&state, job).await,
      PushJob::Hint(job) => logic::run_hint_job(&state, job).await,
    };
    if let Some(push) = push {
      if let Ok(out) = serde_json::to_string(&push) {
        let _ = tx.send(Message::Text(out)).await;
      }
    }
  });
}
