//! Exercise flow glue between the protocol and the session state machine.
//!
//! This includes:
//!   - Opening and closing sessions (shuffle on open, forget on leave)
//!   - Applying prompt taps, spawning the score report on the completing tap
//!   - Hint charging and probe planning
//!   - Detection jobs: run without any lock held, re-enter the store through
//!     the ticket check, stale results vanish silently

use tracing::{info, instrument, warn};

use crate::domain::{ExerciseUnit, PromptTag, ShownDetection};
use crate::geometry::SceneLayout;
use crate::protocol::{self, HintView, OverlayView, ServerWsMessage, SoundView};
use crate::scene::ScenePayload;
use crate::session::{ExerciseSession, HintProbe, HintStart, Ticket};
use crate::state::AppState;
use crate::util::join_url;
use std::sync::Arc;

/// Detection work for one correct selection, run after the reply is sent.
#[derive(Debug)]
pub struct DetectionJob {
  pub session_id: String,
  pub ticket: Ticket,
  pub target: String,
}

/// Hint probing work. Probes run in order; the first match wins, a full miss
/// clears the overlay.
#[derive(Debug)]
pub struct HintJob {
  pub session_id: String,
  pub ticket: Ticket,
  pub probes: Vec<HintProbe>,
}

#[instrument(level = "info", skip(state, unit), fields(group_id = unit.group_id, username = %username))]
pub async fn open_unit(state: &AppState, username: String, unit: ExerciseUnit) -> ServerWsMessage {
  let session = ExerciseSession::new(unit, username, &mut rand::thread_rng());
  let view = protocol::session_view(&session, Some(cue(state, &state.config.sounds.unit_loaded)));
  let session_id = state.insert_session(session).await;
  info!(target: "lexiscene_engine", session_id = %session_id, "Unit opened.");
  ServerWsMessage::UnitReady { session: view }
}

/// Record a prompt tap. On the completing tap the score report is spawned off
/// to the progress backend; on a described correct tap a detection job is
/// returned for the caller to run.
#[instrument(level = "info", skip(state), fields(session_id = %session_id, slot))]
pub async fn select_prompt(
  state: &AppState,
  session_id: &str,
  slot: usize,
) -> (ServerWsMessage, Option<DetectionJob>) {
  let mut sessions = state.sessions.write().await;
  let Some(entry) = sessions.get_mut(session_id) else {
    return (unknown_session(session_id), None);
  };

  let outcome = match entry.session.select(slot) {
    Ok(outcome) => outcome,
    Err(e) => return (ServerWsMessage::Error { message: e.to_string() }, None),
  };

  if outcome.completed_now {
    info!(
      target: "lexiscene_engine",
      score = entry.session.final_score(),
      "Unit completed."
    );
    if let Some(report) = entry.session.take_submission() {
      match state.progress.clone() {
        Some(progress) => {
          tokio::spawn(async move { progress.submit_score(&report).await });
        }
        None => {
          warn!(target: "lexiscene_engine", "No progress backend; score kept local.");
        }
      }
    }
  }

  let job = if outcome.run_detection {
    entry.session.prompt_at(slot).map(|p| p.description.clone()).map(|target| DetectionJob {
      session_id: session_id.to_string(),
      ticket: entry.session.issue_ticket(),
      target,
    })
  } else {
    None
  };

  let sound = if outcome.tag == PromptTag::Correct {
    cue(state, &state.config.sounds.correct)
  } else {
    cue(state, &state.config.sounds.incorrect)
  };
  let view = protocol::selection_view(&entry.session, slot, &outcome, sound);
  (ServerWsMessage::Selection { selection: view }, job)
}

/// Ask for a hint. Refusals (spent, or nothing left to reveal) cost nothing;
/// an accepted hint is charged here, before any probe runs.
#[instrument(level = "info", skip(state), fields(session_id = %session_id))]
pub async fn request_hint(
  state: &AppState,
  session_id: &str,
) -> (ServerWsMessage, Option<HintJob>) {
  let mut sessions = state.sessions.write().await;
  let Some(entry) = sessions.get_mut(session_id) else {
    return (unknown_session(session_id), None);
  };

  let (charged, job) = match entry.session.begin_hint() {
    HintStart::Probe(probes) => {
      info!(target: "lexiscene_engine", probes = probes.len(), "Hint accepted.");
      let job = HintJob {
        session_id: session_id.to_string(),
        ticket: entry.session.issue_ticket(),
        probes,
      };
      (true, Some(job))
    }
    HintStart::NothingToReveal => {
      info!(target: "lexiscene_engine", "Hint refused: nothing left to reveal.");
      (false, None)
    }
    HintStart::Exhausted => {
      info!(target: "lexiscene_engine", "Hint refused: uses spent.");
      (false, None)
    }
  };

  let view = HintView {
    session_id: session_id.to_string(),
    charged,
    hints_used: entry.session.hints_used(),
    hints_left: entry.session.hints_left(),
    probing: job.is_some(),
  };
  (ServerWsMessage::Hint { hint: view }, job)
}

/// Take the host's current image/container rectangles and answer with the
/// overlay re-projected through them.
#[instrument(level = "debug", skip(state, layout), fields(session_id = %session_id))]
pub async fn update_layout(
  state: &AppState,
  session_id: &str,
  layout: SceneLayout,
) -> ServerWsMessage {
  let mut sessions = state.sessions.write().await;
  let Some(entry) = sessions.get_mut(session_id) else {
    return unknown_session(session_id);
  };
  entry.session.set_layout(layout);
  ServerWsMessage::Overlay {
    session_id: session_id.to_string(),
    overlay: protocol::overlay_view(&entry.session),
  }
}

/// Forget a session. Leaving never touches the progress backend; reports go
/// out on the completing tap alone.
#[instrument(level = "info", skip(state), fields(session_id = %session_id))]
pub async fn leave_unit(state: &AppState, session_id: &str) -> ServerWsMessage {
  if state.remove_session(session_id).await {
    info!(target: "lexiscene_engine", "Unit closed.");
  } else {
    warn!(target: "lexiscene_engine", "Close for unknown session; nothing to do.");
  }
  ServerWsMessage::UnitClosed { session_id: session_id.to_string() }
}

/// Run one detection query and apply the result. Every failure shape (no
/// detector, no scene bytes, miss, network error) applies as "nothing
/// detected" and clears the overlay. `None` means there is nothing to push:
/// the session is gone or the ticket went stale.
#[instrument(level = "info", skip(state, job), fields(session_id = %job.session_id, target = %job.target))]
pub async fn run_detection_job(state: &AppState, job: DetectionJob) -> Option<ServerWsMessage> {
  let mut shown = None;
  if let Some(detector) = state.detector.clone() {
    if let Some(scene) = fetch_scene(state, &job.session_id).await {
      shown = detector
        .locate(&scene, &job.target)
        .await
        .map(|detection| ShownDetection { detection, hide_label: false });
    }
  } else {
    warn!(target: "lexiscene_engine", "No detection backend; overlay cleared.");
  }
  publish_overlay(state, &job.session_id, job.ticket, shown).await
}

/// Probe hint candidates in order until one locates. The winning box is shown
/// without its label; a full miss (or an empty probe list) clears the overlay.
#[instrument(level = "info", skip(state, job), fields(session_id = %job.session_id, probes = job.probes.len()))]
pub async fn run_hint_job(state: &AppState, job: HintJob) -> Option<ServerWsMessage> {
  let mut shown = None;
  if !job.probes.is_empty() {
    if let Some(detector) = state.detector.clone() {
      if let Some(scene) = fetch_scene(state, &job.session_id).await {
        for probe in &job.probes {
          if let Some(detection) = detector.locate(&scene, &probe.target).await {
            info!(target: "lexiscene_engine", slot = probe.slot, "Hint probe matched.");
            shown = Some(ShownDetection { detection, hide_label: true });
            break;
          }
        }
      }
    } else {
      warn!(target: "lexiscene_engine", "No detection backend; hint probes skipped.");
    }
  }
  publish_overlay(state, &job.session_id, job.ticket, shown).await
}

/// Current overlay snapshot, for hosts that poll over HTTP instead of holding
/// a socket open. Outer `None` means the session is unknown.
pub async fn overlay_snapshot(state: &AppState, session_id: &str) -> Option<Option<OverlayView>> {
  let sessions = state.sessions.read().await;
  sessions.get(session_id).map(|entry| protocol::overlay_view(&entry.session))
}

/// Scene bytes for a session, from cache or fetched once and cached.
async fn fetch_scene(state: &AppState, session_id: &str) -> Option<Arc<ScenePayload>> {
  if let Some(hit) = state.cached_scene(session_id).await {
    return Some(hit);
  }
  let image_ref = {
    let sessions = state.sessions.read().await;
    sessions.get(session_id)?.session.unit().image_url.clone()
  };
  let Some(fetcher) = state.scenes.clone() else {
    warn!(target: "lexiscene_engine", "No scene fetcher; detection needs image bytes.");
    return None;
  };
  match fetcher.fetch(&image_ref).await {
    Ok(payload) => {
      let payload = Arc::new(payload);
      state.store_scene(session_id, payload.clone()).await;
      Some(payload)
    }
    Err(e) => {
      warn!(target: "lexiscene_engine", error = %e, "Scene fetch failed; overlay skipped.");
      None
    }
  }
}

/// Apply a job result under the ticket check and build the push message.
async fn publish_overlay(
  state: &AppState,
  session_id: &str,
  ticket: Ticket,
  shown: Option<ShownDetection>,
) -> Option<ServerWsMessage> {
  let mut sessions = state.sessions.write().await;
  let entry = sessions.get_mut(session_id)?;
  if !entry.session.apply_detection(ticket, shown) {
    info!(target: "lexiscene_engine", "Stale overlay result dropped.");
    return None;
  }
  Some(ServerWsMessage::Overlay {
    session_id: session_id.to_string(),
    overlay: protocol::overlay_view(&entry.session),
  })
}

fn cue(state: &AppState, file: &str) -> SoundView {
  SoundView {
    url: join_url(&state.backend_base, &format!("sound/{file}")),
    volume: state.config.sounds.volume,
  }
}

fn unknown_session(session_id: &str) -> ServerWsMessage {
  ServerWsMessage::Error { message: format!("Unknown sessionId: {session_id}") }
}
