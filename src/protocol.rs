//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve engine and hosting pages independently.

use serde::{Deserialize, Serialize};

use crate::domain::{ExerciseUnit, PromptTag, UnitKind};
use crate::geometry::{PixelRect, SceneLayout};
use crate::session::{ExerciseSession, SelectOutcome};

/// Messages the hosting page can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    OpenUnit {
        username: String,
        unit: ExerciseUnit,
    },
    SelectPrompt {
        #[serde(rename = "sessionId")]
        session_id: String,
        slot: usize,
    },
    RequestHint {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    UpdateLayout {
        #[serde(rename = "sessionId")]
        session_id: String,
        layout: SceneLayout,
    },
    LeaveUnit {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

/// Messages the engine sends back over WebSocket. `Overlay` is also pushed
/// out-of-band when a detection or hint probe resolves.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    UnitReady {
        session: SessionView,
    },
    Selection {
        selection: SelectionView,
    },
    Hint {
        hint: HintView,
    },
    Overlay {
        session_id: String,
        overlay: Option<OverlayView>,
    },
    UnitClosed {
        session_id: String,
    },
    Error {
        message: String,
    },
}

/// Full session snapshot, sent when a unit is opened.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub group_id: i64,
    pub kind: UnitKind,
    pub language: String,
    pub level: u32,
    pub image_url: String,
    pub video: Option<String>,
    pub prompts: Vec<PromptView>,
    pub selected: Vec<SelectedPrompt>,
    pub locked: bool,
    pub completed: bool,
    pub final_score: Option<i32>,
    pub hints_used: u8,
    pub hints_left: u8,
    pub sound: Option<SoundView>,
}

/// One prompt button, in display order. Tags are not exposed here; correctness
/// is revealed per selection.
#[derive(Debug, Serialize)]
pub struct PromptView {
    pub slot: usize,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SelectedPrompt {
    pub slot: usize,
    pub correct: bool,
}

/// Word detail for the side panel, following the most recent fresh selection.
#[derive(Debug, Serialize)]
pub struct PromptDetail {
    pub slot: usize,
    pub text: String,
    pub description: String,
}

/// An audio cue the host should play, already resolved to a URL.
#[derive(Debug, Clone, Serialize)]
pub struct SoundView {
    pub url: String,
    pub volume: f32,
}

/// Per-tap feedback. Overlay changes arrive separately once detection resolves.
/// `video` rides along only on the completing tap, for the success screen.
#[derive(Debug, Serialize)]
pub struct SelectionView {
    pub session_id: String,
    pub slot: usize,
    pub correct: bool,
    pub newly_selected: bool,
    pub locked: bool,
    pub completed_now: bool,
    pub final_score: Option<i32>,
    pub video: Option<String>,
    pub selected: Vec<SelectedPrompt>,
    pub detail: Option<PromptDetail>,
    pub sound: SoundView,
}

/// Immediate answer to a hint request; when `probing` is true an `Overlay`
/// message follows once the probes finish.
#[derive(Debug, Serialize)]
pub struct HintView {
    pub session_id: String,
    pub charged: bool,
    pub hints_used: u8,
    pub hints_left: u8,
    pub probing: bool,
}

/// A positioned highlight in the container's pixel space. `label` is absent
/// for hint reveals.
#[derive(Debug, Serialize)]
pub struct OverlayView {
    pub rect: PixelRect,
    pub label: Option<String>,
    pub confidence: f32,
}

/// Convert session state to the public snapshot DTO.
pub fn session_view(session: &ExerciseSession, sound: Option<SoundView>) -> SessionView {
    let unit = session.unit();
    SessionView {
        session_id: session.id().to_string(),
        group_id: unit.group_id,
        kind: unit.kind,
        language: unit.language.clone(),
        level: unit.level,
        image_url: unit.image_url.clone(),
        video: unit.video_ref().map(|v| v.to_string()),
        prompts: session
            .prompts()
            .enumerate()
            .map(|(slot, p)| PromptView { slot, text: p.text.clone() })
            .collect(),
        selected: selected_prompts(session),
        locked: session.locked(),
        completed: unit.completed || session.final_score().is_some(),
        final_score: session.final_score(),
        hints_used: session.hints_used(),
        hints_left: session.hints_left(),
        sound,
    }
}

pub fn selection_view(
    session: &ExerciseSession,
    slot: usize,
    outcome: &SelectOutcome,
    sound: SoundView,
) -> SelectionView {
    SelectionView {
        session_id: session.id().to_string(),
        slot,
        correct: outcome.tag == PromptTag::Correct,
        newly_selected: outcome.newly_selected,
        locked: outcome.locked,
        completed_now: outcome.completed_now,
        final_score: session.final_score(),
        video: if outcome.completed_now {
            session.unit().video_ref().map(|v| v.to_string())
        } else {
            None
        },
        selected: selected_prompts(session),
        detail: session.last_selected().and_then(|s| prompt_detail(session, s)),
        sound,
    }
}

/// Project the cached detection through the current layout, if both exist.
pub fn overlay_view(session: &ExerciseSession) -> Option<OverlayView> {
    let shown = session.shown_detection()?;
    let layout = session.layout()?;
    Some(OverlayView {
        rect: layout.project(&shown.detection.bbox),
        label: if shown.hide_label { None } else { Some(shown.detection.label.clone()) },
        confidence: shown.detection.confidence,
    })
}

fn selected_prompts(session: &ExerciseSession) -> Vec<SelectedPrompt> {
    session
        .selected_slots()
        .iter()
        .filter_map(|&slot| {
            session.prompt_at(slot).map(|p| SelectedPrompt {
                slot,
                correct: p.tag == PromptTag::Correct,
            })
        })
        .collect()
}

fn prompt_detail(session: &ExerciseSession, slot: usize) -> Option<PromptDetail> {
    session.prompt_at(slot).map(|p| PromptDetail {
        slot,
        text: p.text.clone(),
        description: p.description.clone(),
    })
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct OpenUnitIn {
    pub username: String,
    pub unit: ExerciseUnit,
}

#[derive(Debug, Deserialize)]
pub struct SelectIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub slot: usize,
}

#[derive(Debug, Deserialize)]
pub struct HintIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LayoutIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub layout: SceneLayout,
}

#[derive(Debug, Deserialize)]
pub struct LeaveIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OverlayQuery {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_parse_with_camel_case_ids() {
        let msg: ClientWsMessage =
            serde_json::from_str(r#"{"type":"select_prompt","sessionId":"abc","slot":3}"#).unwrap();
        match msg {
            ClientWsMessage::SelectPrompt { session_id, slot } => {
                assert_eq!(session_id, "abc");
                assert_eq!(slot, 3);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn server_messages_carry_snake_case_tags() {
        let out = serde_json::to_value(ServerWsMessage::UnitClosed { session_id: "abc".into() }).unwrap();
        assert_eq!(out["type"], "unit_closed");
        assert_eq!(out["session_id"], "abc");
    }
}
