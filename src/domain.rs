//! Domain models used by the engine: exercise units, word prompts, and detection results.

use serde::{Deserialize, Serialize};

/// Classification of a word prompt within a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptTag {
  /// The word is present in the scene; selecting it counts toward completion.
  #[serde(alias = "Good")]
  Correct,
  /// A distractor; selecting it lowers the score.
  #[serde(alias = "Bad")]
  Incorrect,
}

/// Which exercise table a unit came from. Decides the progress endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
  Brick,
  Step,
}
impl Default for UnitKind {
  fn default() -> Self { UnitKind::Step }
}

/// One clickable word option inside a unit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WordPrompt {
  pub text: String,
  pub tag: PromptTag,
  /// Free-text detection query ("the red cup on the table"). Empty = no query.
  #[serde(default)] pub description: String,
}

impl WordPrompt {
  /// Prompts with blank text are dropped before play.
  pub fn is_usable(&self) -> bool {
    !self.text.trim().is_empty()
  }

  pub fn has_description(&self) -> bool {
    !self.description.trim().is_empty()
  }
}

/// One self-contained vocabulary-recognition exercise, as delivered by the
/// hosting page's content backend. Immutable for the lifetime of a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExerciseUnit {
  pub group_id: i64,
  #[serde(default)] pub kind: UnitKind,
  #[serde(default)] pub language: String,
  /// Brick "level" / step "day".
  #[serde(default = "default_level")] pub level: u32,
  /// Scene image reference: http(s) URL, backend-relative path, or data: URI. Empty = none.
  #[serde(default)] pub image_url: String,
  /// Optional completion video reference.
  #[serde(default)] pub video: String,
  /// Persisted completion flag from the progress store.
  #[serde(default)] pub completed: bool,
  pub words: Vec<WordPrompt>,
}

fn default_level() -> u32 { 1 }

impl ExerciseUnit {
  pub fn has_scene(&self) -> bool {
    !self.image_url.trim().is_empty()
  }

  /// Completion video. The backend stores missing videos as the literal "null".
  pub fn video_ref(&self) -> Option<&str> {
    let v = self.video.trim();
    if v.is_empty() || v == "null" { None } else { Some(v) }
  }
}

/// Bounding box in image-fraction coordinates, `(x, y, w, h)` in `[0,1]`,
/// relative to the rendered image (not the container).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
  pub x: f64,
  pub y: f64,
  pub w: f64,
  pub h: f64,
}

impl NormalizedBox {
  /// Accepts exactly four finite components; anything else is malformed.
  pub fn from_wire(raw: &[f64]) -> Option<Self> {
    match raw {
      [x, y, w, h] if raw.iter().all(|v| v.is_finite()) => {
        Some(Self { x: *x, y: *y, w: *w, h: *h })
      }
      _ => None,
    }
  }
}

/// A successful detection. Transient: re-derived on demand, cached only as
/// "last shown" so layout changes can re-project without a new query.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Detection {
  pub bbox: NormalizedBox,
  pub confidence: f32,
  pub label: String,
}

/// The cached last-shown detection; hints suppress the label.
#[derive(Clone, Debug)]
pub struct ShownDetection {
  pub detection: Detection,
  pub hide_label: bool,
}
