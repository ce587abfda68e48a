//! Session state machine for one exercise unit.
//!
//! Flow:
//! 1) A host opens a unit; usable prompts are shuffled once for the session.
//! 2) Prompt taps update the selection set and may ask for scene detection.
//! 3) When every correct prompt is selected the session locks and scores.
//! 4) The final score is handed out for upstream reporting exactly once.

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{ExerciseUnit, PromptTag, ShownDetection, WordPrompt};
use crate::geometry::SceneLayout;

/// Most hints a learner may spend on one unit.
pub const MAX_HINTS: u8 = 2;
/// Points deducted per hint use, applied after the base score.
pub const HINT_PENALTY: i32 = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
  #[error("prompt slot {0} is out of range")]
  SlotOutOfRange(usize),
}

/// What one `select` call did, so the caller can pick feedback and follow-ups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectOutcome {
  pub tag: PromptTag,
  /// False when the slot was already selected. The set never duplicates.
  pub newly_selected: bool,
  /// Lock state after this call.
  pub locked: bool,
  /// True only on the call that crossed the completion edge and set the score.
  pub completed_now: bool,
  /// Run a scene detection for this prompt. Never set for repeat taps or
  /// once locked.
  pub run_detection: bool,
}

/// Answer to a hint request, before any probing happens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HintStart {
  /// The use is charged; probe these in order and stop at the first match.
  /// May be empty (no described candidates, or no scene), still charged.
  Probe(Vec<HintProbe>),
  /// No unselected correct prompts remain. Free.
  NothingToReveal,
  /// Both hint uses are spent. Free.
  Exhausted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HintProbe {
  pub slot: usize,
  pub target: String,
}

/// Identity of one overlay-bearing request. Results are applied only if the
/// ticket still names the current session and its newest request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket {
  session: Uuid,
  seq: u64,
}

/// The upstream progress report, produced at most once per session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoreReport {
  pub username: String,
  pub group_id: i64,
  pub kind: crate::domain::UnitKind,
  pub score: i32,
}

pub struct ExerciseSession {
  id: Uuid,
  username: String,
  unit: ExerciseUnit,
  /// Shuffled indices into `unit.words`, usable prompts only. Fixed for the
  /// session; a slot is a position in this order.
  order: Vec<usize>,
  /// Selected slots in selection order, no duplicates. Keeps growing after
  /// lock (late taps still render), but the score never changes again.
  selected: Vec<usize>,
  last_selected: Option<usize>,
  hints_used: u8,
  /// Guards the completion edge; distinct from `unit.completed`, which marks
  /// units that arrive already complete and must never re-score.
  completed_locally: bool,
  final_score: Option<i32>,
  submitted: bool,
  seq: u64,
  last_detection: Option<ShownDetection>,
  layout: Option<SceneLayout>,
}

impl ExerciseSession {
  pub fn new<R: Rng + ?Sized>(unit: ExerciseUnit, username: String, rng: &mut R) -> Self {
    let mut order: Vec<usize> = unit
      .words
      .iter()
      .enumerate()
      .filter(|(_, w)| w.is_usable())
      .map(|(idx, _)| idx)
      .collect();
    order.shuffle(rng);
    Self {
      id: Uuid::new_v4(),
      username,
      unit,
      order,
      selected: Vec::new(),
      last_selected: None,
      hints_used: 0,
      completed_locally: false,
      final_score: None,
      submitted: false,
      seq: 0,
      last_detection: None,
      layout: None,
    }
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn username(&self) -> &str {
    &self.username
  }

  pub fn unit(&self) -> &ExerciseUnit {
    &self.unit
  }

  pub fn slot_count(&self) -> usize {
    self.order.len()
  }

  pub fn prompt_at(&self, slot: usize) -> Option<&WordPrompt> {
    self.order.get(slot).map(|&idx| &self.unit.words[idx])
  }

  /// Prompts in display order.
  pub fn prompts(&self) -> impl Iterator<Item = &WordPrompt> + '_ {
    self.order.iter().map(|&idx| &self.unit.words[idx])
  }

  pub fn selected_slots(&self) -> &[usize] {
    &self.selected
  }

  pub fn last_selected(&self) -> Option<usize> {
    self.last_selected
  }

  pub fn hints_used(&self) -> u8 {
    self.hints_used
  }

  pub fn hints_left(&self) -> u8 {
    MAX_HINTS - self.hints_used
  }

  pub fn final_score(&self) -> Option<i32> {
    self.final_score
  }

  /// True once every correct prompt is selected. A unit with no correct
  /// prompts never locks, however many distractors are tapped.
  pub fn locked(&self) -> bool {
    let mut saw_correct = false;
    for slot in self.correct_slots() {
      saw_correct = true;
      if !self.selected.contains(&slot) {
        return false;
      }
    }
    saw_correct
  }

  /// Record a prompt tap. Idempotent over the selection set; selecting the
  /// same slot twice replays feedback without growing the set.
  pub fn select(&mut self, slot: usize) -> Result<SelectOutcome, SessionError> {
    let (tag, described) = {
      let prompt = self
        .prompt_at(slot)
        .ok_or(SessionError::SlotOutOfRange(slot))?;
      (prompt.tag, prompt.has_description())
    };
    let was_locked = self.locked();

    let newly_selected = if self.selected.contains(&slot) {
      false
    } else {
      self.selected.push(slot);
      self.last_selected = Some(slot);
      true
    };

    let mut completed_now = false;
    if !was_locked && self.locked() && !self.unit.completed && !self.completed_locally {
      self.completed_locally = true;
      self.final_score = Some(self.compute_final_score());
      completed_now = true;
    }

    Ok(SelectOutcome {
      tag,
      newly_selected,
      locked: self.locked(),
      completed_now,
      run_detection: tag == PromptTag::Correct
        && described
        && newly_selected
        && !was_locked
        && self.unit.has_scene(),
    })
  }

  /// Ask for a hint. A use is charged as soon as candidates exist, whether or
  /// not any probe later finds something.
  pub fn begin_hint(&mut self) -> HintStart {
    if self.hints_used >= MAX_HINTS {
      return HintStart::Exhausted;
    }
    let waiting: Vec<usize> = self
      .correct_slots()
      .filter(|slot| !self.selected.contains(slot))
      .collect();
    if waiting.is_empty() {
      return HintStart::NothingToReveal;
    }
    self.hints_used += 1;

    let probes = if self.unit.has_scene() {
      waiting
        .into_iter()
        .filter_map(|slot| {
          let prompt = self.prompt_at(slot)?;
          if prompt.has_description() {
            Some(HintProbe { slot, target: prompt.description.clone() })
          } else {
            None
          }
        })
        .collect()
    } else {
      Vec::new()
    };
    HintStart::Probe(probes)
  }

  /// Stamp a new overlay-bearing request. Supersedes all earlier tickets.
  pub fn issue_ticket(&mut self) -> Ticket {
    self.seq += 1;
    Ticket { session: self.id, seq: self.seq }
  }

  /// Apply a detection result (`None` clears the overlay). Returns false and
  /// leaves the session untouched when the ticket is stale.
  pub fn apply_detection(&mut self, ticket: Ticket, shown: Option<ShownDetection>) -> bool {
    if ticket.session != self.id || ticket.seq != self.seq {
      return false;
    }
    self.last_detection = shown;
    true
  }

  pub fn set_layout(&mut self, layout: SceneLayout) {
    self.layout = Some(layout);
  }

  pub fn layout(&self) -> Option<SceneLayout> {
    self.layout
  }

  pub fn shown_detection(&self) -> Option<&ShownDetection> {
    self.last_detection.as_ref()
  }

  /// Hand out the upstream report, at most once. Sessions on units that were
  /// already complete upstream never produce one.
  pub fn take_submission(&mut self) -> Option<ScoreReport> {
    if self.submitted {
      return None;
    }
    let score = self.final_score?;
    self.submitted = true;
    Some(ScoreReport {
      username: self.username.clone(),
      group_id: self.unit.group_id,
      kind: self.unit.kind,
      score,
    })
  }

  fn correct_slots(&self) -> impl Iterator<Item = usize> + '_ {
    (0..self.order.len()).filter(|&slot| {
      self
        .prompt_at(slot)
        .map(|p| p.tag == PromptTag::Correct)
        .unwrap_or(false)
    })
  }

  fn compute_final_score(&self) -> i32 {
    let correct = self
      .selected
      .iter()
      .filter(|&&slot| {
        self
          .prompt_at(slot)
          .map(|p| p.tag == PromptTag::Correct)
          .unwrap_or(false)
      })
      .count();
    let total = self.selected.len();
    let base = if total == 0 {
      0
    } else {
      ((100 * correct + total / 2) / total) as i32
    };
    (base - HINT_PENALTY * i32::from(self.hints_used)).max(0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::UnitKind;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  fn prompt(text: &str, tag: PromptTag, description: &str) -> WordPrompt {
    WordPrompt { text: text.into(), tag, description: description.into() }
  }

  fn unit_with(words: Vec<WordPrompt>) -> ExerciseUnit {
    ExerciseUnit {
      group_id: 42,
      kind: UnitKind::Step,
      language: "Spanish".into(),
      level: 1,
      image_url: "/data/images/kitchen.png".into(),
      video: String::new(),
      completed: false,
      words,
    }
  }

  fn session_from(unit: ExerciseUnit) -> ExerciseSession {
    let mut rng = StdRng::seed_from_u64(7);
    ExerciseSession::new(unit, "ana".into(), &mut rng)
  }

  fn slot_of(session: &ExerciseSession, text: &str) -> usize {
    (0..session.slot_count())
      .find(|&s| session.prompt_at(s).map(|p| p.text == text).unwrap_or(false))
      .expect("prompt present")
  }

  fn three_correct_two_wrong() -> ExerciseUnit {
    unit_with(vec![
      prompt("taza", PromptTag::Correct, "the red cup"),
      prompt("mesa", PromptTag::Correct, "the wooden table"),
      prompt("plato", PromptTag::Correct, "the white plate"),
      prompt("nube", PromptTag::Incorrect, ""),
      prompt("tren", PromptTag::Incorrect, ""),
    ])
  }

  #[test]
  fn blank_prompts_are_dropped_and_the_rest_reordered() {
    let mut words = three_correct_two_wrong().words;
    words.push(prompt("   ", PromptTag::Correct, ""));
    let session = session_from(unit_with(words));

    assert_eq!(session.slot_count(), 5);
    let mut texts: Vec<&str> = session.prompts().map(|p| p.text.as_str()).collect();
    texts.sort_unstable();
    assert_eq!(texts, ["mesa", "nube", "plato", "taza", "tren"]);
  }

  #[test]
  fn selecting_every_correct_prompt_locks_and_scores() {
    let mut session = session_from(three_correct_two_wrong());
    for text in ["nube", "tren", "taza", "mesa"] {
      let out = session.select(slot_of(&session, text)).unwrap();
      assert!(!out.completed_now);
      assert!(!out.locked);
    }

    let last = slot_of(&session, "plato");
    let out = session.select(last).unwrap();
    assert!(out.completed_now);
    assert!(out.locked);
    assert!(out.run_detection, "the locking tap still queries the scene");
    // 3 correct of 5 selected, no hints.
    assert_eq!(session.final_score(), Some(60));

    let report = session.take_submission().expect("one report");
    assert_eq!(report.score, 60);
    assert_eq!(report.group_id, 42);
    assert_eq!(report.username, "ana");
    assert_eq!(report.kind, UnitKind::Step);
    assert_eq!(session.take_submission(), None);
  }

  #[test]
  fn clean_run_scores_one_hundred() {
    let mut session = session_from(unit_with(vec![
      prompt("taza", PromptTag::Correct, "the red cup"),
      prompt("mesa", PromptTag::Correct, "the wooden table"),
    ]));
    session.select(slot_of(&session, "taza")).unwrap();
    let out = session.select(slot_of(&session, "mesa")).unwrap();
    assert!(out.completed_now);
    assert_eq!(session.final_score(), Some(100));
  }

  #[test]
  fn base_score_rounds_to_nearest() {
    let mut session = session_from(unit_with(vec![
      prompt("taza", PromptTag::Correct, ""),
      prompt("mesa", PromptTag::Correct, ""),
      prompt("nube", PromptTag::Incorrect, ""),
    ]));
    for text in ["nube", "taza", "mesa"] {
      session.select(slot_of(&session, text)).unwrap();
    }
    // round(200 / 3) = 67
    assert_eq!(session.final_score(), Some(67));
  }

  #[test]
  fn each_hint_costs_twenty_points() {
    for (hints, expected) in [(1u8, 40), (2u8, 20)] {
      let mut session = session_from(three_correct_two_wrong());
      for _ in 0..hints {
        assert!(matches!(session.begin_hint(), HintStart::Probe(_)));
      }
      assert_eq!(session.hints_used(), hints);

      for text in ["nube", "tren", "taza", "mesa", "plato"] {
        session.select(slot_of(&session, text)).unwrap();
      }
      // Base 60, minus 20 per hint.
      assert_eq!(session.final_score(), Some(expected));
    }
  }

  #[test]
  fn score_clamps_at_zero() {
    let mut session = session_from(unit_with(vec![
      prompt("taza", PromptTag::Correct, ""),
      prompt("nube", PromptTag::Incorrect, ""),
      prompt("tren", PromptTag::Incorrect, ""),
      prompt("faro", PromptTag::Incorrect, ""),
      prompt("pez", PromptTag::Incorrect, ""),
    ]));
    session.begin_hint();
    session.begin_hint();
    for text in ["nube", "tren", "faro", "pez", "taza"] {
      session.select(slot_of(&session, text)).unwrap();
    }
    // Base 20, penalty 40.
    assert_eq!(session.final_score(), Some(0));
  }

  #[test]
  fn repeat_selection_never_grows_the_set() {
    let mut session = session_from(three_correct_two_wrong());
    let taza = slot_of(&session, "taza");
    let nube = slot_of(&session, "nube");

    assert!(session.select(taza).unwrap().newly_selected);
    assert!(session.select(nube).unwrap().newly_selected);
    let again = session.select(taza).unwrap();
    assert!(!again.newly_selected);
    assert_eq!(again.tag, PromptTag::Correct);
    assert_eq!(session.selected_slots(), [taza, nube]);
    // Repeats replay feedback but do not move the detail display.
    assert_eq!(session.last_selected(), Some(nube));
  }

  #[test]
  fn repeat_taps_do_not_requery_the_scene() {
    let mut session = session_from(unit_with(vec![
      prompt("taza", PromptTag::Correct, "the red cup"),
      prompt("mesa", PromptTag::Correct, "the wooden table"),
    ]));
    let taza = slot_of(&session, "taza");

    let first = session.select(taza).unwrap();
    assert!(first.newly_selected);
    assert!(first.run_detection);

    let again = session.select(taza).unwrap();
    assert!(!again.newly_selected);
    assert!(!again.run_detection, "feedback replay must not query the scene");
  }

  #[test]
  fn zero_correct_units_never_complete() {
    let mut session = session_from(unit_with(vec![
      prompt("nube", PromptTag::Incorrect, ""),
      prompt("tren", PromptTag::Incorrect, ""),
    ]));
    for slot in 0..session.slot_count() {
      let out = session.select(slot).unwrap();
      assert!(!out.locked);
      assert!(!out.completed_now);
    }
    assert!(!session.locked());
    assert_eq!(session.final_score(), None);
    assert_eq!(session.begin_hint(), HintStart::NothingToReveal);
    assert_eq!(session.hints_used(), 0);
    assert_eq!(session.take_submission(), None);
  }

  #[test]
  fn late_taps_render_but_change_nothing() {
    let mut session = session_from(three_correct_two_wrong());
    for text in ["taza", "mesa", "plato"] {
      session.select(slot_of(&session, text)).unwrap();
    }
    assert_eq!(session.final_score(), Some(100));
    session.take_submission().expect("one report");

    let nube = slot_of(&session, "nube");
    let out = session.select(nube).unwrap();
    assert!(out.newly_selected, "late taps are still recorded for display");
    assert!(out.locked);
    assert!(!out.completed_now);
    assert!(!out.run_detection);
    assert_eq!(session.final_score(), Some(100));
    assert_eq!(session.take_submission(), None);

    let taza = slot_of(&session, "taza");
    assert!(!session.select(taza).unwrap().run_detection);
  }

  #[test]
  fn third_hint_is_refused_without_charge() {
    let mut session = session_from(three_correct_two_wrong());
    assert!(matches!(session.begin_hint(), HintStart::Probe(_)));
    assert!(matches!(session.begin_hint(), HintStart::Probe(_)));
    assert_eq!(session.begin_hint(), HintStart::Exhausted);
    assert_eq!(session.hints_used(), 2);
  }

  #[test]
  fn hint_probes_cover_only_described_unselected_prompts() {
    let mut session = session_from(unit_with(vec![
      prompt("taza", PromptTag::Correct, "the red cup"),
      prompt("mesa", PromptTag::Correct, ""),
      prompt("nube", PromptTag::Incorrect, "a cloud"),
    ]));
    session.select(slot_of(&session, "nube")).unwrap();

    match session.begin_hint() {
      HintStart::Probe(probes) => {
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].target, "the red cup");
        assert_eq!(probes[0].slot, slot_of(&session, "taza"));
      }
      other => panic!("expected probes, got {other:?}"),
    }
    // Charged even though "mesa" could not be probed.
    assert_eq!(session.hints_used(), 1);
  }

  #[test]
  fn units_already_complete_upstream_never_rescore() {
    let mut unit = three_correct_two_wrong();
    unit.completed = true;
    let mut session = session_from(unit);
    for text in ["taza", "mesa", "plato"] {
      let out = session.select(slot_of(&session, text)).unwrap();
      assert!(!out.completed_now);
    }
    assert!(session.locked());
    assert_eq!(session.final_score(), None);
    assert_eq!(session.take_submission(), None);
  }

  #[test]
  fn stale_tickets_are_discarded() {
    let mut session = session_from(three_correct_two_wrong());
    let old = session.issue_ticket();
    let new = session.issue_ticket();

    let shown = ShownDetection {
      detection: crate::domain::Detection {
        bbox: crate::domain::NormalizedBox { x: 0.1, y: 0.1, w: 0.2, h: 0.2 },
        confidence: 0.9,
        label: "cup".into(),
      },
      hide_label: false,
    };
    assert!(!session.apply_detection(old, Some(shown.clone())));
    assert!(session.shown_detection().is_none());

    assert!(session.apply_detection(new, Some(shown)));
    assert!(session.shown_detection().is_some());
    assert!(session.apply_detection(new, None));
    assert!(session.shown_detection().is_none());
  }
}
