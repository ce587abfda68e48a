//! Reporting completion scores to the progress backend.
//!
//! One fire-and-forget POST per completed session: bricks go to `/user_brick`,
//! steps to `/user_step`, both with `{ username, group_id, score }`. The
//! response is ignored beyond logging; the learner already has their score and
//! a lost report must never block the exercise flow.

use std::time::Duration;

use reqwest::header::USER_AGENT;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::UnitKind;
use crate::session::ScoreReport;
use crate::util::{backend_base_url, join_url};

#[derive(Clone)]
pub struct ProgressClient {
  pub client: reqwest::Client,
  pub base_url: String,
}

impl ProgressClient {
  pub fn from_env() -> Option<Self> {
    let base_url = backend_base_url();
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;
    Some(Self { client, base_url })
  }

  #[instrument(
    level = "info",
    skip(self, report),
    fields(group_id = report.group_id, score = report.score, kind = ?report.kind)
  )]
  pub async fn submit_score(&self, report: &ScoreReport) {
    let path = match report.kind {
      UnitKind::Brick => "user_brick",
      UnitKind::Step => "user_step",
    };
    let url = join_url(&self.base_url, path);
    let body = ScoreSubmission {
      username: &report.username,
      group_id: report.group_id,
      score: report.score,
    };

    match self.client.post(&url)
      .header(USER_AGENT, "lexiscene-engine/0.1")
      .json(&body)
      .send().await
    {
      Ok(res) if res.status().is_success() => {
        info!(target: "lexiscene_engine", %url, "Score submitted");
      }
      Ok(res) => {
        warn!(target: "lexiscene_engine", %url, status = %res.status(), "Score submission rejected");
      }
      Err(e) => {
        warn!(target: "lexiscene_engine", %url, error = %e, "Score submission failed");
      }
    }
  }
}

#[derive(Serialize)]
struct ScoreSubmission<'a> {
  username: &'a str,
  group_id: i64,
  score: i32,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn submission_body_matches_the_backend_contract() {
    let body = ScoreSubmission { username: "ana", group_id: 42, score: 60 };
    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(json, serde_json::json!({ "username": "ana", "group_id": 42, "score": 60 }));
  }
}
