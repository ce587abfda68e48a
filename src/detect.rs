//! Client for the visual detection service.
//!
//! One call: POST the scene image as a multipart upload with a text query, get
//! back whether (and where) the query is visible. Every failure shape (non-200
//! status, non-JSON body, `found: false`, malformed box) collapses to "nothing
//! detected"; the caller clears the overlay and moves on.

use std::time::Duration;

use reqwest::header::USER_AGENT;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{instrument, warn};

use crate::domain::{Detection, NormalizedBox};
use crate::scene::ScenePayload;
use crate::util::{backend_base_url, join_url, trunc_for_log};

#[derive(Clone)]
pub struct DetectClient {
  pub client: reqwest::Client,
  pub base_url: String,
}

impl DetectClient {
  pub fn from_env() -> Option<Self> {
    let base_url = backend_base_url();
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;
    Some(Self { client, base_url })
  }

  /// Locate `target` in the scene. `None` means "nothing to show", whatever
  /// actually went wrong; failures are logged here and nowhere else.
  #[instrument(level = "info", skip(self, scene), fields(%target, scene_bytes = scene.bytes.len()))]
  pub async fn locate(&self, scene: &ScenePayload, target: &str) -> Option<Detection> {
    match self.try_locate(scene, target).await {
      Ok(found) => found,
      Err(e) => {
        warn!(target: "lexiscene_engine", error = %e, "Detection call failed; treating as not found");
        None
      }
    }
  }

  async fn try_locate(&self, scene: &ScenePayload, target: &str) -> Result<Option<Detection>, String> {
    let url = join_url(&self.base_url, "detect");
    let part = Part::bytes(scene.bytes.clone())
      .file_name("scene.png")
      .mime_str(&scene.mime)
      .map_err(|e| e.to_string())?;
    let form = Form::new().part("file", part);

    let res = self.client.post(&url)
      .query(&[("target", target)])
      .header(USER_AGENT, "lexiscene-engine/0.1")
      .multipart(form)
      .send().await.map_err(|e| e.to_string())?;

    let status_ok = res.status().is_success();
    let body = res.text().await.map_err(|e| e.to_string())?;
    let parsed = parse_detection(status_ok, &body);
    if parsed.is_none() && !status_ok {
      warn!(target: "lexiscene_engine", body = %trunc_for_log(&body, 200), "Detection service answered non-200");
    }
    Ok(parsed)
  }
}

/// Interpret a detection response body. Only a successful status with
/// `found: true` and a well-formed four-element box counts as a detection.
pub fn parse_detection(status_ok: bool, body: &str) -> Option<Detection> {
  if !status_ok {
    return None;
  }
  let wire: DetectWire = serde_json::from_str(body).ok()?;
  if !wire.found {
    return None;
  }
  let bbox = NormalizedBox::from_wire(&wire.bbox)?;
  Some(Detection {
    bbox,
    confidence: wire.confidence.unwrap_or(0.0),
    label: wire.label.unwrap_or_default(),
  })
}

#[derive(Deserialize)]
struct DetectWire {
  #[serde(default)]
  found: bool,
  #[serde(default)]
  bbox: Vec<f64>,
  #[serde(default)]
  confidence: Option<f32>,
  #[serde(default)]
  label: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn well_formed_responses_yield_a_detection() {
    let body = r#"{"found": true, "label": "cup", "confidence": 0.92, "bbox": [0.1, 0.2, 0.3, 0.4], "error": null}"#;
    let det = parse_detection(true, body).expect("detection");
    assert_eq!(det.label, "cup");
    assert!((det.confidence - 0.92).abs() < 1e-6);
    assert!((det.bbox.x - 0.1).abs() < 1e-9);
  }

  #[test]
  fn not_found_and_failures_all_mean_nothing() {
    assert!(parse_detection(true, r#"{"found": false}"#).is_none());
    assert!(parse_detection(true, r#"{"found": true, "bbox": [0.1, 0.2, 0.3]}"#).is_none());
    assert!(parse_detection(true, r#"{"found": true}"#).is_none());
    assert!(parse_detection(true, "backend exploded").is_none());
    assert!(parse_detection(true, "").is_none());
    // Valid body behind a failing status is still nothing.
    assert!(parse_detection(false, r#"{"found": true, "bbox": [0.1, 0.2, 0.3, 0.4]}"#).is_none());
  }

  #[test]
  fn missing_confidence_and_label_are_tolerated() {
    let det = parse_detection(true, r#"{"found": true, "bbox": [0.0, 0.0, 1.0, 1.0]}"#).expect("detection");
    assert_eq!(det.confidence, 0.0);
    assert_eq!(det.label, "");
  }
}
