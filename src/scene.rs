//! Resolving a unit's scene image into raw bytes for detection queries.
//!
//! Scene references arrive in three shapes: inline `data:` URIs, absolute
//! http(s) URLs, and backend-relative paths ("/data/images/day1.png"). Inline
//! data is decoded in place; everything else is fetched once and cached on the
//! session, so repeated clicks and hint probes reuse the same payload.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use tracing::{info, instrument};

use crate::util::{backend_base_url, join_url};

/// Raw scene image bytes plus their media type, ready for a multipart upload.
#[derive(Clone, Debug)]
pub struct ScenePayload {
  pub bytes: Vec<u8>,
  pub mime: String,
}

#[derive(Clone)]
pub struct SceneFetcher {
  pub client: reqwest::Client,
  pub base_url: String,
}

impl SceneFetcher {
  pub fn from_env() -> Option<Self> {
    let base_url = backend_base_url();
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;
    Some(Self { client, base_url })
  }

  #[instrument(level = "info", skip(self, image_ref), fields(ref_len = image_ref.len()))]
  pub async fn fetch(&self, image_ref: &str) -> Result<ScenePayload, String> {
    if let Some(rest) = image_ref.strip_prefix("data:") {
      return decode_data_uri(rest);
    }

    let url = resolve_remote_url(&self.base_url, image_ref);
    let res = self.client.get(&url)
      .header(USER_AGENT, "lexiscene-engine/0.1")
      .send().await.map_err(|e| e.to_string())?;
    if !res.status().is_success() {
      return Err(format!("scene fetch HTTP {}", res.status()));
    }
    let mime = res.headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
      .filter(|v| !v.is_empty())
      .unwrap_or_else(|| "image/png".into());
    let bytes = res.bytes().await.map_err(|e| e.to_string())?.to_vec();

    info!(target: "lexiscene_engine", %url, bytes = bytes.len(), %mime, "Scene image fetched");
    Ok(ScenePayload { bytes, mime })
  }
}

/// Absolute URLs pass through; anything else is a backend-relative path.
pub fn resolve_remote_url(base_url: &str, image_ref: &str) -> String {
  if image_ref.starts_with("http://") || image_ref.starts_with("https://") {
    image_ref.to_string()
  } else {
    join_url(base_url, image_ref)
  }
}

/// Decode the part of a data URI after the `data:` scheme.
pub fn decode_data_uri(rest: &str) -> Result<ScenePayload, String> {
  let (header, payload) = rest
    .split_once(',')
    .ok_or_else(|| "malformed data URI: no comma".to_string())?;
  let mime = match header.strip_suffix(";base64") {
    Some(m) => m,
    None => return Err("unsupported data URI: not base64-encoded".into()),
  };
  let bytes = STANDARD
    .decode(payload.trim())
    .map_err(|e| format!("data URI base64 decode failed: {e}"))?;
  let mime = if mime.trim().is_empty() { "image/png".to_string() } else { mime.trim().to_string() };
  Ok(ScenePayload { bytes, mime })
}
