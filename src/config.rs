//! Loading engine configuration (sound cues + tunables) from TOML.
//!
//! Everything has a default, so a missing or unset config file is fine.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct EngineConfig {
  #[serde(default)]
  pub sounds: SoundCues,
}

/// Audio feedback cues, served by the content backend under `/sound/`.
/// Hosts receive the resolved URL and play it at the given volume.
#[derive(Clone, Debug, Deserialize)]
pub struct SoundCues {
  pub unit_loaded: String,
  pub correct: String,
  pub incorrect: String,
  pub volume: f32,
}

impl Default for SoundCues {
  fn default() -> Self {
    Self {
      unit_loaded: "start_sound.mp3".into(),
      correct: "right_answer.mp3".into(),
      incorrect: "wrong_answer.mp3".into(),
      volume: 0.15,
    }
  }
}

/// Attempt to load `EngineConfig` from ENGINE_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_engine_config_from_env() -> Option<EngineConfig> {
  let path = std::env::var("ENGINE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<EngineConfig>(&s) {
      Ok(cfg) => {
        info!(target: "lexiscene_engine", %path, "Loaded engine config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "lexiscene_engine", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "lexiscene_engine", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
