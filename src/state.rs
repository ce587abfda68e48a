//! Application state: live sessions, backend clients, and engine config.
//!
//! This module owns:
//!   - the session store (session id -> state machine + cached scene bytes)
//!   - the scene fetcher, detection client, and progress client
//!   - the engine config (from TOML or defaults)
//!
//! Mutations happen under short write-lock scopes; nothing holds a lock across
//! a network call. Slow work (scene fetch, detection, score submission) runs
//! outside and re-checks the store when it comes back.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::config::{load_engine_config_from_env, EngineConfig};
use crate::detect::DetectClient;
use crate::progress::ProgressClient;
use crate::scene::{SceneFetcher, ScenePayload};
use crate::session::ExerciseSession;
use crate::util::backend_base_url;

/// One live session: the state machine plus the scene bytes fetched for it.
pub struct SessionEntry {
    pub session: ExerciseSession,
    /// Filled on the first detection-bearing interaction, reused afterwards.
    pub scene: Option<Arc<ScenePayload>>,
}

impl SessionEntry {
    pub fn new(session: ExerciseSession) -> Self {
        Self { session, scene: None }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    pub scenes: Option<SceneFetcher>,
    pub detector: Option<DetectClient>,
    pub progress: Option<ProgressClient>,
    pub config: EngineConfig,
    pub backend_base: String,
}

impl AppState {
    /// Build state from env: load config, resolve the backend base, init clients.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_engine_config_from_env().unwrap_or_default();
        let backend_base = backend_base_url();

        let scenes = SceneFetcher::from_env();
        let detector = DetectClient::from_env();
        let progress = ProgressClient::from_env();
        if detector.is_some() && progress.is_some() {
            info!(target: "lexiscene_engine", base_url = %backend_base, "Content backend clients ready.");
        } else {
            info!(target: "lexiscene_engine", "HTTP client init failed; detection and score reporting disabled.");
        }

        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            scenes,
            detector,
            progress,
            config,
            backend_base,
        }
    }

    /// Register a new session and hand back its id.
    #[instrument(level = "debug", skip(self, session), fields(group_id = session.unit().group_id))]
    pub async fn insert_session(&self, session: ExerciseSession) -> String {
        let id = session.id().to_string();
        let mut sessions = self.sessions.write().await;
        sessions.insert(id.clone(), SessionEntry::new(session));
        id
    }

    /// Drop a session. True if it was still present.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn remove_session(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id).is_some()
    }

    /// Cached scene bytes for a session, if already fetched.
    pub async fn cached_scene(&self, id: &str) -> Option<Arc<ScenePayload>> {
        let sessions = self.sessions.read().await;
        sessions.get(id).and_then(|e| e.scene.clone())
    }

    /// Remember fetched scene bytes. A racing second fetch may overwrite with
    /// identical content; harmless.
    pub async fn store_scene(&self, id: &str, payload: Arc<ScenePayload>) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(id) {
            entry.scene = Some(payload);
        }
    }
}
