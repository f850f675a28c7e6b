//! State Store: the single source of truth for evidence, session, timeline,
//! and checkpoint state, persisted atomically under a project's `.state/`
//! directory.

mod persistence;
mod session;

pub use persistence::{PersistenceError, StatePaths};
pub use session::{
    Checkpoint, CheckpointParams, CheckpointReason, ResumeState, SessionMetadata, SessionState,
    Timeline, DEFAULT_DEBOUNCE_MS, DEFAULT_MAX_CHECKPOINTS, DEFAULT_TIMELINE_CAP,
};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::evidence::{EvidenceState, GuardEvidence, TestEvidence, TokenUsage};
use crate::event_bus::{Event, EventBus};

/// Degraded-persistence threshold: after this many consecutive debounced
/// save failures the store emits `state:persistence:degraded`.
const DEGRADED_SAVE_THRESHOLD: u32 = 3;

/// Everything the State Store needs to know about the currently loaded
/// session and its evidence, held behind a single lock so reads/writes are
/// serialized the way the teacher's `AppState` guards its versioned state.
struct Inner {
    paths: StatePaths,
    evidence: EvidenceState,
    session: Option<SessionState>,
    checkpoints: Vec<String>,
    token_usage: TokenUsage,
    max_checkpoints: usize,
    consecutive_save_failures: u32,
}

/// Persists evidence, session/timeline state, and checkpoints for one
/// project, emitting lifecycle events over an [`EventBus`] as it goes.
///
/// Debounced saves (session + timeline + token counters) are generation
/// counted: each mutation bumps a generation, and a deferred save only
/// commits to disk if its generation still matches when the debounce window
/// elapses. Checkpoint writes are always synchronous.
pub struct StateStore {
    inner: Mutex<Inner>,
    events: Arc<EventBus>,
    generation: AtomicU32,
    debounce_ms: u64,
}

impl StateStore {
    /// Open (but do not yet populate) a store rooted at `project_root`.
    pub fn new(project_root: impl Into<std::path::PathBuf>, events: Arc<EventBus>) -> Self {
        Self::with_limits(
            project_root,
            events,
            DEFAULT_MAX_CHECKPOINTS,
            DEFAULT_DEBOUNCE_MS,
        )
    }

    pub fn with_limits(
        project_root: impl Into<std::path::PathBuf>,
        events: Arc<EventBus>,
        max_checkpoints: usize,
        debounce_ms: u64,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                paths: StatePaths::new(project_root),
                evidence: EvidenceState::default(),
                session: None,
                checkpoints: Vec::new(),
                token_usage: TokenUsage::new(0, 0, Utc::now()),
                max_checkpoints,
                consecutive_save_failures: 0,
            }),
            events,
            generation: AtomicU32::new(0),
            debounce_ms,
        }
    }

    // ---- evidence -----------------------------------------------------

    pub fn get_evidence(&self) -> EvidenceState {
        self.inner.lock().evidence.clone()
    }

    pub async fn set_guard_evidence(self: &Arc<Self>, evidence: GuardEvidence) {
        {
            let mut inner = self.inner.lock();
            inner.evidence.last_guard_run = Some(evidence);
        }
        self.events.emit(Event::EvidenceUpdated { stream: "guard" });
        self.schedule_debounced_save();
    }

    pub async fn set_test_evidence(self: &Arc<Self>, evidence: TestEvidence) {
        {
            let mut inner = self.inner.lock();
            inner.evidence.last_test_run = Some(evidence);
        }
        self.events.emit(Event::EvidenceUpdated { stream: "test" });
        self.schedule_debounced_save();
    }

    // ---- session --------------------------------------------------------

    pub fn get_session(&self) -> Option<SessionState> {
        self.inner.lock().session.clone()
    }

    /// Start a new session, or restore the most recently created one found
    /// on disk under `project_root` if `session_id` names an existing file.
    pub async fn create_session(&self, project_root: impl Into<String>) -> SessionState {
        let project_root = project_root.into();
        let now = Utc::now();
        let session_id = Uuid::new_v4().to_string();
        let state = SessionState::new(session_id, project_root, now);
        {
            let mut inner = self.inner.lock();
            inner.session = Some(state.clone());
        }
        self.save_session_now().await;
        state
    }

    /// Load a previously persisted session by id. Missing or malformed
    /// files yield `None` rather than an error; the caller falls back to
    /// `create_session`.
    pub async fn resume_session(&self, session_id: &str) -> Option<SessionState> {
        let path = { self.inner.lock().paths.session_file(session_id) };
        let loaded: Option<SessionState> = persistence::read_json_optional(path).await.ok().flatten();
        if let Some(mut state) = loaded {
            state.metadata.resume_count += 1;
            state.updated_at = Utc::now();
            state.paused = false;
            {
                let mut inner = self.inner.lock();
                inner.session = Some(state.clone());
            }
            self.save_session_now().await;
            Some(state)
        } else {
            None
        }
    }

    pub async fn pause_session(&self) {
        {
            let mut inner = self.inner.lock();
            if let Some(session) = inner.session.as_mut() {
                session.paused = true;
            }
        }
        self.save_session_now().await;
    }

    pub async fn end_session(&self) {
        let session_id = {
            let mut inner = self.inner.lock();
            inner.session.as_mut().map(|s| {
                s.updated_at = Utc::now();
                s.session_id.clone()
            })
        };
        self.save_session_now().await;
        if let Some(session_id) = session_id {
            self.events.emit(Event::SessionEnd { session_id });
        }
    }

    // ---- timeline -------------------------------------------------------

    pub async fn record_event(self: &Arc<Self>, event: &Event) {
        {
            let mut inner = self.inner.lock();
            if let Some(session) = inner.session.as_mut() {
                session.timeline.push(event.to_timeline_event(Utc::now()));
                session.updated_at = Utc::now();
            }
        }
        self.schedule_debounced_save();
    }

    pub fn timeline(&self) -> Vec<crate::event_bus::TimelineEvent> {
        self.inner
            .lock()
            .session
            .as_ref()
            .map(|s| s.timeline.as_vec())
            .unwrap_or_default()
    }

    // ---- checkpoints -----------------------------------------------------

    /// Create and synchronously persist a checkpoint, evicting the oldest
    /// checkpoint(s) if `max_checkpoints` would otherwise be exceeded.
    pub async fn create_checkpoint(&self, params: CheckpointParams) -> Checkpoint {
        let (checkpoint, to_evict, paths, checkpoint_path) = {
            let mut inner = self.inner.lock();
            let now = Utc::now();
            let id = Uuid::new_v4().to_string();
            let module_states_snapshot = inner
                .session
                .as_ref()
                .map(|s| s.module_states.clone())
                .unwrap_or_default();
            let checkpoint = Checkpoint {
                id: id.clone(),
                name: params.name,
                created_at: now,
                reason: params.reason.unwrap_or(CheckpointReason::Manual),
                token_usage: inner.token_usage,
                module_states_snapshot,
                files_changed: params.files_changed,
                metadata: serde_json::Map::new(),
                resume_state: params.resume_state,
            };

            inner.checkpoints.push(id.clone());
            let mut evicted = Vec::new();
            while inner.checkpoints.len() > inner.max_checkpoints {
                evicted.push(inner.checkpoints.remove(0));
            }
            if let Some(session) = inner.session.as_mut() {
                session.latest_checkpoint_id = Some(id.clone());
                session.updated_at = now;
            }

            let paths = inner.paths.clone();
            let checkpoint_path = paths.checkpoint_file(&id);
            (checkpoint, evicted, paths, checkpoint_path)
        };

        if let Err(err) = persistence::write_json_atomic(checkpoint_path, &checkpoint).await {
            tracing::warn!(error = %err, "failed to persist checkpoint");
        }
        for evicted_id in to_evict {
            let _ = persistence::remove_file_if_exists(paths.checkpoint_file(&evicted_id)).await;
        }
        self.save_session_now().await;

        self.events.emit(Event::ResourceCheckpoint {
            checkpoint_id: checkpoint.id.clone(),
        });
        checkpoint
    }

    pub async fn list_checkpoints(&self) -> Vec<String> {
        let (in_memory, dir) = {
            let inner = self.inner.lock();
            (inner.checkpoints.clone(), inner.paths.checkpoints_dir())
        };
        if !in_memory.is_empty() {
            return in_memory;
        }
        persistence::list_checkpoint_ids(dir).await.unwrap_or_default()
    }

    pub async fn restore_checkpoint(&self, id: &str) -> Option<Checkpoint> {
        let path = { self.inner.lock().paths.checkpoint_file(id) };
        let checkpoint: Option<Checkpoint> =
            persistence::read_json_optional(path).await.ok().flatten();
        if let Some(checkpoint) = &checkpoint {
            let mut inner = self.inner.lock();
            if let Some(session) = inner.session.as_mut() {
                session.module_states = checkpoint.module_states_snapshot.clone();
                session.latest_checkpoint_id = Some(checkpoint.id.clone());
                session.updated_at = Utc::now();
            }
            inner.token_usage = checkpoint.token_usage;
        }
        checkpoint
    }

    pub async fn delete_checkpoint(&self, id: &str) {
        let path = {
            let mut inner = self.inner.lock();
            inner.checkpoints.retain(|c| c != id);
            inner.paths.checkpoint_file(id)
        };
        let _ = persistence::remove_file_if_exists(path).await;
    }

    // ---- token usage -----------------------------------------------------

    pub async fn update_token_usage(
        self: &Arc<Self>,
        used: u64,
        estimated_total: Option<u64>,
    ) -> TokenUsage {
        let usage = {
            let mut inner = self.inner.lock();
            let estimated = estimated_total.unwrap_or(inner.token_usage.estimated_total);
            let usage = TokenUsage::new(used, estimated, Utc::now());
            inner.token_usage = usage;
            usage
        };
        self.schedule_debounced_save();
        usage
    }

    pub fn token_usage(&self) -> TokenUsage {
        self.inner.lock().token_usage
    }

    // ---- persistence plumbing --------------------------------------------

    async fn save_session_now(&self) {
        let (path, session) = {
            let inner = self.inner.lock();
            let Some(session) = inner.session.clone() else {
                return;
            };
            (inner.paths.session_file(&session.session_id), session)
        };
        self.write_session(path, &session).await;
    }

    /// Defer a save by `debounce_ms` on a background task; if another
    /// mutation bumps the generation before the window elapses, this save is
    /// a no-op (the later save wins). Callers never wait on the debounce
    /// window — only on the in-memory mutation that precedes this call.
    fn schedule_debounced_save(self: &Arc<Self>) {
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(this.debounce_ms)).await;
            if this.generation.load(Ordering::SeqCst) != my_generation {
                return;
            }
            this.save_session_now().await;
        });
    }

    async fn write_session(&self, path: std::path::PathBuf, session: &SessionState) {
        match persistence::write_json_atomic(path, session).await {
            Ok(()) => {
                self.inner.lock().consecutive_save_failures = 0;
            }
            Err(err) => {
                let attempts = {
                    let mut inner = self.inner.lock();
                    inner.consecutive_save_failures += 1;
                    inner.consecutive_save_failures
                };
                tracing::warn!(error = %err, attempts, "debounced session save failed");
                if attempts >= DEGRADED_SAVE_THRESHOLD {
                    self.events.emit(Event::StatePersistenceDegraded { attempts });
                }
            }
        }
    }

    /// Export the current session to `export-<iso-timestamp>.json`, returning
    /// the path written.
    pub async fn export_session(&self, now: DateTime<Utc>) -> Option<std::path::PathBuf> {
        let (path, session) = {
            let inner = self.inner.lock();
            let session = inner.session.clone()?;
            (inner.paths.export_file(&now.to_rfc3339()), session)
        };
        persistence::write_json_atomic(path.clone(), &session)
            .await
            .ok()?;
        Some(path)
    }
}
