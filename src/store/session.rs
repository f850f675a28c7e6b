//! Session, timeline, and checkpoint data types persisted by the State Store.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::evidence::TokenUsage;
use crate::event_bus::TimelineEvent;

/// Default cap on the number of timeline events retained in memory and on disk.
pub const DEFAULT_TIMELINE_CAP: usize = 10_000;
/// Default cap on the number of checkpoints retained per session.
pub const DEFAULT_MAX_CHECKPOINTS: usize = 20;
/// Default debounce window for session/timeline/token-counter saves.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Append-only, ring-buffered sequence of [`TimelineEvent`]s. Oldest entries
/// are trimmed once `cap` is exceeded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Timeline {
    cap: usize,
    events: VecDeque<TimelineEvent>,
}

impl Timeline {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            events: VecDeque::new(),
        }
    }

    pub fn push(&mut self, event: TimelineEvent) {
        self.events.push_back(event);
        while self.events.len() > self.cap {
            self.events.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimelineEvent> {
        self.events.iter()
    }

    pub fn as_vec(&self) -> Vec<TimelineEvent> {
        self.events.iter().cloned().collect()
    }
}

/// Free-form session metadata; `project_root` and `resume_count` are always
/// present, everything else round-trips through `extra` unmodified.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub project_root: String,
    pub resume_count: u32,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// In-memory representation of an active session; persisted atomically to
/// `session-<uuid>.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Opaque per-module state blobs, keyed by module name.
    pub module_states: FxHashMap<String, Value>,
    pub latest_checkpoint_id: Option<String>,
    pub timeline: Timeline,
    pub metadata: SessionMetadata,
    #[serde(default, skip)]
    pub paused: bool,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, project_root: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            created_at: now,
            updated_at: now,
            module_states: FxHashMap::default(),
            latest_checkpoint_id: None,
            timeline: Timeline::new(DEFAULT_TIMELINE_CAP),
            metadata: SessionMetadata {
                project_root: project_root.into(),
                resume_count: 0,
                extra: serde_json::Map::new(),
            },
            paused: false,
        }
    }
}

/// Why a checkpoint was created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointReason {
    AutoThreshold,
    Manual,
    TaskComplete,
    SessionEnd,
    ErrorRecovery,
    BeforeRiskyOperation,
}

/// Resume-hint payload embedded in a checkpoint, used to reconstruct the
/// host's in-flight plan when resuming from disk.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResumeState {
    pub current_task_id: Option<String>,
    pub current_task_name: Option<String>,
    pub last_completed_step: Option<u64>,
    pub next_actions: Vec<String>,
    pub required_tools: Vec<String>,
    pub recent_failures: Vec<String>,
    pub active_latent_task_id: Option<String>,
    pub active_latent_phase: Option<String>,
    pub summary: Option<String>,
}

/// A durable, named snapshot of session and module state, usable for resume.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub reason: CheckpointReason,
    pub token_usage: TokenUsage,
    pub module_states_snapshot: FxHashMap<String, Value>,
    pub files_changed: Vec<String>,
    pub metadata: serde_json::Map<String, Value>,
    pub resume_state: Option<ResumeState>,
}

/// Parameters for [`crate::store::StateStore::create_checkpoint`].
#[derive(Clone, Debug, Default)]
pub struct CheckpointParams {
    pub name: String,
    pub reason: Option<CheckpointReason>,
    pub files_changed: Vec<String>,
    pub resume_state: Option<ResumeState>,
}
