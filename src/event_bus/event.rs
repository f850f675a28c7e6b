//! The fixed event taxonomy emitted by the Graph Executor, Gate Engine,
//! State Store, and Token-Budget Governor.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::gate::GatePolicyResult;
use crate::types::NodeId;

/// One entry in a session's append-only timeline.
///
/// This is the textual projection of an [`Event`] that gets persisted to
/// disk; see [`Event::to_timeline_event`].
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TimelineEvent {
    pub ts: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The closed set of event kinds the core emits. See [`Event::kind_str`] for
/// the exact `taskgraph:*` / `guard:*` / `resource:*` strings the taxonomy
/// requires whenever an event crosses a textual boundary (timeline, logs).
#[derive(Clone, Debug)]
pub enum Event {
    TaskGraphCreated { graph_name: Option<String> },
    NodeStarted { node_id: NodeId, step: u64 },
    NodeCompleted { node_id: NodeId, output: Option<Value> },
    NodeFailed { node_id: NodeId, reason: String },
    NodeSkipped { node_id: NodeId, reason: String },
    NodeGated { node_id: NodeId, result: GatePolicyResult },
    NodeBypassGates { node_id: NodeId, reason: String },
    WorkflowCompleted { status: String },
    GuardValidated { report_id: String },
    GuardBlock { node_id: NodeId, reason: String },
    TestingFailure { run_id: String },
    ResourceWarning { percentage: f64 },
    ResourceCritical { percentage: f64 },
    ResourceGovernorCritical { percentage: f64 },
    ResourceCheckpoint { checkpoint_id: String },
    SessionEnd { session_id: String },
    EvidenceUpdated { stream: &'static str },
    StatePersistenceDegraded { attempts: u32 },
}

impl Event {
    /// The exact wire/log string for this event's kind, per the taxonomy.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Event::TaskGraphCreated { .. } => "taskgraph:created",
            Event::NodeStarted { .. } => "taskgraph:node:started",
            Event::NodeCompleted { .. } => "taskgraph:node:completed",
            Event::NodeFailed { .. } => "taskgraph:node:failed",
            Event::NodeSkipped { .. } => "taskgraph:node:skipped",
            Event::NodeGated { .. } => "taskgraph:node:gated",
            Event::NodeBypassGates { .. } => "taskgraph:node:bypass_gates",
            Event::WorkflowCompleted { .. } => "taskgraph:workflow:completed",
            Event::GuardValidated { .. } => "guard:validated",
            Event::GuardBlock { .. } => "guard:block",
            Event::TestingFailure { .. } => "testing:failure",
            Event::ResourceWarning { .. } => "resource:warning",
            Event::ResourceCritical { .. } => "resource:critical",
            Event::ResourceGovernorCritical { .. } => "resource:governor:critical",
            Event::ResourceCheckpoint { .. } => "resource:checkpoint",
            Event::SessionEnd { .. } => "session:end",
            Event::EvidenceUpdated { .. } => "evidence:updated",
            Event::StatePersistenceDegraded { .. } => "state:persistence:degraded",
        }
    }

    /// Human-readable one-line summary of this event.
    pub fn summary(&self) -> String {
        match self {
            Event::TaskGraphCreated { graph_name } => format!(
                "graph created{}",
                graph_name.as_deref().map(|n| format!(" ({n})")).unwrap_or_default()
            ),
            Event::NodeStarted { node_id, step } => format!("{node_id} started at step {step}"),
            Event::NodeCompleted { node_id, .. } => format!("{node_id} completed"),
            Event::NodeFailed { node_id, reason } => format!("{node_id} failed: {reason}"),
            Event::NodeSkipped { node_id, reason } => format!("{node_id} skipped: {reason}"),
            Event::NodeGated { node_id, result } => {
                format!("{node_id} gated: {:?} ({})", result.status, result.reason)
            }
            Event::NodeBypassGates { node_id, reason } => {
                format!("{node_id} bypassed gates: {reason}")
            }
            Event::WorkflowCompleted { status } => format!("workflow finished: {status}"),
            Event::GuardValidated { report_id } => format!("guard report {report_id} validated"),
            Event::GuardBlock { node_id, reason } => format!("{node_id} blocked by guard: {reason}"),
            Event::TestingFailure { run_id } => format!("test run {run_id} failed"),
            Event::ResourceWarning { percentage } => {
                format!("token usage entered conservative mode at {percentage:.1}%")
            }
            Event::ResourceCritical { percentage } => {
                format!("token usage entered critical mode at {percentage:.1}%")
            }
            Event::ResourceGovernorCritical { percentage } => {
                format!("governor critical at {percentage:.1}%")
            }
            Event::ResourceCheckpoint { checkpoint_id } => {
                format!("checkpoint {checkpoint_id} created")
            }
            Event::SessionEnd { session_id } => format!("session {session_id} ended"),
            Event::EvidenceUpdated { stream } => format!("{stream} evidence updated"),
            Event::StatePersistenceDegraded { attempts } => {
                format!("persistence degraded after {attempts} attempt(s)")
            }
        }
    }

    fn data(&self) -> Option<Value> {
        match self {
            Event::NodeStarted { node_id, step } => {
                Some(serde_json::json!({ "nodeId": node_id.as_str(), "step": step }))
            }
            Event::NodeCompleted { node_id, output } => Some(serde_json::json!({
                "nodeId": node_id.as_str(),
                "output": output,
            })),
            Event::NodeFailed { node_id, reason } => {
                Some(serde_json::json!({ "nodeId": node_id.as_str(), "reason": reason }))
            }
            Event::NodeSkipped { node_id, reason } => {
                Some(serde_json::json!({ "nodeId": node_id.as_str(), "reason": reason }))
            }
            Event::NodeGated { node_id, result } => Some(serde_json::json!({
                "nodeId": node_id.as_str(),
                "result": result,
            })),
            Event::NodeBypassGates { node_id, reason } => Some(serde_json::json!({
                "nodeId": node_id.as_str(),
                "reason": reason,
            })),
            _ => None,
        }
    }

    /// Project this event into the timeline record shape persisted to disk.
    pub fn to_timeline_event(&self, ts: DateTime<Utc>) -> TimelineEvent {
        TimelineEvent {
            ts,
            kind: self.kind_str().to_string(),
            summary: self.summary(),
            data: self.data(),
        }
    }
}
