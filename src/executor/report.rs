//! The summary a workflow run hands back to the host.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gate::{GatePolicyResult, NextToolCall};
use crate::types::NodeId;

/// Final disposition of a workflow run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// No node is `failed` or `blocked`.
    Completed,
    /// At least one node is `blocked` and none is `failed`.
    Blocked,
    /// At least one node is `failed`.
    Failed,
}

/// Per-node outcome recorded in a [`WorkflowReport`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeResult {
    pub status: String,
    pub output: Option<Value>,
    pub reason: Option<String>,
    pub gate_result: Option<GatePolicyResult>,
    #[serde(default)]
    pub next_tool_calls: Vec<NextToolCall>,
}

/// The full result of driving a [`super::GraphExecutor`] to completion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub status: WorkflowStatus,
    pub completed_nodes: Vec<NodeId>,
    pub blocked_nodes: Vec<NodeId>,
    pub failed_nodes: Vec<NodeId>,
    pub skipped_nodes: Vec<NodeId>,
    pub node_results: FxHashMap<NodeId, NodeResult>,
}
