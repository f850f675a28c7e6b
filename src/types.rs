//! Small shared value types used across the orchestrator core.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a node within a [`crate::graph::WorkflowGraph`].
///
/// Nodes are referenced by id everywhere (arena-by-id, not by ownership
/// pointers) so that the graph's adjacency lists can express cycles for
/// validation purposes without creating Rust ownership cycles.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        NodeId(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        NodeId(value)
    }
}

/// Work phase a node belongs to. Used to derive a phase-based default for
/// `gateRequired` (impl/test/review default to gated, analysis/plan do not).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Analysis,
    Plan,
    Impl,
    Review,
    Test,
}

impl Phase {
    /// Phase default for `gateRequired`, applied when a node and its graph
    /// do not specify one explicitly.
    pub fn default_gate_required(self) -> bool {
        matches!(self, Phase::Impl | Phase::Review | Phase::Test)
    }
}

/// What to do with a node (and its dependents) when its runner fails after
/// exhausting the retry budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Node becomes `failed`; transitive dependents become `skipped`.
    #[default]
    Fail,
    /// Node becomes `skipped`; dependents proceed as if it completed with no output.
    Skip,
    /// Node becomes `completed` with the error recorded in its output; dependents proceed.
    Continue,
}

/// The three node kinds recognized by the executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Task,
    /// Scheduling-wise identical to `Task`; conventionally waits on multiple
    /// incoming edges. Join satisfaction is enforced by the executor, not by
    /// a distinct runtime state.
    Join,
    /// Evaluates outgoing edge conditions to select the next branch.
    Decision,
}
