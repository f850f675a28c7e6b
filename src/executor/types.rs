//! Shared value types used by the Graph Executor: the host-facing context
//! view, runner output, cancellation, and per-node scheduling state.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gate::{GatePolicyResult, NextToolCall};
use crate::types::NodeId;

/// Graph-level metadata exposed to runners through [`ContextView`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GraphMeta {
    pub name: Option<String>,
}

/// Read-only snapshot handed to a [`super::TaskRunner`] on every invocation.
///
/// `results` only contains entries for nodes that have already reached a
/// terminal success state (`completed`, or `skipped` under `onError=skip`);
/// a node's own entry is never present in the view passed to itself.
#[derive(Clone, Debug, Default)]
pub struct ContextView {
    pub results: FxHashMap<NodeId, Option<Value>>,
    pub payload: Value,
    pub graph_meta: GraphMeta,
}

impl ContextView {
    /// Project this view into the flat JSON document that edge conditions
    /// and gate-remediation templating are evaluated against:
    /// `{results: {<nodeId>: output}, payload}`.
    pub fn as_json(&self) -> Value {
        let results: serde_json::Map<String, Value> = self
            .results
            .iter()
            .map(|(id, output)| (id.as_str().to_string(), output.clone().unwrap_or(Value::Null)))
            .collect();
        serde_json::json!({
            "results": results,
            "payload": self.payload,
        })
    }
}

/// What a [`super::TaskRunner`] returns on success.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunnerOutput {
    pub output: Option<Value>,
    pub reason: Option<String>,
    #[serde(default)]
    pub next_tool_calls: Vec<SuggestedToolCall>,
}

/// A tool call a runner suggests, separate from the Gate Engine's own
/// remediation suggestions (see [`NextToolCall`]).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuggestedToolCall {
    pub tool: String,
    pub args: Value,
    pub reason: String,
}

/// Cooperative cancellation handle passed to every runner invocation.
///
/// Backed by a `tokio::sync::watch<bool>`: cheap to clone, and a single
/// workflow-level cancel fans out to every in-flight node without the
/// executor having to track individual handles.
#[derive(Clone)]
pub struct CancelSignal {
    rx: tokio::sync::watch::Receiver<bool>,
}

impl CancelSignal {
    pub(crate) fn new(rx: tokio::sync::watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// True if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. A well-behaved runner
    /// selects on this alongside its own I/O.
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// The seven states a node can occupy during a workflow run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
    Blocked,
}

impl NodeState {
    /// Whether a node in this state should be treated as a satisfied,
    /// "passed through" predecessor for readiness purposes.
    pub fn counts_as_satisfied(self) -> bool {
        matches!(self, NodeState::Completed | NodeState::Skipped)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeState::Completed | NodeState::Failed | NodeState::Skipped
        )
    }
}

/// Why a node reached `skipped`, tracked internally so edge-activation
/// semantics can tell "treated as completed with no output" (onError=skip)
/// apart from "not chosen / transitively cut off" (propagates downward).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SkipKind {
    OnErrorSkip,
    NotChosenOrPropagated,
}

/// Bookkeeping the scheduler keeps per node across a run.
#[derive(Clone, Debug)]
pub(crate) struct NodeRuntime {
    pub state: NodeState,
    pub attempts: u32,
    pub output: Option<Value>,
    pub reason: Option<String>,
    pub gate_result: Option<GatePolicyResult>,
    pub next_tool_calls: Vec<NextToolCall>,
    pub skip_kind: Option<SkipKind>,
}

impl NodeRuntime {
    pub fn new() -> Self {
        Self {
            state: NodeState::Pending,
            attempts: 0,
            output: None,
            reason: None,
            gate_result: None,
            next_tool_calls: Vec::new(),
            skip_kind: None,
        }
    }
}

/// Tunables for one [`super::GraphExecutor`] run.
#[derive(Clone, Debug)]
pub struct ExecutorOptions {
    pub concurrency_limit: usize,
    /// When true, every gated node is completed via the audited bypass
    /// path instead of being evaluated against evidence.
    pub bypass_gates: bool,
    pub bypass_reason: String,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            bypass_gates: false,
            bypass_reason: "bypassGates enabled for this run".to_string(),
        }
    }
}
