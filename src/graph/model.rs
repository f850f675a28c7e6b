//! The workflow graph data model: nodes, edges, and the validated graph itself.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gate::GatePolicyOverride;
use crate::types::{NodeId, NodeKind, OnError, Phase};

/// A single node in a [`WorkflowGraph`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: Option<String>,
    pub phase: Option<Phase>,
    /// Explicit override of whether this node requires a passing gate to complete.
    pub gate_required: Option<bool>,
    /// Node-level partial override of the gate policy, shallow-merged over
    /// the graph default and the engine default.
    pub gate_policy: Option<GatePolicyOverride>,
    pub timeout_ms: Option<u64>,
    pub retries: u32,
    pub on_error: OnError,
    #[serde(default)]
    pub payload: Value,
}

impl Node {
    /// Start building a node with the given id and kind; all other fields default.
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            label: None,
            phase: None,
            gate_required: None,
            gate_policy: None,
            timeout_ms: None,
            retries: 3,
            on_error: OnError::default(),
            payload: Value::Null,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    #[must_use]
    pub fn with_gate_required(mut self, required: bool) -> Self {
        self.gate_required = Some(required);
        self
    }

    #[must_use]
    pub fn with_gate_policy(mut self, policy: GatePolicyOverride) -> Self {
        self.gate_policy = Some(policy);
        self
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub fn with_on_error(mut self, on_error: OnError) -> Self {
        self.on_error = on_error;
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Effective `gateRequired`: explicit node value > phase default > graph
    /// default > engine default (`false`).
    pub fn effective_gate_required(&self, graph_default: Option<bool>) -> bool {
        self.gate_required
            .or_else(|| self.phase.map(Phase::default_gate_required))
            .or(graph_default)
            .unwrap_or(false)
    }
}

/// One of the three condition forms an [`Edge`] may carry.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeCondition {
    /// Dotted path into the execution context equals `value`.
    Equals { path: String, value: Value },
    /// Path resolves to a non-null value.
    Exists { path: String },
    /// Value is truthy by JS-like rules (non-empty, non-zero, not `false`/`null`).
    Truthy { path: String },
}

impl EdgeCondition {
    /// Evaluate this condition against a dotted-path-addressable context.
    pub fn evaluate(&self, context: &Value) -> bool {
        match self {
            EdgeCondition::Equals { path, value } => {
                resolve_path(context, path).is_some_and(|found| found == value)
            }
            EdgeCondition::Exists { path } => {
                resolve_path(context, path).is_some_and(|found| !found.is_null())
            }
            EdgeCondition::Truthy { path } => {
                resolve_path(context, path).is_some_and(is_truthy)
            }
        }
    }
}

/// Resolve a dotted path (`a.b.c`) against a JSON value, returning `None` if
/// any segment is missing.
pub fn resolve_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// JS-like truthiness: `false`, `null`, `0`, `""`, and empty arrays/objects are falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_none_or(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// A directed edge between two nodes, with an optional condition.
///
/// An edge without a condition is unconditional and always activates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub condition: Option<EdgeCondition>,
}

impl Edge {
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
        }
    }

    #[must_use]
    pub fn with_condition(mut self, condition: EdgeCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn is_unconditional(&self) -> bool {
        self.condition.is_none()
    }
}

/// Graph-level defaults, overridden per-node where applicable.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GraphDefaults {
    pub gate_required: Option<bool>,
    pub gate_policy: Option<GatePolicyOverride>,
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
    pub concurrency_limit: Option<usize>,
}

/// A versioned, immutable-after-validation workflow graph.
///
/// Constructed exclusively through [`crate::graph::GraphBuilder::compile`],
/// which enforces the invariants documented on the fields below.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowGraph {
    /// Schema version string, currently always `"1"`.
    pub schema_version: String,
    /// Optional human-readable graph name; used to infer `taskType` heuristically.
    pub name: Option<String>,
    pub entry: NodeId,
    pub(crate) nodes: FxHashMap<NodeId, Node>,
    pub(crate) edges: Vec<Edge>,
    pub defaults: GraphDefaults,
    /// Cached topological order, used purely as a scheduling tie-breaker.
    pub(crate) topo_order: Vec<NodeId>,
}

impl WorkflowGraph {
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Topological order, used only to break dispatch ties deterministically.
    pub fn topo_order(&self) -> &[NodeId] {
        &self.topo_order
    }

    pub fn outgoing_edges(&self, id: &NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| &e.from == id)
    }

    pub fn incoming_edges(&self, id: &NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| &e.to == id)
    }

    pub fn has_incoming_edges(&self, id: &NodeId) -> bool {
        self.edges.iter().any(|e| &e.to == id)
    }
}
