//! Fluent construction of a [`WorkflowGraph`].

use rustc_hash::FxHashMap;

use crate::types::NodeId;

use super::model::{Edge, GraphDefaults, Node, WorkflowGraph};
use super::validate::{validate, GraphCompileError};

/// Assembles nodes and edges, then validates and freezes them into a
/// [`WorkflowGraph`] via [`GraphBuilder::compile`].
///
/// Graphs are immutable after validation: the host builds one, hands it to
/// the executor, and never mutates it again.
#[derive(Default)]
pub struct GraphBuilder {
    name: Option<String>,
    entry: Option<NodeId>,
    nodes: FxHashMap<NodeId, Node>,
    duplicate: Option<NodeId>,
    edges: Vec<Edge>,
    defaults: GraphDefaults,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_entry(mut self, entry: impl Into<NodeId>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    #[must_use]
    pub fn with_defaults(mut self, defaults: GraphDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Add a node. The first node added becomes the entry unless
    /// [`GraphBuilder::with_entry`] is called explicitly.
    #[must_use]
    pub fn add_node(mut self, node: Node) -> Self {
        if self.entry.is_none() {
            self.entry = Some(node.id.clone());
        }
        if self.nodes.contains_key(&node.id) && self.duplicate.is_none() {
            self.duplicate = Some(node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
        self
    }

    #[must_use]
    pub fn add_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Validate and freeze the graph.
    ///
    /// Checks, in order: no duplicate node ids; `entry` resolves to a node;
    /// every edge endpoint resolves to a node; the graph is acyclic. The
    /// returned topological order is a scheduling tie-breaker only, never a
    /// strict phase barrier.
    pub fn compile(self) -> Result<WorkflowGraph, GraphCompileError> {
        if let Some(dup) = self.duplicate {
            return Err(GraphCompileError::DuplicateNodeId(dup));
        }
        let entry = self
            .entry
            .ok_or_else(|| GraphCompileError::MissingEntry(NodeId::from("<none>")))?;

        let topo_order = validate(&entry, &self.nodes, &self.edges)?;

        Ok(WorkflowGraph {
            schema_version: "1".to_string(),
            name: self.name,
            entry,
            nodes: self.nodes,
            edges: self.edges,
            defaults: self.defaults,
            topo_order,
        })
    }
}
