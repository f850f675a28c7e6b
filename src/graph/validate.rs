//! Graph validation: entry/edge resolution, cycle detection, topological order.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::types::NodeId;

use super::model::{Edge, Node};

/// Errors raised while compiling a graph, before any node runs.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum GraphCompileError {
    #[error("entry node `{0}` does not resolve to any node")]
    #[diagnostic(code(taskgraph::graph::missing_entry))]
    MissingEntry(NodeId),

    #[error("duplicate node id `{0}`")]
    #[diagnostic(code(taskgraph::graph::duplicate_node_id))]
    DuplicateNodeId(NodeId),

    #[error("edge references unknown node `{0}`")]
    #[diagnostic(
        code(taskgraph::graph::dangling_edge),
        help("Every edge endpoint must resolve to a node added to the graph.")
    )]
    DanglingEdge(NodeId),

    #[error("cycle detected: {}", format_cycle(.0))]
    #[diagnostic(code(taskgraph::graph::cycle_detected))]
    CycleDetected(Vec<NodeId>),
}

fn format_cycle(path: &[NodeId]) -> String {
    path.iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Verify entry/edge resolution and acyclicity, then return a topological
/// order used purely as a scheduling tie-breaker.
pub(super) fn validate(
    entry: &NodeId,
    nodes: &FxHashMap<NodeId, Node>,
    edges: &[Edge],
) -> Result<Vec<NodeId>, GraphCompileError> {
    if !nodes.contains_key(entry) {
        return Err(GraphCompileError::MissingEntry(entry.clone()));
    }
    for edge in edges {
        if !nodes.contains_key(&edge.from) {
            return Err(GraphCompileError::DanglingEdge(edge.from.clone()));
        }
        if !nodes.contains_key(&edge.to) {
            return Err(GraphCompileError::DanglingEdge(edge.to.clone()));
        }
    }

    let mut adjacency: FxHashMap<&NodeId, Vec<&NodeId>> = FxHashMap::default();
    for id in nodes.keys() {
        adjacency.entry(id).or_default();
    }
    for edge in edges {
        adjacency.entry(&edge.from).or_default().push(&edge.to);
    }

    let mut colors: FxHashMap<&NodeId, Color> =
        nodes.keys().map(|id| (id, Color::White)).collect();
    let mut topo: Vec<NodeId> = Vec::with_capacity(nodes.len());
    let mut stack: Vec<&NodeId> = Vec::new();

    // Deterministic traversal order: sorted ids, entry first.
    let mut order: Vec<&NodeId> = nodes.keys().collect();
    order.sort();
    order.sort_by_key(|id| *id != entry);

    for start in order {
        if colors[start] == Color::White {
            dfs(start, &adjacency, &mut colors, &mut stack, &mut topo)?;
        }
    }

    topo.reverse();
    Ok(topo)
}

fn dfs<'a>(
    node: &'a NodeId,
    adjacency: &FxHashMap<&'a NodeId, Vec<&'a NodeId>>,
    colors: &mut FxHashMap<&'a NodeId, Color>,
    stack: &mut Vec<&'a NodeId>,
    topo: &mut Vec<NodeId>,
) -> Result<(), GraphCompileError> {
    colors.insert(node, Color::Gray);
    stack.push(node);

    if let Some(successors) = adjacency.get(node) {
        for &next in successors {
            match colors[next] {
                Color::White => dfs(next, adjacency, colors, stack, topo)?,
                Color::Gray => {
                    let start = stack.iter().position(|&id| id == next).unwrap_or(0);
                    let mut cycle: Vec<NodeId> =
                        stack[start..].iter().map(|id| (*id).clone()).collect();
                    cycle.push(next.clone());
                    return Err(GraphCompileError::CycleDetected(cycle));
                }
                Color::Black => {}
            }
        }
    }

    stack.pop();
    colors.insert(node, Color::Black);
    topo.push(node.clone());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeKind;

    fn node(id: &str) -> Node {
        Node::new(id, NodeKind::Task)
    }

    #[test]
    fn accepts_linear_dag() {
        let nodes: FxHashMap<NodeId, Node> = [node("a"), node("b"), node("c")]
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();
        let edges = vec![Edge::new("a", "b"), Edge::new("b", "c")];
        let topo = validate(&NodeId::from("a"), &nodes, &edges).unwrap();
        let pos = |id: &str| topo.iter().position(|n| n.as_str() == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    #[test]
    fn rejects_cycle() {
        let nodes: FxHashMap<NodeId, Node> = [node("a"), node("b"), node("c")]
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();
        let edges = vec![Edge::new("a", "b"), Edge::new("b", "c"), Edge::new("c", "a")];
        let err = validate(&NodeId::from("a"), &nodes, &edges).unwrap_err();
        assert!(matches!(err, GraphCompileError::CycleDetected(_)));
    }

    #[test]
    fn rejects_dangling_edge() {
        let nodes: FxHashMap<NodeId, Node> = [node("a")]
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();
        let edges = vec![Edge::new("a", "ghost")];
        let err = validate(&NodeId::from("a"), &nodes, &edges).unwrap_err();
        assert_eq!(err, GraphCompileError::DanglingEdge(NodeId::from("ghost")));
    }

    #[test]
    fn rejects_missing_entry() {
        let nodes: FxHashMap<NodeId, Node> = [node("a")]
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();
        let err = validate(&NodeId::from("ghost"), &nodes, &[]).unwrap_err();
        assert_eq!(err, GraphCompileError::MissingEntry(NodeId::from("ghost")));
    }
}
