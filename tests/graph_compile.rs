use taskgraph_core::graph::{Edge, EdgeCondition, GraphBuilder, GraphCompileError, Node};
use taskgraph_core::types::NodeKind;

fn task(id: &str) -> Node {
    Node::new(id, NodeKind::Task)
}

#[test]
fn linear_graph_compiles_with_deterministic_topo_order() {
    let graph = GraphBuilder::new()
        .add_node(task("a"))
        .add_node(task("b"))
        .add_node(task("c"))
        .add_edge(Edge::new("a", "b"))
        .add_edge(Edge::new("b", "c"))
        .compile()
        .unwrap();

    assert_eq!(graph.node_count(), 3);
    let order = graph.topo_order();
    let pos = |id: &str| order.iter().position(|n| n.as_str() == id).unwrap();
    assert!(pos("a") < pos("b"));
    assert!(pos("b") < pos("c"));
}

#[test]
fn diamond_graph_compiles() {
    let graph = GraphBuilder::new()
        .add_node(task("start"))
        .add_node(task("left"))
        .add_node(task("right"))
        .add_node(task("join"))
        .add_edge(Edge::new("start", "left"))
        .add_edge(Edge::new("start", "right"))
        .add_edge(Edge::new("left", "join"))
        .add_edge(Edge::new("right", "join"))
        .compile()
        .unwrap();

    assert_eq!(graph.node_count(), 4);
    assert_eq!(graph.incoming_edges(&"join".into()).count(), 2);
}

#[test]
fn cycle_is_rejected_at_compile_time() {
    let err = GraphBuilder::new()
        .add_node(task("a"))
        .add_node(task("b"))
        .add_edge(Edge::new("a", "b"))
        .add_edge(Edge::new("b", "a"))
        .compile()
        .unwrap_err();

    assert!(matches!(err, GraphCompileError::CycleDetected(_)));
}

#[test]
fn dangling_edge_is_rejected() {
    let err = GraphBuilder::new()
        .add_node(task("a"))
        .add_edge(Edge::new("a", "ghost"))
        .compile()
        .unwrap_err();

    assert!(matches!(err, GraphCompileError::DanglingEdge(_)));
}

#[test]
fn duplicate_node_id_is_rejected() {
    let err = GraphBuilder::new()
        .add_node(task("a"))
        .add_node(task("a"))
        .compile()
        .unwrap_err();

    assert!(matches!(err, GraphCompileError::DuplicateNodeId(_)));
}

#[test]
fn decision_edges_carry_conditions() {
    let graph = GraphBuilder::new()
        .add_node(Node::new("decide", NodeKind::Decision))
        .add_node(task("ok_path"))
        .add_node(task("fail_path"))
        .add_edge(
            Edge::new("decide", "ok_path")
                .with_condition(EdgeCondition::Equals {
                    path: "results.decide.success".to_string(),
                    value: serde_json::json!(true),
                }),
        )
        .add_edge(
            Edge::new("decide", "fail_path")
                .with_condition(EdgeCondition::Equals {
                    path: "results.decide.success".to_string(),
                    value: serde_json::json!(false),
                }),
        )
        .compile()
        .unwrap();

    assert_eq!(graph.outgoing_edges(&"decide".into()).count(), 2);
}
