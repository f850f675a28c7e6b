use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;

use taskgraph_core::evidence::{GuardEvidence, RunStatus};
use taskgraph_core::event_bus::EventBus;
use taskgraph_core::executor::{
    ClosureRunner, ExecutorOptions, GraphExecutor, RunnerOutput, TaskRunner, WorkflowStatus,
};
use taskgraph_core::gate::GatePolicyOverride;
use taskgraph_core::graph::{Edge, EdgeCondition, GraphBuilder, Node};
use taskgraph_core::store::StateStore;
use taskgraph_core::types::{NodeKind, OnError, Phase};

fn bus_and_store() -> (Arc<EventBus>, Arc<StateStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let events = Arc::new(EventBus::new());
    let store = Arc::new(StateStore::new(dir.path().to_path_buf(), events.clone()));
    (events, store, dir)
}

fn echo_runner() -> Arc<dyn TaskRunner> {
    Arc::new(ClosureRunner::new(|node, _ctx, _cancel| {
        let id = node.id.as_str().to_string();
        Box::pin(async move {
            Ok(RunnerOutput {
                output: Some(json!({ "node": id })),
                reason: None,
                next_tool_calls: Vec::new(),
            })
        })
    }))
}

#[tokio::test]
async fn linear_graph_with_bypassed_gates_completes() {
    let (events, store, _dir) = bus_and_store();
    let graph = Arc::new(
        GraphBuilder::new()
            .add_node(Node::new("plan", NodeKind::Task).with_phase(Phase::Plan))
            .add_node(Node::new("build", NodeKind::Task).with_phase(Phase::Impl))
            .add_node(Node::new("review", NodeKind::Task).with_phase(Phase::Review))
            .add_edge(Edge::new("plan", "build"))
            .add_edge(Edge::new("build", "review"))
            .compile()
            .unwrap(),
    );

    let executor = GraphExecutor::new(
        graph,
        store,
        events,
        echo_runner(),
        ExecutorOptions {
            bypass_gates: true,
            ..Default::default()
        },
    );
    let (_tx, rx) = GraphExecutor::cancel_channel();
    let report = executor.execute(json!({}), rx).await;

    assert_eq!(report.status, WorkflowStatus::Completed);
    assert_eq!(report.completed_nodes.len(), 3);
    assert!(report.blocked_nodes.is_empty());
}

#[tokio::test]
async fn diamond_graph_joins_both_branches_under_concurrency_cap() {
    let (events, store, _dir) = bus_and_store();
    let graph = Arc::new(
        GraphBuilder::new()
            .add_node(Node::new("start", NodeKind::Task))
            .add_node(Node::new("left", NodeKind::Task))
            .add_node(Node::new("right", NodeKind::Task))
            .add_node(Node::new("join", NodeKind::Join))
            .add_edge(Edge::new("start", "left"))
            .add_edge(Edge::new("start", "right"))
            .add_edge(Edge::new("left", "join"))
            .add_edge(Edge::new("right", "join"))
            .compile()
            .unwrap(),
    );

    let executor = GraphExecutor::new(
        graph,
        store,
        events,
        echo_runner(),
        ExecutorOptions {
            concurrency_limit: 2,
            ..Default::default()
        },
    );
    let (_tx, rx) = GraphExecutor::cancel_channel();
    let report = executor.execute(json!({}), rx).await;

    assert_eq!(report.status, WorkflowStatus::Completed);
    assert_eq!(report.completed_nodes.len(), 4);
}

/// A runner that tracks how many of its invocations are in flight at once,
/// via a shared counter incremented on entry and decremented on exit around
/// a short sleep, recording the peak observed.
fn concurrency_tracking_runner(running: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Arc<dyn TaskRunner> {
    Arc::new(ClosureRunner::new(move |node, _ctx, _cancel| {
        let id = node.id.as_str().to_string();
        let running = running.clone();
        let peak = peak.clone();
        Box::pin(async move {
            let now_running = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now_running, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(RunnerOutput {
                output: Some(json!({ "node": id })),
                reason: None,
                next_tool_calls: Vec::new(),
            })
        })
    }))
}

#[tokio::test]
async fn diamond_graph_runs_branches_concurrently_within_the_cap() {
    let (events, store, _dir) = bus_and_store();
    let graph = Arc::new(
        GraphBuilder::new()
            .add_node(Node::new("start", NodeKind::Task))
            .add_node(Node::new("left", NodeKind::Task))
            .add_node(Node::new("right", NodeKind::Task))
            .add_node(Node::new("join", NodeKind::Join))
            .add_edge(Edge::new("start", "left"))
            .add_edge(Edge::new("start", "right"))
            .add_edge(Edge::new("left", "join"))
            .add_edge(Edge::new("right", "join"))
            .compile()
            .unwrap(),
    );

    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let concurrency_limit = 2;

    let executor = GraphExecutor::new(
        graph,
        store,
        events,
        concurrency_tracking_runner(running.clone(), peak.clone()),
        ExecutorOptions {
            concurrency_limit,
            ..Default::default()
        },
    );
    let (_tx, rx) = GraphExecutor::cancel_channel();
    let report = executor.execute(json!({}), rx).await;

    assert_eq!(report.status, WorkflowStatus::Completed);
    assert_eq!(report.completed_nodes.len(), 4);
    assert_eq!(running.load(Ordering::SeqCst), 0, "no runner left in flight after completion");
    assert!(
        peak.load(Ordering::SeqCst) <= concurrency_limit,
        "observed concurrency {} exceeded the configured cap {concurrency_limit}",
        peak.load(Ordering::SeqCst),
    );
    assert_eq!(
        peak.load(Ordering::SeqCst),
        concurrency_limit,
        "the diamond's `left`/`right` branches never ran in parallel, only the cap ({concurrency_limit}) was reached otherwise",
    );
}

#[tokio::test]
async fn gated_node_blocks_on_missing_evidence() {
    let (events, store, _dir) = bus_and_store();
    let graph = Arc::new(
        GraphBuilder::new()
            .add_node(
                Node::new("ship", NodeKind::Task)
                    .with_gate_required(true)
                    .with_gate_policy(GatePolicyOverride {
                        require_guard: Some(true),
                        ..Default::default()
                    }),
            )
            .compile()
            .unwrap(),
    );

    let executor = GraphExecutor::new(graph, store, events, echo_runner(), ExecutorOptions::default());
    let (_tx, rx) = GraphExecutor::cancel_channel();
    let report = executor.execute(json!({}), rx).await;

    assert_eq!(report.status, WorkflowStatus::Blocked);
    assert_eq!(report.blocked_nodes.len(), 1);
}

#[tokio::test]
async fn gated_node_passes_once_fresh_evidence_is_recorded() {
    let (events, store, _dir) = bus_and_store();
    store
        .set_guard_evidence(GuardEvidence::new(
            RunStatus::Passed,
            "report-1",
            vec![],
            Some("ship".to_string()),
            Utc::now(),
        ))
        .await;

    let graph = Arc::new(
        GraphBuilder::new()
            .add_node(
                Node::new("ship", NodeKind::Task)
                    .with_gate_required(true)
                    .with_gate_policy(GatePolicyOverride {
                        require_guard: Some(true),
                        ..Default::default()
                    }),
            )
            .compile()
            .unwrap(),
    );

    let executor = GraphExecutor::new(graph, store, events, echo_runner(), ExecutorOptions::default());
    let (_tx, rx) = GraphExecutor::cancel_channel();
    let report = executor.execute(json!({}), rx).await;

    assert_eq!(report.status, WorkflowStatus::Completed);
    assert_eq!(report.completed_nodes, vec!["ship".into()]);
}

#[tokio::test]
async fn decision_node_routes_to_the_matching_branch_and_skips_the_other() {
    let (events, store, _dir) = bus_and_store();
    let graph = Arc::new(
        GraphBuilder::new()
            .add_node(Node::new("decide", NodeKind::Decision))
            .add_node(Node::new("success_path", NodeKind::Task))
            .add_node(Node::new("failure_path", NodeKind::Task))
            .add_edge(Edge::new("decide", "success_path").with_condition(EdgeCondition::Equals {
                path: "results.decide.success".to_string(),
                value: json!(true),
            }))
            .add_edge(Edge::new("decide", "failure_path").with_condition(EdgeCondition::Equals {
                path: "results.decide.success".to_string(),
                value: json!(false),
            }))
            .compile()
            .unwrap(),
    );

    let runner: Arc<dyn TaskRunner> = Arc::new(ClosureRunner::new(|node, _ctx, _cancel| {
        let id = node.id.as_str().to_string();
        Box::pin(async move {
            let output = if id == "decide" {
                Some(json!({ "success": true }))
            } else {
                Some(json!({ "node": id }))
            };
            Ok(RunnerOutput {
                output,
                reason: None,
                next_tool_calls: Vec::new(),
            })
        })
    }));

    let executor = GraphExecutor::new(graph, store, events, runner, ExecutorOptions::default());
    let (_tx, rx) = GraphExecutor::cancel_channel();
    let report = executor.execute(json!({}), rx).await;

    assert_eq!(report.status, WorkflowStatus::Completed);
    assert!(report.completed_nodes.contains(&"success_path".into()));
    assert!(report.skipped_nodes.contains(&"failure_path".into()));
}

#[tokio::test]
async fn bypassing_a_required_gate_emits_an_audited_event() {
    let (events, store, _dir) = bus_and_store();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    events.on_all(move |e| seen_clone.lock().push(e.kind_str().to_string()));

    let graph = Arc::new(
        GraphBuilder::new()
            .add_node(Node::new("ship", NodeKind::Task).with_gate_required(true))
            .compile()
            .unwrap(),
    );

    let executor = GraphExecutor::new(
        graph,
        store,
        events,
        echo_runner(),
        ExecutorOptions {
            bypass_gates: true,
            bypass_reason: "hotfix, reviewed out of band".to_string(),
            ..Default::default()
        },
    );
    let (_tx, rx) = GraphExecutor::cancel_channel();
    let report = executor.execute(json!({}), rx).await;

    assert_eq!(report.status, WorkflowStatus::Completed);
    assert!(seen.lock().contains(&"taskgraph:node:bypass_gates".to_string()));
}

#[tokio::test]
async fn retries_are_exhausted_before_failing_with_on_error_fail() {
    let (events, store, _dir) = bus_and_store();
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = attempts.clone();

    let graph = Arc::new(
        GraphBuilder::new()
            .add_node(Node::new("flaky", NodeKind::Task).with_retries(2))
            .compile()
            .unwrap(),
    );

    let runner: Arc<dyn TaskRunner> = Arc::new(ClosureRunner::new(move |_node, _ctx, _cancel| {
        attempts_clone.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            Err(taskgraph_core::executor::RunnerError::Failed(
                "always fails".to_string(),
            ))
        })
    }));

    let executor = GraphExecutor::new(graph, store, events, runner, ExecutorOptions::default());
    let (_tx, rx) = GraphExecutor::cancel_channel();
    let report = executor.execute(json!({}), rx).await;

    assert_eq!(report.status, WorkflowStatus::Failed);
    assert_eq!(attempts.load(Ordering::SeqCst), 3); // 1 + retries(2)
}

#[tokio::test]
async fn on_error_skip_lets_dependents_proceed_with_no_output() {
    let (events, store, _dir) = bus_and_store();
    let graph = Arc::new(
        GraphBuilder::new()
            .add_node(
                Node::new("optional", NodeKind::Task)
                    .with_retries(0)
                    .with_on_error(OnError::Skip),
            )
            .add_node(Node::new("downstream", NodeKind::Task))
            .add_edge(Edge::new("optional", "downstream"))
            .compile()
            .unwrap(),
    );

    let runner: Arc<dyn TaskRunner> = Arc::new(ClosureRunner::new(|node, _ctx, _cancel| {
        let id = node.id.as_str().to_string();
        Box::pin(async move {
            if id == "optional" {
                Err(taskgraph_core::executor::RunnerError::Failed("down".to_string()))
            } else {
                Ok(RunnerOutput {
                    output: Some(json!({ "ran": true })),
                    reason: None,
                    next_tool_calls: Vec::new(),
                })
            }
        })
    }));

    let executor = GraphExecutor::new(graph, store, events, runner, ExecutorOptions::default());
    let (_tx, rx) = GraphExecutor::cancel_channel();
    let report = executor.execute(json!({}), rx).await;

    assert_eq!(report.status, WorkflowStatus::Completed);
    assert!(report.skipped_nodes.contains(&"optional".into()));
    assert!(report.completed_nodes.contains(&"downstream".into()));
}
