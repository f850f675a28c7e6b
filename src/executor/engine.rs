//! The Graph Executor: drives a validated [`WorkflowGraph`] to completion
//! under a bounded-concurrency cooperative scheduler.

use std::sync::Arc;

use chrono::Utc;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::instrument;

use crate::event_bus::{Event, EventBus};
use crate::gate::{GateContext, GateEngine, GatePolicy, GateStatus};
use crate::graph::{Edge, Node, WorkflowGraph};
use crate::store::StateStore;
use crate::types::{NodeId, NodeKind, OnError};

use super::error::{NoMatchingEdgeError, RunnerError};
use super::report::{NodeResult, WorkflowReport, WorkflowStatus};
use super::runner::TaskRunner;
use super::types::{
    CancelSignal, ContextView, ExecutorOptions, GraphMeta, NodeRuntime, NodeState, RunnerOutput,
    SkipKind,
};

/// Drives one [`WorkflowGraph`] to completion. Constructed per-run; cheap to
/// build since it only borrows its collaborators via `Arc`.
pub struct GraphExecutor {
    graph: Arc<WorkflowGraph>,
    store: Arc<StateStore>,
    events: Arc<EventBus>,
    runner: Arc<dyn TaskRunner>,
    gate_engine: GateEngine,
    concurrency_limit: usize,
    options: ExecutorOptions,
}

impl GraphExecutor {
    pub fn new(
        graph: Arc<WorkflowGraph>,
        store: Arc<StateStore>,
        events: Arc<EventBus>,
        runner: Arc<dyn TaskRunner>,
        options: ExecutorOptions,
    ) -> Self {
        let concurrency_limit = graph
            .defaults
            .concurrency_limit
            .unwrap_or(options.concurrency_limit)
            .max(1);
        Self {
            graph,
            store,
            events,
            runner,
            gate_engine: GateEngine::new(),
            concurrency_limit,
            options,
        }
    }

    /// A fresh, uncancelled `(sender, receiver)` pair for workflow-level
    /// cancellation; keep the sender and call `send(true)` to cancel.
    pub fn cancel_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    /// Drive the graph to completion, returning a summary the host can act
    /// on. `payload` seeds the root of the execution-context view.
    #[instrument(skip_all, fields(graph = self.graph.name.as_deref().unwrap_or("unnamed")))]
    pub async fn execute(&self, payload: Value, cancel_rx: watch::Receiver<bool>) -> WorkflowReport {
        let mut states: FxHashMap<NodeId, NodeRuntime> = self
            .graph
            .nodes()
            .map(|n| (n.id.clone(), NodeRuntime::new()))
            .collect();
        let mut edge_active: FxHashMap<usize, bool> = FxHashMap::default();
        let mut results: FxHashMap<NodeId, Option<Value>> = FxHashMap::default();
        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));
        let mut join_set: JoinSet<(NodeId, Result<RunnerOutput, RunnerError>)> = JoinSet::new();
        let mut step: u64 = 0;
        let mut cancelled_applied = false;

        self.events.emit(Event::TaskGraphCreated {
            graph_name: self.graph.name.clone(),
        });
        self.store
            .record_event(&Event::TaskGraphCreated {
                graph_name: self.graph.name.clone(),
            })
            .await;

        loop {
            self.resolve_transitive_skips(&mut states, &mut edge_active)
                .await;
            self.recheck_blocked(&mut states).await;

            if !cancelled_applied && *cancel_rx.borrow() {
                cancelled_applied = true;
                self.apply_cancellation(&mut states).await;
                self.resolve_transitive_skips(&mut states, &mut edge_active)
                    .await;
            }

            let ready_ids = if cancelled_applied {
                Vec::new()
            } else {
                self.compute_ready(&mut states, &edge_active)
            };

            for node_id in ready_ids {
                let node = self.graph.node(&node_id).expect("ready node exists").clone();
                {
                    let rt = states.get_mut(&node_id).expect("ready node tracked");
                    rt.state = NodeState::Running;
                    rt.attempts += 1;
                }
                step += 1;
                self.events.emit(Event::NodeStarted {
                    node_id: node_id.clone(),
                    step,
                });
                self.store
                    .record_event(&Event::NodeStarted {
                        node_id: node_id.clone(),
                        step,
                    })
                    .await;

                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("semaphore never closed during a run");
                let runner = self.runner.clone();
                let context = ContextView {
                    results: results.clone(),
                    payload: payload.clone(),
                    graph_meta: GraphMeta {
                        name: self.graph.name.clone(),
                    },
                };
                let cancel_signal = CancelSignal::new(cancel_rx.clone());
                let timeout_ms = node.timeout_ms;
                let spawned_id = node_id.clone();

                join_set.spawn(async move {
                    let fut = runner.run(&node, &context, cancel_signal);
                    let outcome = match timeout_ms {
                        Some(ms) => {
                            match tokio::time::timeout(std::time::Duration::from_millis(ms), fut).await {
                                Ok(res) => res,
                                Err(_) => Err(RunnerError::TimedOut { timeout_ms: ms }),
                            }
                        }
                        None => fut.await,
                    };
                    drop(permit);
                    (spawned_id, outcome)
                });
            }

            if join_set.is_empty() {
                break;
            }

            if let Some(joined) = join_set.join_next().await {
                let (node_id, outcome) = joined.expect("node task panicked");
                self.handle_outcome(
                    node_id,
                    outcome,
                    cancelled_applied,
                    &mut states,
                    &mut results,
                    &mut edge_active,
                    &payload,
                )
                .await;
            }
        }

        self.build_report(&states).await
    }

    // ---- readiness --------------------------------------------------------

    fn compute_ready(
        &self,
        states: &mut FxHashMap<NodeId, NodeRuntime>,
        edge_active: &FxHashMap<usize, bool>,
    ) -> Vec<NodeId> {
        let mut ready = Vec::new();
        for node_id in self.graph.topo_order() {
            if states[node_id].state != NodeState::Pending {
                continue;
            }
            let incoming: Vec<(usize, &Edge)> = self
                .graph
                .edges()
                .iter()
                .enumerate()
                .filter(|(_, e)| &e.to == node_id)
                .collect();
            if incoming.is_empty() {
                ready.push(node_id.clone());
                continue;
            }
            if let Some(true) = self.incoming_satisfied(&incoming, states, edge_active) {
                ready.push(node_id.clone());
            }
        }
        for id in &ready {
            states.get_mut(id).expect("ready node tracked").state = NodeState::Ready;
        }
        ready
    }

    /// `None` = some incoming edge unresolved (keep waiting). `Some(bool)` =
    /// all incoming edges resolved; bool says whether at least one was
    /// satisfied.
    fn incoming_satisfied(
        &self,
        incoming: &[(usize, &Edge)],
        states: &FxHashMap<NodeId, NodeRuntime>,
        edge_active: &FxHashMap<usize, bool>,
    ) -> Option<bool> {
        let mut satisfied_any = false;
        for (idx, edge) in incoming {
            let src = states.get(&edge.from).expect("edge source tracked");
            if !src.state.is_terminal() {
                return None;
            }
            let source_ok = src.state == NodeState::Completed
                || (src.state == NodeState::Skipped && src.skip_kind == Some(SkipKind::OnErrorSkip));
            let active = edge_active.get(idx).copied().unwrap_or(true);
            if source_ok && active {
                satisfied_any = true;
            }
        }
        Some(satisfied_any)
    }

    /// Mark any `pending` node whose incoming edges are all resolved, but
    /// none satisfied, as transitively `skipped`. Repeats until a fixpoint so
    /// a chain of several dependent nodes skips in one pass.
    async fn resolve_transitive_skips(
        &self,
        states: &mut FxHashMap<NodeId, NodeRuntime>,
        edge_active: &mut FxHashMap<usize, bool>,
    ) {
        loop {
            let mut changed = false;
            let candidates: Vec<NodeId> = self
                .graph
                .topo_order()
                .iter()
                .filter(|id| states[*id].state == NodeState::Pending)
                .cloned()
                .collect();

            for node_id in candidates {
                let incoming: Vec<(usize, &Edge)> = self
                    .graph
                    .edges()
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.to == node_id)
                    .collect();
                if incoming.is_empty() {
                    continue;
                }
                match self.incoming_satisfied(&incoming, states, edge_active) {
                    None | Some(true) => continue,
                    Some(false) => {}
                }

                let reason = "upstream branch not taken or upstream node did not complete".to_string();
                {
                    let rt = states.get_mut(&node_id).expect("candidate tracked");
                    rt.state = NodeState::Skipped;
                    rt.skip_kind = Some(SkipKind::NotChosenOrPropagated);
                    rt.reason = Some(reason.clone());
                }
                for (idx, _) in self
                    .graph
                    .edges()
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.from == node_id)
                {
                    edge_active.insert(idx, false);
                }
                self.events.emit(Event::NodeSkipped {
                    node_id: node_id.clone(),
                    reason: reason.clone(),
                });
                self.store
                    .record_event(&Event::NodeSkipped {
                        node_id: node_id.clone(),
                        reason,
                    })
                    .await;
                changed = true;
            }

            if !changed {
                break;
            }
        }
    }

    async fn apply_cancellation(&self, states: &mut FxHashMap<NodeId, NodeRuntime>) {
        let ids: Vec<NodeId> = states
            .iter()
            .filter(|(_, rt)| matches!(rt.state, NodeState::Pending | NodeState::Ready))
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            {
                let rt = states.get_mut(&id).expect("cancellable node tracked");
                rt.state = NodeState::Skipped;
                rt.skip_kind = Some(SkipKind::NotChosenOrPropagated);
                rt.reason = Some("cancelled".to_string());
            }
            self.events.emit(Event::NodeSkipped {
                node_id: id.clone(),
                reason: "cancelled".to_string(),
            });
            self.store
                .record_event(&Event::NodeSkipped {
                    node_id: id,
                    reason: "cancelled".to_string(),
                })
                .await;
        }
    }

    // ---- outcome handling --------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    async fn handle_outcome(
        &self,
        node_id: NodeId,
        outcome: Result<RunnerOutput, RunnerError>,
        cancelled: bool,
        states: &mut FxHashMap<NodeId, NodeRuntime>,
        results: &mut FxHashMap<NodeId, Option<Value>>,
        edge_active: &mut FxHashMap<usize, bool>,
        payload: &Value,
    ) {
        if cancelled {
            let rt = states.get_mut(&node_id).expect("node tracked");
            rt.state = NodeState::Failed;
            rt.reason = Some("cancelled".to_string());
            self.events.emit(Event::NodeFailed {
                node_id: node_id.clone(),
                reason: "cancelled".to_string(),
            });
            self.store
                .record_event(&Event::NodeFailed {
                    node_id,
                    reason: "cancelled".to_string(),
                })
                .await;
            return;
        }

        match outcome {
            Ok(output) => {
                self.handle_success(node_id, output, states, results, edge_active, payload)
                    .await;
            }
            Err(err) => {
                self.handle_failure(node_id, err, states, edge_active).await;
            }
        }
    }

    async fn handle_success(
        &self,
        node_id: NodeId,
        output: RunnerOutput,
        states: &mut FxHashMap<NodeId, NodeRuntime>,
        results: &mut FxHashMap<NodeId, Option<Value>>,
        edge_active: &mut FxHashMap<usize, bool>,
        payload: &Value,
    ) {
        let node = self.graph.node(&node_id).expect("node exists").clone();
        results.insert(node_id.clone(), output.output.clone());

        let ctx_json = context_json(results, payload);
        let outgoing: Vec<usize> = self
            .graph
            .edges()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.from == node_id)
            .map(|(idx, _)| idx)
            .collect();
        let mut any_conditioned = false;
        let mut any_active = false;
        for idx in &outgoing {
            let edge = &self.graph.edges()[*idx];
            let active = match &edge.condition {
                None => true,
                Some(cond) => {
                    any_conditioned = true;
                    cond.evaluate(&ctx_json)
                }
            };
            edge_active.insert(*idx, active);
            any_active = any_active || active;
        }

        if node.kind == NodeKind::Decision && any_conditioned && !any_active {
            let err = NoMatchingEdgeError {
                node_id: node_id.clone(),
            };
            results.remove(&node_id);
            let rt = states.get_mut(&node_id).expect("node tracked");
            rt.state = NodeState::Failed;
            rt.reason = Some(err.to_string());
            self.events.emit(Event::NodeFailed {
                node_id: node_id.clone(),
                reason: err.to_string(),
            });
            self.store
                .record_event(&Event::NodeFailed {
                    node_id,
                    reason: err.to_string(),
                })
                .await;
            return;
        }

        self.complete_with_gate(node_id, output, states).await;
    }

    async fn handle_failure(
        &self,
        node_id: NodeId,
        err: RunnerError,
        states: &mut FxHashMap<NodeId, NodeRuntime>,
        edge_active: &mut FxHashMap<usize, bool>,
    ) {
        let node = self.graph.node(&node_id).expect("node exists");
        let max_attempts = 1 + node.retries;
        let attempts = states[&node_id].attempts;

        if attempts < max_attempts {
            states.get_mut(&node_id).expect("node tracked").state = NodeState::Pending;
            return;
        }

        let reason = err.to_string();
        match node.on_error {
            OnError::Fail => {
                let rt = states.get_mut(&node_id).expect("node tracked");
                rt.state = NodeState::Failed;
                rt.reason = Some(reason.clone());
                self.events.emit(Event::NodeFailed {
                    node_id: node_id.clone(),
                    reason: reason.clone(),
                });
                self.store
                    .record_event(&Event::NodeFailed {
                        node_id,
                        reason,
                    })
                    .await;
            }
            OnError::Skip => {
                {
                    let rt = states.get_mut(&node_id).expect("node tracked");
                    rt.state = NodeState::Skipped;
                    rt.skip_kind = Some(SkipKind::OnErrorSkip);
                    rt.reason = Some(reason.clone());
                }
                for (idx, _) in self
                    .graph
                    .edges()
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.from == node_id)
                {
                    edge_active.insert(idx, true);
                }
                self.events.emit(Event::NodeSkipped {
                    node_id: node_id.clone(),
                    reason: reason.clone(),
                });
                self.store
                    .record_event(&Event::NodeSkipped {
                        node_id,
                        reason,
                    })
                    .await;
            }
            OnError::Continue => {
                {
                    let rt = states.get_mut(&node_id).expect("node tracked");
                    rt.state = NodeState::Completed;
                    rt.reason = Some(reason.clone());
                }
                for (idx, _) in self
                    .graph
                    .edges()
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.from == node_id)
                {
                    edge_active.insert(idx, true);
                }
                self.events.emit(Event::NodeCompleted {
                    node_id: node_id.clone(),
                    output: None,
                });
                self.store
                    .record_event(&Event::NodeCompleted {
                        node_id,
                        output: None,
                    })
                    .await;
            }
        }
    }

    // ---- gating ------------------------------------------------------------

    async fn complete_with_gate(
        &self,
        node_id: NodeId,
        output: RunnerOutput,
        states: &mut FxHashMap<NodeId, NodeRuntime>,
    ) {
        let node = self.graph.node(&node_id).expect("node exists");
        let gate_required = node.effective_gate_required(self.graph.defaults.gate_required);

        if self.options.bypass_gates {
            if gate_required {
                self.events.emit(Event::NodeBypassGates {
                    node_id: node_id.clone(),
                    reason: self.options.bypass_reason.clone(),
                });
                self.store
                    .record_event(&Event::NodeBypassGates {
                        node_id: node_id.clone(),
                        reason: self.options.bypass_reason.clone(),
                    })
                    .await;
            }
            let rt = states.get_mut(&node_id).expect("node tracked");
            rt.state = NodeState::Completed;
            rt.output = output.output.clone();
            rt.reason = output.reason.clone();
            self.events.emit(Event::NodeCompleted {
                node_id: node_id.clone(),
                output: output.output,
            });
            self.store
                .record_event(&Event::NodeCompleted {
                    node_id,
                    output: rt.output.clone(),
                })
                .await;
            return;
        }

        if !gate_required {
            let rt = states.get_mut(&node_id).expect("node tracked");
            rt.state = NodeState::Completed;
            rt.output = output.output.clone();
            rt.reason = output.reason.clone();
            self.events.emit(Event::NodeCompleted {
                node_id: node_id.clone(),
                output: output.output,
            });
            self.store
                .record_event(&Event::NodeCompleted {
                    node_id,
                    output: rt.output.clone(),
                })
                .await;
            return;
        }

        let (policy, context) = self.build_gate_inputs(node, &node_id);
        let evidence = self.store.get_evidence();
        let result = self.gate_engine.evaluate(&evidence, &policy, &context, Utc::now());

        let rt = states.get_mut(&node_id).expect("node tracked");
        rt.output = output.output.clone();
        rt.reason = output.reason.clone();
        rt.gate_result = Some(result.clone());
        rt.next_tool_calls = result.next_tool_calls.clone();

        match result.status {
            GateStatus::Passed => {
                rt.state = NodeState::Completed;
                self.events.emit(Event::NodeCompleted {
                    node_id: node_id.clone(),
                    output: output.output,
                });
                self.store
                    .record_event(&Event::NodeCompleted {
                        node_id,
                        output: rt.output.clone(),
                    })
                    .await;
            }
            GateStatus::Pending | GateStatus::Blocked => {
                rt.state = NodeState::Blocked;
                self.events.emit(Event::NodeGated {
                    node_id: node_id.clone(),
                    result: result.clone(),
                });
                self.store
                    .record_event(&Event::NodeGated { node_id, result })
                    .await;
            }
        }
    }

    async fn recheck_blocked(&self, states: &mut FxHashMap<NodeId, NodeRuntime>) {
        let blocked_ids: Vec<NodeId> = states
            .iter()
            .filter(|(_, rt)| rt.state == NodeState::Blocked)
            .map(|(id, _)| id.clone())
            .collect();
        for node_id in blocked_ids {
            let node = self.graph.node(&node_id).expect("node exists");
            let (policy, context) = self.build_gate_inputs(node, &node_id);
            let evidence = self.store.get_evidence();
            let result = self.gate_engine.evaluate(&evidence, &policy, &context, Utc::now());
            if result.status == GateStatus::Passed {
                let rt = states.get_mut(&node_id).expect("node tracked");
                rt.state = NodeState::Completed;
                rt.gate_result = Some(result);
                rt.next_tool_calls = Vec::new();
                self.events.emit(Event::NodeCompleted {
                    node_id: node_id.clone(),
                    output: rt.output.clone(),
                });
                self.store
                    .record_event(&Event::NodeCompleted {
                        node_id: node_id.clone(),
                        output: rt.output.clone(),
                    })
                    .await;
            } else {
                states.get_mut(&node_id).expect("node tracked").gate_result = Some(result);
            }
        }
    }

    fn build_gate_inputs(&self, node: &Node, node_id: &NodeId) -> (GatePolicy, GateContext) {
        let engine_default = GatePolicy::default();
        let graph_override = self.graph.defaults.gate_policy.clone().unwrap_or_default();
        let node_override = node.gate_policy.clone().unwrap_or_default();
        let policy = engine_default.merge(&graph_override).merge(&node_override);
        let context = GateContext {
            task_id: Some(node_id.as_str().to_string()),
            task_type: infer_task_type(self.graph.name.as_deref()),
            task_name: node.label.clone(),
        };
        (policy, context)
    }

    async fn build_report(&self, states: &FxHashMap<NodeId, NodeRuntime>) -> WorkflowReport {
        let mut completed_nodes = Vec::new();
        let mut blocked_nodes = Vec::new();
        let mut failed_nodes = Vec::new();
        let mut skipped_nodes = Vec::new();
        let mut node_results = FxHashMap::default();

        for (id, rt) in states {
            let status = match rt.state {
                NodeState::Completed => {
                    completed_nodes.push(id.clone());
                    "completed"
                }
                NodeState::Blocked => {
                    blocked_nodes.push(id.clone());
                    "blocked"
                }
                NodeState::Failed => {
                    failed_nodes.push(id.clone());
                    "failed"
                }
                NodeState::Skipped => {
                    skipped_nodes.push(id.clone());
                    "skipped"
                }
                NodeState::Pending => "pending",
                NodeState::Ready => "ready",
                NodeState::Running => "running",
            };
            node_results.insert(
                id.clone(),
                NodeResult {
                    status: status.to_string(),
                    output: rt.output.clone(),
                    reason: rt.reason.clone(),
                    gate_result: rt.gate_result.clone(),
                    next_tool_calls: rt.next_tool_calls.clone(),
                },
            );
        }

        let status = if !failed_nodes.is_empty() {
            WorkflowStatus::Failed
        } else if !blocked_nodes.is_empty() {
            WorkflowStatus::Blocked
        } else {
            WorkflowStatus::Completed
        };

        let status_str = match status {
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Blocked => "blocked",
            WorkflowStatus::Failed => "failed",
        };
        self.events.emit(Event::WorkflowCompleted {
            status: status_str.to_string(),
        });
        self.store
            .record_event(&Event::WorkflowCompleted {
                status: status_str.to_string(),
            })
            .await;

        WorkflowReport {
            status,
            completed_nodes,
            blocked_nodes,
            failed_nodes,
            skipped_nodes,
            node_results,
        }
    }
}

fn context_json(results: &FxHashMap<NodeId, Option<Value>>, payload: &Value) -> Value {
    let results_obj: serde_json::Map<String, Value> = results
        .iter()
        .map(|(id, output)| (id.as_str().to_string(), output.clone().unwrap_or(Value::Null)))
        .collect();
    serde_json::json!({ "results": results_obj, "payload": payload })
}

fn infer_task_type(graph_name: Option<&str>) -> Option<String> {
    let name = graph_name?.to_ascii_lowercase();
    if name.contains("frontend") {
        Some("frontend".to_string())
    } else if name.contains("backend") {
        Some("backend".to_string())
    } else {
        None
    }
}
