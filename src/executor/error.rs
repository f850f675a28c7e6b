//! Errors raised by the Graph Executor.

use miette::Diagnostic;
use thiserror::Error;

use crate::types::NodeId;

/// Failure returned by a [`super::TaskRunner`] invocation. Subject to a
/// node's retry budget and `onError` policy; never aborts the workflow
/// directly.
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    #[error("{0}")]
    #[diagnostic(code(taskgraph::executor::runner_failed))]
    Failed(String),

    #[error("runner timed out after {timeout_ms}ms")]
    #[diagnostic(code(taskgraph::executor::timeout))]
    TimedOut { timeout_ms: u64 },

    #[error("cancelled")]
    #[diagnostic(code(taskgraph::executor::cancelled))]
    Cancelled,
}

/// A decision node produced no activated outgoing edge.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
#[error("decision node `{node_id}` produced no matching edge")]
#[diagnostic(
    code(taskgraph::executor::no_matching_edge),
    help("Ensure at least one outgoing edge's condition can evaluate true, or add an unconditional fallback edge.")
)]
pub struct NoMatchingEdgeError {
    pub node_id: NodeId,
}

/// Top-level failure that aborts a workflow run before any node executes.
#[derive(Debug, Error, Diagnostic)]
pub enum ExecutorError {
    #[error("workflow cancelled")]
    #[diagnostic(code(taskgraph::executor::workflow_cancelled))]
    Cancelled,
}
