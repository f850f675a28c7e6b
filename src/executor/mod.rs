//! Graph Executor: validates a [`crate::graph::WorkflowGraph`] at
//! construction time (via [`crate::graph::GraphBuilder::compile`]) and then
//! drives it to completion under bounded concurrency, honoring completion
//! gates and a host-supplied [`TaskRunner`].

mod engine;
mod error;
mod report;
mod runner;
mod types;

pub use engine::GraphExecutor;
pub use error::{ExecutorError, NoMatchingEdgeError, RunnerError};
pub use report::{NodeResult, WorkflowReport, WorkflowStatus};
pub use runner::{ClosureRunner, TaskRunner};
pub use types::{CancelSignal, ContextView, ExecutorOptions, GraphMeta, NodeState, RunnerOutput, SuggestedToolCall};
