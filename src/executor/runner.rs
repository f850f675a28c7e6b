//! The host → core contract: how a node actually gets executed.

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::graph::Node;

use super::error::RunnerError;
use super::types::{CancelSignal, ContextView, RunnerOutput};

/// Implemented by the host application to perform the actual work a task
/// node represents. The executor never interprets `payload` or `output`
/// itself; they are opaque to everything except the host and edge
/// conditions evaluated against them.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(
        &self,
        node: &Node,
        context: &ContextView,
        cancel: CancelSignal,
    ) -> Result<RunnerOutput, RunnerError>;
}

/// Adapts a boxed async closure into a [`TaskRunner`], for hosts (and
/// tests) that would rather not declare a named type per node kind.
pub struct ClosureRunner<F>(F)
where
    F: for<'a> Fn(&'a Node, &'a ContextView, CancelSignal) -> BoxFuture<'a, Result<RunnerOutput, RunnerError>>
        + Send
        + Sync;

impl<F> ClosureRunner<F>
where
    F: for<'a> Fn(&'a Node, &'a ContextView, CancelSignal) -> BoxFuture<'a, Result<RunnerOutput, RunnerError>>
        + Send
        + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> TaskRunner for ClosureRunner<F>
where
    F: for<'a> Fn(&'a Node, &'a ContextView, CancelSignal) -> BoxFuture<'a, Result<RunnerOutput, RunnerError>>
        + Send
        + Sync,
{
    async fn run(
        &self,
        node: &Node,
        context: &ContextView,
        cancel: CancelSignal,
    ) -> Result<RunnerOutput, RunnerError> {
        (self.0)(node, context, cancel).await
    }
}
