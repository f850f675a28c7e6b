//! Top-level error aggregation. `GateBlocked` is deliberately absent here:
//! per the design, a blocked gate is a normal [`crate::gate::GateStatus`]
//! value, never an exception.

use miette::Diagnostic;
use thiserror::Error;

use crate::executor::{ExecutorError, NoMatchingEdgeError, RunnerError};
use crate::graph::GraphCompileError;
use crate::store::PersistenceError;

/// Umbrella error type for callers that want one `Result` alias across the
/// whole crate. Individual components return their own narrower error
/// types; this exists for hosts that prefer a single surface.
#[derive(Debug, Error, Diagnostic)]
pub enum OrchestratorError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] GraphCompileError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    NoMatchingEdge(#[from] NoMatchingEdgeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Executor(#[from] ExecutorError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
