//! Workflow graph model: nodes, edges, validation, and the immutable
//! [`WorkflowGraph`] produced by [`GraphBuilder::compile`].

mod builder;
mod model;
mod validate;

pub use builder::GraphBuilder;
pub use model::{resolve_path, Edge, EdgeCondition, GraphDefaults, Node, WorkflowGraph};
pub use validate::GraphCompileError;
