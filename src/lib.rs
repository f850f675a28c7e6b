//! # taskgraph-core
//!
//! Core of an agent workflow orchestrator: a DAG task executor with
//! evidence-based completion gates, session/checkpoint persistence, and a
//! token-budget governor. This crate is the deterministic, observable state
//! engine a host (a coding-agent loop, a CLI) drives; it does not itself
//! invoke models, spawn browsers, or parse source code.
//!
//! ## Components
//!
//! - [`graph`] — the workflow graph model: nodes, edges, validation.
//! - [`gate`] — the completion-gate engine: evidence, policy, pass/pending/blocked.
//! - [`evidence`] — evidence and token-usage value types shared across components.
//! - [`event_bus`] — in-process pub/sub driving timeline recording.
//! - [`store`] — atomic session, evidence, and checkpoint persistence.
//! - [`executor`] — drives a graph to completion under bounded concurrency.
//! - [`governor`] — coarse admission control keyed to token usage.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use taskgraph_core::event_bus::EventBus;
//! use taskgraph_core::graph::{GraphBuilder, Node};
//! use taskgraph_core::types::NodeKind;
//!
//! let graph = GraphBuilder::new()
//!     .add_node(Node::new("start", NodeKind::Task))
//!     .add_node(Node::new("finish", NodeKind::Task))
//!     .add_edge(taskgraph_core::graph::Edge::new("start", "finish"))
//!     .compile()
//!     .expect("graph validates");
//!
//! assert_eq!(graph.node_count(), 2);
//! let _events = Arc::new(EventBus::new());
//! ```

pub mod error;
pub mod event_bus;
pub mod evidence;
pub mod executor;
pub mod gate;
pub mod governor;
pub mod graph;
pub mod store;
pub mod types;

pub use error::{OrchestratorError, Result};

/// Install a `tracing` subscriber reading its filter from `RUST_LOG`
/// (defaulting to `info`), the way host binaries wire up observability for
/// every other component in this crate. Registers `tracing_error`'s
/// `ErrorLayer` so `miette` diagnostics can capture a span trace.
pub fn init_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(ErrorLayer::default())
        .try_init();
}
