//! Completion-gate engine: evidence, policy, and pass/pending/blocked determination.

mod engine;
mod policy;

pub use engine::{
    EvidenceStream, FailingEvidence, GateContext, GateEngine, GatePolicyResult, GateStatus,
    NextToolCall,
};
pub use policy::{GatePolicy, GatePolicyOverride, DEFAULT_MAX_AGE_MS, DEFAULT_MAX_DETAIL_ITEMS};
