//! Gate policy: the closed set of recognized options plus a forward-compat bag.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default freshness window: 5 minutes.
pub const DEFAULT_MAX_AGE_MS: i64 = 5 * 60 * 1000;
/// Default cap on capped detail lists (failing rules/tests surfaced in a gate result).
pub const DEFAULT_MAX_DETAIL_ITEMS: usize = 10;

/// Fully-resolved gate policy used by a single evaluation.
///
/// Policies compose by shallow merge: a node-level [`GatePolicyOverride`]
/// wins over the graph-level default, which wins over the engine default
/// (see [`GatePolicy::merge`]). Unknown keys arriving from a host's dynamic
/// config are preserved round-trip in `extra` but never influence behavior.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GatePolicy {
    pub require_guard: bool,
    pub require_test: bool,
    pub strict_task_scope: bool,
    pub max_detail_items: usize,
    pub max_age_ms: i64,
    pub guard_args: Option<Value>,
    pub test_args: Option<Value>,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            require_guard: false,
            require_test: false,
            strict_task_scope: false,
            max_detail_items: DEFAULT_MAX_DETAIL_ITEMS,
            max_age_ms: DEFAULT_MAX_AGE_MS,
            guard_args: None,
            test_args: None,
            extra: Map::new(),
        }
    }
}

impl GatePolicy {
    /// Shallow-merge `override_` on top of `self`, returning the result.
    /// `Some` fields in `override_` win; `None` fields fall through.
    #[must_use]
    pub fn merge(&self, override_: &GatePolicyOverride) -> GatePolicy {
        let mut merged = self.clone();
        if let Some(v) = override_.require_guard {
            merged.require_guard = v;
        }
        if let Some(v) = override_.require_test {
            merged.require_test = v;
        }
        if let Some(v) = override_.strict_task_scope {
            merged.strict_task_scope = v;
        }
        if let Some(v) = override_.max_detail_items {
            merged.max_detail_items = v;
        }
        if let Some(v) = override_.max_age_ms {
            merged.max_age_ms = v;
        }
        if override_.guard_args.is_some() {
            merged.guard_args = override_.guard_args.clone();
        }
        if override_.test_args.is_some() {
            merged.test_args = override_.test_args.clone();
        }
        for (k, v) in &override_.extra {
            merged.extra.insert(k.clone(), v.clone());
        }
        merged
    }
}

/// A partial gate policy: every field is optional so a node or graph can
/// override only the options it cares about.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GatePolicyOverride {
    pub require_guard: Option<bool>,
    pub require_test: Option<bool>,
    pub strict_task_scope: Option<bool>,
    pub max_detail_items: Option<usize>,
    pub max_age_ms: Option<i64>,
    pub guard_args: Option<Value>,
    pub test_args: Option<Value>,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_precedence_is_shallow() {
        let engine_default = GatePolicy::default();
        let graph_default = GatePolicyOverride {
            require_guard: Some(true),
            require_test: Some(true),
            ..Default::default()
        };
        let node_override = GatePolicyOverride {
            require_test: Some(false),
            max_age_ms: Some(1_000),
            ..Default::default()
        };

        let after_graph = engine_default.merge(&graph_default);
        assert!(after_graph.require_guard);
        assert!(after_graph.require_test);

        let after_node = after_graph.merge(&node_override);
        assert!(after_node.require_guard, "graph-level value should survive");
        assert!(!after_node.require_test, "node override should win");
        assert_eq!(after_node.max_age_ms, 1_000);
    }
}
