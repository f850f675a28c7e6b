//! Token-Budget Governor: coarse admission control keyed to cumulative
//! token usage.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::event_bus::{Event, EventBus};
use crate::evidence::{GovernorMode, TokenUsage};

/// Threshold configuration for the governor's three modes. Percentages are
/// in `[0, 100]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GovernorThresholds {
    pub conservative_at: f64,
    pub critical_at: f64,
}

impl Default for GovernorThresholds {
    fn default() -> Self {
        Self {
            conservative_at: 70.0,
            critical_at: 85.0,
        }
    }
}

impl GovernorThresholds {
    pub fn mode_for(&self, percentage: f64) -> GovernorMode {
        if percentage >= self.critical_at {
            GovernorMode::Critical
        } else if percentage >= self.conservative_at {
            GovernorMode::Conservative
        } else {
            GovernorMode::Normal
        }
    }
}

/// Result of an `isActionAllowed` check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl ActionDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Actions that remain permitted once the governor reaches `critical`.
/// Always includes `checkpoint_create` and `finish_task`, per the core's
/// admission-control contract.
fn default_critical_allow_list() -> FxHashSet<String> {
    ["checkpoint_create", "finish_task"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Configuration for one [`TokenBudgetGovernor`].
#[derive(Clone, Debug)]
pub struct GovernorConfig {
    pub thresholds: GovernorThresholds,
    /// Actions denied while in `conservative` mode; everything else is allowed.
    pub conservative_deny_list: FxHashSet<String>,
    /// Actions still allowed while in `critical` mode; everything else is denied.
    pub critical_allow_list: FxHashSet<String>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            thresholds: GovernorThresholds::default(),
            conservative_deny_list: [
                "browser_open",
                "full_test_suite",
                "task_decompose",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            critical_allow_list: default_critical_allow_list(),
        }
    }
}

struct Inner {
    usage: TokenUsage,
    mode: GovernorMode,
    config: GovernorConfig,
}

/// Tracks cumulative token usage and derives a coarse admission-control
/// mode from it, emitting threshold-crossing events as usage climbs.
pub struct TokenBudgetGovernor {
    inner: Mutex<Inner>,
    events: Arc<EventBus>,
}

impl TokenBudgetGovernor {
    pub fn new(events: Arc<EventBus>, config: GovernorConfig, initial: TokenUsage) -> Self {
        let mode = config.thresholds.mode_for(initial.percentage);
        Self {
            inner: Mutex::new(Inner {
                usage: initial,
                mode,
                config,
            }),
            events,
        }
    }

    pub fn mode(&self) -> GovernorMode {
        self.inner.lock().mode
    }

    pub fn usage(&self) -> TokenUsage {
        self.inner.lock().usage
    }

    /// Record a new usage reading and, if it crosses a threshold upward,
    /// emit the corresponding `resource:*` event(s).
    pub fn observe_usage(&self, usage: TokenUsage) {
        let (previous_mode, new_mode) = {
            let mut inner = self.inner.lock();
            let previous_mode = inner.mode;
            inner.usage = usage;
            inner.mode = inner.config.thresholds.mode_for(usage.percentage);
            (previous_mode, inner.mode)
        };

        if new_mode == previous_mode {
            return;
        }

        match new_mode {
            GovernorMode::Conservative if previous_mode == GovernorMode::Normal => {
                self.events.emit(Event::ResourceWarning {
                    percentage: usage.percentage,
                });
            }
            GovernorMode::Critical => {
                self.events.emit(Event::ResourceCritical {
                    percentage: usage.percentage,
                });
                self.events.emit(Event::ResourceGovernorCritical {
                    percentage: usage.percentage,
                });
            }
            _ => {}
        }
    }

    /// Whether `action_name` is currently permitted.
    pub fn is_action_allowed(&self, action_name: &str) -> ActionDecision {
        let inner = self.inner.lock();
        match inner.mode {
            GovernorMode::Normal => ActionDecision::allow(),
            GovernorMode::Conservative => {
                if inner.config.conservative_deny_list.contains(action_name) {
                    ActionDecision::deny(format!(
                        "`{action_name}` is denied in conservative mode ({:.1}% token usage)",
                        inner.usage.percentage
                    ))
                } else {
                    ActionDecision::allow()
                }
            }
            GovernorMode::Critical => {
                if inner.config.critical_allow_list.contains(action_name) {
                    ActionDecision::allow()
                } else {
                    ActionDecision::deny(format!(
                        "`{action_name}` is denied in critical mode ({:.1}% token usage); only {:?} remain allowed",
                        inner.usage.percentage, inner.config.critical_allow_list
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn usage(percentage: f64) -> TokenUsage {
        TokenUsage {
            used: 0,
            estimated_total: 0,
            percentage,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn normal_mode_allows_everything() {
        let governor = TokenBudgetGovernor::new(Arc::new(EventBus::new()), GovernorConfig::default(), usage(10.0));
        assert!(governor.is_action_allowed("browser_open").allowed);
    }

    #[test]
    fn conservative_mode_denies_configured_actions_only() {
        let governor = TokenBudgetGovernor::new(Arc::new(EventBus::new()), GovernorConfig::default(), usage(75.0));
        assert_eq!(governor.mode(), GovernorMode::Conservative);
        assert!(!governor.is_action_allowed("browser_open").allowed);
        assert!(governor.is_action_allowed("read_file").allowed);
    }

    #[test]
    fn critical_mode_denies_all_but_allow_list() {
        let governor = TokenBudgetGovernor::new(Arc::new(EventBus::new()), GovernorConfig::default(), usage(90.0));
        assert_eq!(governor.mode(), GovernorMode::Critical);
        assert!(governor.is_action_allowed("checkpoint_create").allowed);
        assert!(governor.is_action_allowed("finish_task").allowed);
        assert!(!governor.is_action_allowed("browser_open").allowed);
    }

    #[test]
    fn crossing_into_critical_emits_both_resource_events() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        bus.on_all(move |e| seen_clone.lock().push(e.kind_str().to_string()));

        let governor = TokenBudgetGovernor::new(bus, GovernorConfig::default(), usage(10.0));
        governor.observe_usage(usage(90.0));

        let recorded = seen.lock();
        assert!(recorded.contains(&"resource:critical".to_string()));
        assert!(recorded.contains(&"resource:governor:critical".to_string()));
    }
}
