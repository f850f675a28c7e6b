//! Evidence, token usage, and governor-mode data types shared by the Gate
//! Engine, the State Store, and the Token-Budget Governor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome recorded by a single guard or test run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Passed,
    Failed,
    Skipped,
}

/// Cap a `Vec` to at most `cap` entries, keeping the first `cap`.
pub(crate) fn cap_details(mut items: Vec<String>, cap: usize) -> Vec<String> {
    items.truncate(cap);
    items
}

/// A guard/linter run result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuardEvidence {
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub report_id: String,
    pub failing_rules: Vec<String>,
    pub task_id: Option<String>,
}

impl GuardEvidence {
    pub fn new(
        status: RunStatus,
        report_id: impl Into<String>,
        failing_rules: Vec<String>,
        task_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp: now,
            status,
            report_id: report_id.into(),
            failing_rules: cap_details(failing_rules, 10),
            task_id,
        }
    }
}

/// A test-runner run result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestEvidence {
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub run_id: String,
    pub failing_tests: Vec<String>,
    pub console_error_count: u32,
    pub network_failure_count: u32,
    pub task_id: Option<String>,
}

impl TestEvidence {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        status: RunStatus,
        run_id: impl Into<String>,
        failing_tests: Vec<String>,
        console_error_count: u32,
        network_failure_count: u32,
        task_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp: now,
            status,
            run_id: run_id.into(),
            failing_tests: cap_details(failing_tests, 10),
            console_error_count,
            network_failure_count,
            task_id,
        }
    }
}

/// The pair of evidence streams the Gate Engine consults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceState {
    pub last_guard_run: Option<GuardEvidence>,
    pub last_test_run: Option<TestEvidence>,
}

/// Cumulative token usage tracked by the Budget Governor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub used: u64,
    pub estimated_total: u64,
    pub percentage: f64,
    pub last_updated: DateTime<Utc>,
}

impl TokenUsage {
    pub fn new(used: u64, estimated_total: u64, now: DateTime<Utc>) -> Self {
        let percentage = if estimated_total == 0 {
            0.0
        } else {
            (used as f64 / estimated_total as f64) * 100.0
        };
        Self {
            used,
            estimated_total,
            percentage,
            last_updated: now,
        }
    }
}

/// Coarse admission-control bucket derived from token usage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GovernorMode {
    Normal,
    Conservative,
    Critical,
}
