//! The Gate Engine: a pure function of `(evidence, policy, context, now)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::evidence::{EvidenceState, RunStatus};

use super::policy::GatePolicy;

/// One of the two evidence streams the engine reasons about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceStream {
    Guard,
    Test,
}

/// Aggregate gate status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Passed,
    Pending,
    Blocked,
}

/// A stream whose evidence failed, with a human-readable reason and capped detail list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailingEvidence {
    pub stream: EvidenceStream,
    pub reason: String,
    pub details: Vec<String>,
}

/// A suggested follow-up tool invocation, ordered by `priority` (lower runs first).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NextToolCall {
    pub tool: String,
    pub args: Value,
    pub reason: String,
    pub priority: u8,
}

/// Context the engine evaluates a gate against.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GateContext {
    pub task_id: Option<String>,
    pub task_type: Option<String>,
    pub task_name: Option<String>,
}

/// The result of one gate evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GatePolicyResult {
    pub status: GateStatus,
    pub missing_evidence: Vec<EvidenceStream>,
    pub failing_evidence: Vec<FailingEvidence>,
    pub next_tool_calls: Vec<NextToolCall>,
    pub reason: String,
}

/// Pure evaluator: same `(evidence, policy, context, now)` always produces a
/// byte-identical result. Never reads wall-clock time itself; `now` is
/// supplied by the caller (the executor), defaulting to `Utc::now()` only at
/// the executor's call site.
#[derive(Clone, Copy, Debug, Default)]
pub struct GateEngine;

impl GateEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &self,
        evidence: &EvidenceState,
        policy: &GatePolicy,
        context: &GateContext,
        now: DateTime<Utc>,
    ) -> GatePolicyResult {
        let mut missing = Vec::new();
        let mut failing = Vec::new();

        if policy.require_guard {
            evaluate_stream(
                EvidenceStream::Guard,
                evidence.last_guard_run.as_ref().map(|g| {
                    StreamRecord {
                        timestamp: g.timestamp,
                        status: g.status,
                        task_id: g.task_id.as_deref(),
                        failing_detail: format!(
                            "{} failing rule(s)",
                            g.failing_rules.len()
                        ),
                        details: g.failing_rules.clone(),
                    }
                }),
                policy,
                context,
                now,
                &mut missing,
                &mut failing,
            );
        }

        if policy.require_test {
            evaluate_stream(
                EvidenceStream::Test,
                evidence.last_test_run.as_ref().map(|t| StreamRecord {
                    timestamp: t.timestamp,
                    status: t.status,
                    task_id: t.task_id.as_deref(),
                    failing_detail: format!(
                        "{} failing test(s), {} console error(s), {} network failure(s)",
                        t.failing_tests.len(),
                        t.console_error_count,
                        t.network_failure_count
                    ),
                    details: t.failing_tests.clone(),
                }),
                policy,
                context,
                now,
                &mut missing,
                &mut failing,
            );
        }

        let status = if !failing.is_empty() {
            GateStatus::Blocked
        } else if !missing.is_empty() {
            GateStatus::Pending
        } else {
            GateStatus::Passed
        };

        let next_tool_calls = match status {
            GateStatus::Passed => Vec::new(),
            _ => build_remediation(&missing, &failing, policy, context),
        };

        let reason = describe(status, &missing, &failing);

        GatePolicyResult {
            status,
            missing_evidence: missing,
            failing_evidence: failing,
            next_tool_calls,
            reason,
        }
    }
}

struct StreamRecord<'a> {
    timestamp: DateTime<Utc>,
    status: RunStatus,
    task_id: Option<&'a str>,
    failing_detail: String,
    details: Vec<String>,
}

#[allow(clippy::too_many_arguments)]
fn evaluate_stream(
    stream: EvidenceStream,
    record: Option<StreamRecord<'_>>,
    policy: &GatePolicy,
    context: &GateContext,
    now: DateTime<Utc>,
    missing: &mut Vec<EvidenceStream>,
    failing: &mut Vec<FailingEvidence>,
) {
    let Some(record) = record else {
        missing.push(stream);
        return;
    };

    if record.status == RunStatus::Skipped {
        missing.push(stream);
        return;
    }

    let age_ms = (now - record.timestamp).num_milliseconds();
    if age_ms > policy.max_age_ms {
        missing.push(stream);
        return;
    }

    if policy.strict_task_scope {
        if let Some(expected) = context.task_id.as_deref() {
            if record.task_id != Some(expected) {
                missing.push(stream);
                return;
            }
        }
    }

    match record.status {
        RunStatus::Failed => {
            let mut details = record.details;
            details.truncate(policy.max_detail_items);
            failing.push(FailingEvidence {
                stream,
                reason: record.failing_detail,
                details,
            });
        }
        RunStatus::Passed => {}
        RunStatus::Skipped => unreachable!("handled above"),
    }
}

fn build_remediation(
    missing: &[EvidenceStream],
    failing: &[FailingEvidence],
    policy: &GatePolicy,
    context: &GateContext,
) -> Vec<NextToolCall> {
    let needs_guard = missing.contains(&EvidenceStream::Guard)
        || failing.iter().any(|f| f.stream == EvidenceStream::Guard);
    let needs_test = missing.contains(&EvidenceStream::Test)
        || failing.iter().any(|f| f.stream == EvidenceStream::Test);

    let ruleset = infer_ruleset(context.task_type.as_deref());
    let mut calls = Vec::new();

    if needs_guard {
        let mut args = policy.guard_args.clone().unwrap_or_else(|| json!({}));
        if let Some(obj) = args.as_object_mut() {
            if let Some(task_id) = &context.task_id {
                obj.entry("taskId").or_insert_with(|| json!(task_id));
            }
            obj.entry("ruleset").or_insert_with(|| json!(ruleset));
        }
        calls.push(NextToolCall {
            tool: "guard_validate".to_string(),
            args,
            reason: "guard evidence is missing or failing".to_string(),
            priority: 0,
        });
    }

    if needs_test {
        let mut args = policy.test_args.clone().unwrap_or_else(|| json!({}));
        if let Some(obj) = args.as_object_mut() {
            if let Some(task_id) = &context.task_id {
                obj.entry("taskId").or_insert_with(|| json!(task_id));
            }
            obj.entry("scope").or_insert_with(|| json!("affected"));
        }
        calls.push(NextToolCall {
            tool: "testing_run".to_string(),
            args,
            reason: "test evidence is missing or failing".to_string(),
            priority: 1,
        });
    }

    calls
}

fn infer_ruleset(task_type: Option<&str>) -> &'static str {
    match task_type {
        Some(t) if t.eq_ignore_ascii_case("frontend") => "frontend",
        _ => "backend",
    }
}

fn describe(status: GateStatus, missing: &[EvidenceStream], failing: &[FailingEvidence]) -> String {
    match status {
        GateStatus::Passed => "all required evidence passed".to_string(),
        GateStatus::Blocked => format!(
            "{} evidence stream(s) failing: {}",
            failing.len(),
            failing
                .iter()
                .map(|f| f.reason.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        ),
        GateStatus::Pending => format!(
            "{} evidence stream(s) missing or stale: {:?}",
            missing.len(),
            missing
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::GuardEvidence;

    fn now() -> DateTime<Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn passes_when_both_streams_pass() {
        let engine = GateEngine::new();
        let evidence = EvidenceState {
            last_guard_run: Some(GuardEvidence::new(
                RunStatus::Passed,
                "r1",
                vec![],
                None,
                now(),
            )),
            last_test_run: None,
        };
        let policy = GatePolicy {
            require_guard: true,
            require_test: false,
            ..Default::default()
        };
        let result = engine.evaluate(&evidence, &policy, &GateContext::default(), now());
        assert_eq!(result.status, GateStatus::Passed);
    }

    #[test]
    fn stale_evidence_is_missing_not_passed() {
        let engine = GateEngine::new();
        let stale_ts = now() - chrono::Duration::minutes(10);
        let evidence = EvidenceState {
            last_guard_run: Some(GuardEvidence::new(
                RunStatus::Passed,
                "r1",
                vec![],
                None,
                stale_ts,
            )),
            last_test_run: None,
        };
        let policy = GatePolicy {
            require_guard: true,
            max_age_ms: 5 * 60 * 1000,
            ..Default::default()
        };
        let result = engine.evaluate(&evidence, &policy, &GateContext::default(), now());
        assert_eq!(result.status, GateStatus::Pending);
        assert_eq!(result.missing_evidence, vec![EvidenceStream::Guard]);
    }

    #[test]
    fn deterministic_for_fixed_inputs() {
        let engine = GateEngine::new();
        let evidence = EvidenceState::default();
        let policy = GatePolicy {
            require_guard: true,
            require_test: true,
            ..Default::default()
        };
        let ctx = GateContext {
            task_id: Some("t1".into()),
            task_type: Some("frontend".into()),
            task_name: None,
        };
        let a = engine.evaluate(&evidence, &policy, &ctx, now());
        let b = engine.evaluate(&evidence, &policy, &ctx, now());
        assert_eq!(a, b);
        assert_eq!(a.next_tool_calls[0].tool, "guard_validate");
        assert_eq!(a.next_tool_calls[1].tool, "testing_run");
    }
}
