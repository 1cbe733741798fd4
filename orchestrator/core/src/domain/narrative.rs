// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Narratives
//!
//! Deterministic, side-effect-free explanations of a golden run or a
//! telemetry snapshot, in two framings:
//!
//! - **operator**: impact / hypothesis / verify
//! - **stakeholder**: plan / ETA / rollback trigger
//!
//! Whenever the outcome is not clean, both strings name the responsible
//! checks or metrics.

use serde::{Deserialize, Serialize};

use crate::domain::golden::{CheckId, CheckStatus, GoldenCheck, RunStatus};
use crate::domain::telemetry::{AlertItem, AlertSeverity, MetricCard, MetricStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Narrative {
    pub operator: String,
    pub stakeholder: String,
}

pub fn run_narratives(status: RunStatus, checks: &[GoldenCheck]) -> Narrative {
    let failing: Vec<&GoldenCheck> = checks.iter().filter(|c| c.status == CheckStatus::Fail).collect();
    let warning: Vec<&GoldenCheck> = checks.iter().filter(|c| c.status == CheckStatus::Warn).collect();
    // The first failure is the root cause; the rest are usually skipped dependents.
    let root = failing.first().copied();

    match status {
        RunStatus::Pass => Narrative {
            operator: format!(
                "Impact: none, all {} checks passed. Hypothesis: ingestion, memory, chat, workflow and validation paths are healthy. Verify: compare trace and session ids against upstream logs.",
                checks.len()
            ),
            stakeholder: "Plan: no action required. ETA: n/a. Rollback trigger: none.".to_string(),
        },
        RunStatus::Running => Narrative {
            operator: "Impact: unknown, run still in progress. Hypothesis: n/a. Verify: wait for the run to settle.".to_string(),
            stakeholder: "Plan: await completion. ETA: within the run timeout. Rollback trigger: none yet.".to_string(),
        },
        RunStatus::Warn => {
            let names = join_checks(&warning);
            Narrative {
                operator: format!(
                    "Impact: degraded, {} reported warnings. Hypothesis: {} is operating outside its expected envelope. Verify: inspect the evidence for {}.",
                    names,
                    warning.first().map(|c| c.id.as_str()).unwrap_or("the check"),
                    names
                ),
                stakeholder: format!(
                    "Plan: investigate {} before the next release. ETA: next business day. Rollback trigger: any of {} turning to fail.",
                    names, names
                ),
            }
        }
        RunStatus::Fail => {
            let names = join_checks(&failing);
            let (root_id, root_evidence) = root
                .map(|c| (c.id.as_str(), c.evidence.as_str()))
                .unwrap_or(("unknown", ""));
            Narrative {
                operator: format!(
                    "Impact: golden thread broken at {} ({} failing: {}). Hypothesis: {}. Verify: re-run after checking {}.",
                    root_id,
                    failing.len(),
                    names,
                    hypothesis_for(root.map(|c| c.id), root_evidence),
                    owner_of(root.map(|c| c.id))
                ),
                stakeholder: format!(
                    "Plan: hold releases that depend on {}; fix {} and re-run. ETA: {}. Rollback trigger: {} still failing on the next run.",
                    owner_of(root.map(|c| c.id)),
                    root_id,
                    eta_for(root.map(|c| c.id)),
                    names
                ),
            }
        }
    }
}

fn join_checks(checks: &[&GoldenCheck]) -> String {
    checks.iter().map(|c| c.id.as_str()).collect::<Vec<_>>().join(", ")
}

fn hypothesis_for(check: Option<CheckId>, evidence: &str) -> String {
    let cause = match check {
        Some(CheckId::AuthGate) => "authentication gateway is misconfigured or down",
        Some(CheckId::IngestDocument) => "ingestion service rejected or could not parse the fixture",
        Some(CheckId::IndexChunks) => "memory store did not accept fact writes",
        Some(CheckId::MemorySearch) => "indexed facts are not retrievable by anchor terms",
        Some(CheckId::GroundedAnswer) => "conversation is not grounded in ingested sources",
        Some(CheckId::WorkflowOrdering) => "workflow steps ran out of canonical order",
        Some(CheckId::ValidationGate) => "output gate let a known-bad result through",
        Some(CheckId::EpisodeTranscript) => "session transcript was not persisted",
        None => "unknown",
    };
    if evidence.is_empty() {
        cause.to_string()
    } else {
        format!("{} ({})", cause, evidence)
    }
}

fn owner_of(check: Option<CheckId>) -> &'static str {
    match check {
        Some(CheckId::AuthGate) => "the auth gateway",
        Some(CheckId::IngestDocument) => "the ingestion pipeline",
        Some(CheckId::IndexChunks) | Some(CheckId::MemorySearch) | Some(CheckId::EpisodeTranscript) => {
            "the memory store"
        }
        Some(CheckId::GroundedAnswer) => "the conversation service",
        Some(CheckId::WorkflowOrdering) => "the execution substrate",
        Some(CheckId::ValidationGate) => "the output gate",
        None => "the platform",
    }
}

fn eta_for(check: Option<CheckId>) -> &'static str {
    match check {
        Some(CheckId::AuthGate) | Some(CheckId::ValidationGate) => "1h",
        Some(CheckId::IngestDocument) | Some(CheckId::IndexChunks) => "4h",
        _ => "1 business day",
    }
}

/// Narratives for a telemetry snapshot.
pub fn telemetry_narratives(cards: &[MetricCard], open_alerts: &[AlertItem]) -> Narrative {
    let bad: Vec<&MetricCard> = cards.iter().filter(|c| c.status == MetricStatus::Bad).collect();
    let warn: Vec<&MetricCard> = cards.iter().filter(|c| c.status == MetricStatus::Warn).collect();
    let top = open_alerts.iter().map(|a| a.severity).min();

    if bad.is_empty() && warn.is_empty() {
        let alert_note = if open_alerts.is_empty() {
            "no open alerts".to_string()
        } else {
            format!("{} alert(s) awaiting a healthy window before closing", open_alerts.len())
        };
        return Narrative {
            operator: format!(
                "Impact: none, all {} metrics within thresholds ({}). Hypothesis: n/a. Verify: cross-check the latest golden run.",
                cards.len(),
                alert_note
            ),
            stakeholder: "Plan: no action required. ETA: n/a. Rollback trigger: any metric turning bad.".to_string(),
        };
    }

    let bad_labels = labels(&bad);
    let warn_labels = labels(&warn);
    let breached = if bad.is_empty() { &warn_labels } else { &bad_labels };
    let unsafe_tenancy = bad.iter().any(|c| c.key.is_safety_critical());

    let operator = format!(
        "Impact: {}{}. Hypothesis: {}. Verify: confirm {} against the source feed and the latest golden run.",
        if bad.is_empty() { format!("degraded ({} warn)", warn_labels) } else { format!("{} bad", bad_labels) },
        if !bad.is_empty() && !warn.is_empty() { format!(", {} warn", warn_labels) } else { String::new() },
        if unsafe_tenancy {
            "tenant isolation breached, system is unsafe".to_string()
        } else {
            format!("regression in {}", breached)
        },
        breached
    );

    let (plan, eta) = match top {
        Some(AlertSeverity::P0) => ("page on-call and freeze deploys", "immediate"),
        Some(AlertSeverity::P1) => ("page on-call", "1h"),
        Some(AlertSeverity::P2) => ("triage in the current shift", "4h"),
        _ => ("track in backlog", "1 business day"),
    };
    let stakeholder = format!(
        "Plan: {} for {}. ETA: {}. Rollback trigger: {} remaining out of threshold after one full window.",
        plan, breached, eta, breached
    );

    Narrative { operator, stakeholder }
}

fn labels(cards: &[&MetricCard]) -> String {
    cards.iter().map(|c| c.label.as_str()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::golden::{GoldenRun, RunMode};
    use crate::domain::telemetry::{MetricKey, RangeLabel};

    fn settled(statuses: &[CheckStatus]) -> Vec<GoldenCheck> {
        let mut run = GoldenRun::new("d", RunMode::Deterministic);
        for (id, status) in CheckId::ALL.iter().zip(statuses) {
            run.start_check(*id).unwrap();
            run.finish_check(*id, *status, "evidence", None).unwrap();
        }
        run.checks
    }

    #[test]
    fn test_pass_narrative_names_no_checks() {
        let checks = settled(&[CheckStatus::Pass; 8]);
        let n = run_narratives(RunStatus::Pass, &checks);
        assert!(n.operator.starts_with("Impact: none"));
        assert!(!n.operator.contains("auth_gate"));
    }

    #[test]
    fn test_fail_narrative_names_failing_checks_in_both_framings() {
        let mut statuses = [CheckStatus::Pass; 8];
        statuses[1] = CheckStatus::Fail;
        statuses[2] = CheckStatus::Fail;
        let checks = settled(&statuses);
        let n = run_narratives(RunStatus::Fail, &checks);
        assert!(n.operator.contains("ingest_document"));
        assert!(n.operator.contains("index_chunks"));
        assert!(n.stakeholder.contains("ingest_document"));
        assert!(n.stakeholder.contains("Rollback trigger"));
    }

    #[test]
    fn test_narratives_are_deterministic() {
        let mut statuses = [CheckStatus::Pass; 8];
        statuses[6] = CheckStatus::Warn;
        let checks = settled(&statuses);
        assert_eq!(
            run_narratives(RunStatus::Warn, &checks),
            run_narratives(RunStatus::Warn, &checks)
        );
        assert!(run_narratives(RunStatus::Warn, &checks).stakeholder.contains("validation_gate"));
    }

    #[test]
    fn test_telemetry_narrative_names_breached_metric() {
        let cards = vec![
            MetricCard::new(MetricKey::ParseSuccessRate, Some(97.8), RangeLabel::M15),
            MetricCard::new(MetricKey::QueueDepth, Some(3.0), RangeLabel::M15),
        ];
        let n = telemetry_narratives(&cards, &[]);
        assert!(n.operator.contains("Parse success"));
        assert!(n.stakeholder.contains("Parse success"));
    }

    #[test]
    fn test_cross_tenant_flags_unsafe() {
        let cards = vec![MetricCard::new(MetricKey::CrossTenantViolations, Some(1.0), RangeLabel::H1)];
        let n = telemetry_narratives(&cards, &[]);
        assert!(n.operator.contains("unsafe"));
    }
}
