// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Golden Thread Domain Model
//!
//! A golden run is one pass of the fixed, ordered battery of end-to-end
//! checks against one seeded dataset. The run, its per-check evidence and the
//! trace/workflow/session identifiers form the evidence bundle an auditor
//! needs to replay the verdict independently.
//!
//! | Type | Role |
//! |------|------|
//! | [`CheckId`] | The eight checks, in execution order |
//! | [`GoldenCheck`] | One atomic verification with terse evidence |
//! | [`GoldenRun`] | Aggregate root; append-only once finalized |
//! | [`GoldenDataset`] | Immutable seeded fixture |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::narrative::{self, Narrative};
use crate::domain::workflow::WorkflowId;

/// Step order a driven workflow must follow for `workflow_ordering` to pass.
pub const CANONICAL_STEPS: [&str; 5] = ["initialize", "enrich", "reason", "validate", "persist"];

/// Evidence prefix for checks whose precondition failed.
pub const SKIPPED_EVIDENCE: &str = "skipped: precondition failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckId {
    AuthGate,
    IngestDocument,
    IndexChunks,
    MemorySearch,
    GroundedAnswer,
    WorkflowOrdering,
    ValidationGate,
    EpisodeTranscript,
}

impl CheckId {
    pub const ALL: [CheckId; 8] = [
        CheckId::AuthGate,
        CheckId::IngestDocument,
        CheckId::IndexChunks,
        CheckId::MemorySearch,
        CheckId::GroundedAnswer,
        CheckId::WorkflowOrdering,
        CheckId::ValidationGate,
        CheckId::EpisodeTranscript,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthGate => "auth_gate",
            Self::IngestDocument => "ingest_document",
            Self::IndexChunks => "index_chunks",
            Self::MemorySearch => "memory_search",
            Self::GroundedAnswer => "grounded_answer",
            Self::WorkflowOrdering => "workflow_ordering",
            Self::ValidationGate => "validation_gate",
            Self::EpisodeTranscript => "episode_transcript",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::AuthGate => "Auth gate",
            Self::IngestDocument => "Ingest document",
            Self::IndexChunks => "Index chunks to memory",
            Self::MemorySearch => "Memory search hit",
            Self::GroundedAnswer => "Grounded answer",
            Self::WorkflowOrdering => "Workflow ordering",
            Self::ValidationGate => "Validation gate",
            Self::EpisodeTranscript => "Episode transcript",
        }
    }

    /// Position in the battery, starting at 1.
    pub fn ordinal(&self) -> usize {
        Self::ALL.iter().position(|c| c == self).map(|p| p + 1).unwrap_or(0)
    }
}

impl std::fmt::Display for CheckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pending,
    Running,
    Pass,
    Fail,
    Warn,
}

impl CheckStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Pass | Self::Fail | Self::Warn)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Warn => "warn",
        }
    }
}

/// One atomic verification inside a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenCheck {
    pub id: CheckId,
    pub name: String,
    pub status: CheckStatus,
    pub duration_ms: Option<u64>,
    /// Single auditor-legible line.
    pub evidence: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    #[serde(skip)]
    started_at: Option<DateTime<Utc>>,
}

impl GoldenCheck {
    pub fn pending(id: CheckId) -> Self {
        Self {
            id,
            name: id.display_name().to_string(),
            status: CheckStatus::Pending,
            duration_ms: None,
            evidence: String::new(),
            detail: None,
            started_at: None,
        }
    }

    pub fn start(&mut self) -> Result<(), GoldenError> {
        if self.status != CheckStatus::Pending {
            return Err(GoldenError::CheckAlreadySettled(self.id));
        }
        self.status = CheckStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Set the terminal outcome. Evidence is collapsed onto one line.
    pub fn finish(
        &mut self,
        status: CheckStatus,
        evidence: impl AsRef<str>,
        detail: Option<serde_json::Value>,
    ) -> Result<(), GoldenError> {
        if self.status.is_terminal() {
            return Err(GoldenError::CheckAlreadySettled(self.id));
        }
        if !status.is_terminal() {
            return Err(GoldenError::NonTerminalOutcome(self.id));
        }
        let now = Utc::now();
        self.duration_ms = self
            .started_at
            .map(|s| (now - s).num_milliseconds().max(0) as u64)
            .or(Some(0));
        self.status = status;
        self.evidence = single_line(evidence.as_ref());
        self.detail = detail;
        Ok(())
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Pass,
    Fail,
    Warn,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Warn => "WARN",
        }
    }

    /// RUNNING while any check is unsettled, else FAIL > WARN > PASS.
    pub fn derive(checks: &[GoldenCheck]) -> Self {
        if checks.iter().any(|c| !c.status.is_terminal()) {
            Self::Running
        } else if checks.iter().any(|c| c.status == CheckStatus::Fail) {
            Self::Fail
        } else if checks.iter().any(|c| c.status == CheckStatus::Warn) {
            Self::Warn
        } else {
            Self::Pass
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input provenance. Never changes which checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Deterministic,
    Acceptance,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deterministic => "deterministic",
            Self::Acceptance => "acceptance",
        }
    }
}

impl FromStr for RunMode {
    type Err = GoldenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deterministic" => Ok(Self::Deterministic),
            "acceptance" => Ok(Self::Acceptance),
            other => Err(GoldenError::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Golden Run Aggregate Root
///
/// Invariant: `checks_passed` always equals the number of checks in `pass`,
/// and `status` always equals [`RunStatus::derive`] over the checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenRun {
    pub id: RunId,
    pub dataset_id: String,
    pub mode: RunMode,
    pub status: RunStatus,
    pub checks_total: usize,
    pub checks_passed: usize,
    pub checks: Vec<GoldenCheck>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub trace_id: String,
    pub workflow_id: Option<WorkflowId>,
    pub session_id: String,
    pub operator_narrative: String,
    pub stakeholder_narrative: String,
    /// Whether the run belongs in the compliance audit channel.
    pub audited: bool,
}

impl GoldenRun {
    pub fn new(dataset_id: impl Into<String>, mode: RunMode) -> Self {
        let id = RunId::new();
        let checks: Vec<GoldenCheck> = CheckId::ALL.iter().copied().map(GoldenCheck::pending).collect();
        Self {
            id,
            dataset_id: dataset_id.into(),
            mode,
            status: RunStatus::Running,
            checks_total: checks.len(),
            checks_passed: 0,
            checks,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            trace_id: Uuid::new_v4().simple().to_string(),
            workflow_id: None,
            session_id: format!("gt-{}", id.0.simple()),
            operator_narrative: String::new(),
            stakeholder_narrative: String::new(),
            audited: false,
        }
    }

    pub fn check(&self, id: CheckId) -> Option<&GoldenCheck> {
        self.checks.iter().find(|c| c.id == id)
    }

    pub fn check_mut(&mut self, id: CheckId) -> Result<&mut GoldenCheck, GoldenError> {
        self.checks
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(GoldenError::UnknownCheck(id))
    }

    /// Begin a check. The previous check in order must already be settled.
    pub fn start_check(&mut self, id: CheckId) -> Result<(), GoldenError> {
        if let Some(prev) = self.checks.iter().take_while(|c| c.id != id).find(|c| !c.status.is_terminal()) {
            return Err(GoldenError::OutOfOrder { check: id, blocking: prev.id });
        }
        self.check_mut(id)?.start()?;
        self.refresh_counts();
        Ok(())
    }

    pub fn finish_check(
        &mut self,
        id: CheckId,
        status: CheckStatus,
        evidence: impl AsRef<str>,
        detail: Option<serde_json::Value>,
    ) -> Result<(), GoldenError> {
        self.check_mut(id)?.finish(status, evidence, detail)?;
        self.refresh_counts();
        Ok(())
    }

    /// Fail every still-pending check as skipped.
    pub fn skip_remaining(&mut self, reason: &str) {
        for check in self.checks.iter_mut().filter(|c| c.status == CheckStatus::Pending) {
            let evidence = if reason.is_empty() {
                SKIPPED_EVIDENCE.to_string()
            } else {
                format!("{} ({})", SKIPPED_EVIDENCE, reason)
            };
            let _ = check.finish(CheckStatus::Fail, evidence, None);
        }
        self.refresh_counts();
    }

    pub fn failing_checks(&self) -> Vec<&GoldenCheck> {
        self.checks
            .iter()
            .filter(|c| matches!(c.status, CheckStatus::Fail | CheckStatus::Warn))
            .collect()
    }

    fn refresh_counts(&mut self) {
        self.checks_passed = self.checks.iter().filter(|c| c.status == CheckStatus::Pass).count();
        self.status = RunStatus::derive(&self.checks);
    }

    /// Stamp the end of the run and generate both narratives.
    pub fn finalize(&mut self, audited: bool) {
        self.skip_remaining("");
        let now = Utc::now();
        self.finished_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
        self.audited = audited;
        let Narrative { operator, stakeholder } = narrative::run_narratives(self.status, &self.checks);
        self.operator_narrative = operator;
        self.stakeholder_narrative = stakeholder;
    }
}

/// Immutable seeded fixture a run executes against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenDataset {
    pub id: String,
    pub name: String,
    pub filename: String,
    /// Hex SHA-256 of the fixture bytes.
    pub content_hash: String,
    pub size_label: String,
    pub anchor_terms: Vec<String>,
    /// Sources a grounded answer is expected to cite.
    pub expected_sources: Vec<String>,
    #[serde(skip)]
    pub content: Vec<u8>,
}

impl GoldenDataset {
    /// Query the memory-search check issues, built from the anchors.
    pub fn search_query(&self) -> String {
        self.anchor_terms.join(" ")
    }
}

#[derive(Debug, Error)]
pub enum GoldenError {
    #[error("Check {0} has already settled")]
    CheckAlreadySettled(CheckId),

    #[error("Check {0} must finish with pass, fail or warn")]
    NonTerminalOutcome(CheckId),

    #[error("Check {check} cannot start before {blocking} settles")]
    OutOfOrder { check: CheckId, blocking: CheckId },

    #[error("Check {0} is not part of this run")]
    UnknownCheck(CheckId),

    #[error("Unknown run mode: {0}")]
    UnknownMode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_has_eight_pending_checks_in_order() {
        let run = GoldenRun::new("sample-policy", RunMode::Deterministic);
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.checks_total, 8);
        let ids: Vec<_> = run.checks.iter().map(|c| c.id).collect();
        assert_eq!(ids, CheckId::ALL.to_vec());
        assert!(run.checks.iter().all(|c| c.status == CheckStatus::Pending));
        assert!(!run.trace_id.is_empty());
        assert!(!run.session_id.is_empty());
    }

    #[test]
    fn test_status_derivation_precedence() {
        let mut run = GoldenRun::new("d", RunMode::Deterministic);
        for (i, id) in CheckId::ALL.iter().enumerate() {
            run.start_check(*id).unwrap();
            let status = match i {
                2 => CheckStatus::Warn,
                _ => CheckStatus::Pass,
            };
            run.finish_check(*id, status, "ok", None).unwrap();
        }
        assert_eq!(run.status, RunStatus::Warn);
        assert_eq!(run.checks_passed, 7);

        let mut failed = GoldenRun::new("d", RunMode::Deterministic);
        failed.start_check(CheckId::AuthGate).unwrap();
        failed.finish_check(CheckId::AuthGate, CheckStatus::Fail, "401", None).unwrap();
        assert_eq!(failed.status, RunStatus::Running);
        failed.finalize(false);
        assert_eq!(failed.status, RunStatus::Fail);
        assert_eq!(failed.checks_passed, 0);
    }

    #[test]
    fn test_checks_must_start_in_order() {
        let mut run = GoldenRun::new("d", RunMode::Deterministic);
        let err = run.start_check(CheckId::IngestDocument).unwrap_err();
        assert!(matches!(err, GoldenError::OutOfOrder { blocking: CheckId::AuthGate, .. }));
    }

    #[test]
    fn test_check_is_terminal_once_set() {
        let mut check = GoldenCheck::pending(CheckId::AuthGate);
        check.start().unwrap();
        check.finish(CheckStatus::Pass, "ok", None).unwrap();
        assert!(check.finish(CheckStatus::Fail, "late", None).is_err());
        assert!(check.start().is_err());
        assert_eq!(check.status, CheckStatus::Pass);
    }

    #[test]
    fn test_evidence_is_single_line() {
        let mut check = GoldenCheck::pending(CheckId::IngestDocument);
        check.start().unwrap();
        check
            .finish(CheckStatus::Fail, "upstream error:\n  connection refused\r\n", None)
            .unwrap();
        assert_eq!(check.evidence, "upstream error: connection refused");
    }

    #[test]
    fn test_skip_remaining_marks_fail_with_prefix() {
        let mut run = GoldenRun::new("d", RunMode::Deterministic);
        run.start_check(CheckId::AuthGate).unwrap();
        run.finish_check(CheckId::AuthGate, CheckStatus::Pass, "ok", None).unwrap();
        run.skip_remaining("");
        assert!(run.checks[1..]
            .iter()
            .all(|c| c.status == CheckStatus::Fail && c.evidence.starts_with(SKIPPED_EVIDENCE)));
        assert_eq!(run.status, RunStatus::Fail);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Acceptance".parse::<RunMode>().unwrap(), RunMode::Acceptance);
        assert!("live".parse::<RunMode>().is_err());
    }
}
