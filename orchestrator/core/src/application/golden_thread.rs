// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Golden Thread Validation Engine
//!
//! Drives one synthetic request through auth, ingestion, memory, grounded
//! generation, the workflow pipeline and the output gate, recording one
//! auditable [`GoldenRun`] per execution.
//!
//! Checks run strictly in order. Each check's precondition is the previous
//! check's postcondition, so the first `fail` marks every later check as
//! skipped. Distinct datasets run concurrently; a second run on a busy
//! dataset is refused with `conflict`.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::workflow_tracker::{StartWorkflowRequest, WorkflowTracker};
use crate::domain::capabilities::{CapabilityError, Collaborators, GateVerdict, InputProvenance};
use crate::domain::error::ServiceError;
use crate::domain::events::ValidationEvent;
use crate::domain::golden::{
    CheckId, CheckStatus, GoldenDataset, GoldenRun, RunId, RunMode, CANONICAL_STEPS,
};
use crate::domain::node_config::ValidationConfig;
use crate::domain::repository::GoldenRunRepository;
use crate::domain::workflow::{WorkflowId, WorkflowStatus, WorkflowType};
use crate::infrastructure::datasets::DatasetCatalog;
use crate::infrastructure::event_bus::EventBus;

/// Candidate handed to the output gate by the validation check. It cites
/// nothing and asserts an unsupported guarantee; a healthy gate must not
/// pass it through.
const FORCED_FAILURE_CANDIDATE: &str =
    "UNGROUNDED: this document guarantees permanent retention of every record with no exceptions.";

/// Upper bound on one page of run history.
pub const MAX_RUN_HISTORY: usize = 100;

/// Backoff bounds while waiting for the driven workflow to report its steps.
const ORDERING_POLL_INITIAL: Duration = Duration::from_millis(50);
const ORDERING_POLL_MAX: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
enum CheckError {
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("{0}")]
    Precondition(String),
}

struct CheckOutcome {
    status: CheckStatus,
    evidence: String,
    detail: Option<serde_json::Value>,
}

impl CheckOutcome {
    fn pass(evidence: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Pass,
            evidence: evidence.into(),
            detail: None,
        }
    }

    fn warn(evidence: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Warn,
            evidence: evidence.into(),
            detail: None,
        }
    }

    fn fail(evidence: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Fail,
            evidence: evidence.into(),
            detail: None,
        }
    }

    fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// State carried from one check to the next within a run.
#[derive(Default)]
struct RunContext {
    chunks: Vec<String>,
    workflow_id: Option<WorkflowId>,
}

/// Removes the dataset's in-flight marker when the run ends, however it ends.
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<String, RunId>,
    dataset_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.dataset_id);
    }
}

pub struct GoldenThreadService {
    catalog: DatasetCatalog,
    collaborators: Collaborators,
    tracker: Arc<WorkflowTracker>,
    runs: Arc<dyn GoldenRunRepository>,
    event_bus: Arc<EventBus>,
    config: ValidationConfig,
    in_flight: DashMap<String, RunId>,
}

impl GoldenThreadService {
    pub fn new(
        catalog: DatasetCatalog,
        collaborators: Collaborators,
        tracker: Arc<WorkflowTracker>,
        runs: Arc<dyn GoldenRunRepository>,
        event_bus: Arc<EventBus>,
        config: ValidationConfig,
    ) -> Self {
        Self {
            catalog,
            collaborators,
            tracker,
            runs,
            event_bus,
            config,
            in_flight: DashMap::new(),
        }
    }

    pub fn list_datasets(&self) -> Vec<GoldenDataset> {
        self.catalog.list()
    }

    pub async fn latest_run(&self) -> Result<Option<GoldenRun>, ServiceError> {
        self.runs
            .latest()
            .await
            .map_err(|e| ServiceError::from_repository("golden_runs", e))
    }

    /// Most recent runs first, at most [`MAX_RUN_HISTORY`].
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<GoldenRun>, ServiceError> {
        self.runs
            .list_recent(limit.min(MAX_RUN_HISTORY))
            .await
            .map_err(|e| ServiceError::from_repository("golden_runs", e))
    }

    pub async fn get_run(&self, run_id: &str) -> Result<GoldenRun, ServiceError> {
        let id = RunId::from_string(run_id).map_err(|_| ServiceError::not_found("golden run", run_id))?;
        self.runs
            .find_by_id(id)
            .await
            .map_err(|e| ServiceError::from_repository(run_id, e))?
            .ok_or_else(|| ServiceError::not_found("golden run", run_id))
    }

    /// Execute the full battery against one dataset and append the run.
    pub async fn run(&self, dataset_id: &str, mode: RunMode) -> Result<GoldenRun, ServiceError> {
        let dataset = self
            .catalog
            .get(dataset_id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("dataset", dataset_id))?;

        let mut run = GoldenRun::new(&dataset.id, mode);
        let _guard = self.claim(&dataset.id, run.id)?;

        info!(
            run_id = %run.id,
            dataset_id = %dataset.id,
            mode = mode.as_str(),
            trace_id = %run.trace_id,
            "Golden run started"
        );
        self.event_bus.publish_validation_event(ValidationEvent::RunStarted {
            run_id: run.id,
            dataset_id: dataset.id.clone(),
            mode,
            started_at: run.started_at,
        });

        let limit = Duration::from_secs(self.config.run_timeout_secs);
        if tokio::time::timeout(limit, self.execute(&mut run, &dataset)).await.is_err() {
            self.fail_in_flight_check(&mut run, limit);
        }

        let audited = mode == RunMode::Deterministic || self.config.audit_acceptance_runs;
        run.finalize(audited);

        self.runs
            .append(&run)
            .await
            .map_err(|e| ServiceError::from_repository(run.id, e))?;

        self.record_completion(&run);
        Ok(run)
    }

    fn claim(&self, dataset_id: &str, run_id: RunId) -> Result<InFlightGuard<'_>, ServiceError> {
        match self.in_flight.entry(dataset_id.to_string()) {
            Entry::Occupied(running) => {
                warn!(dataset_id, running_run_id = %running.get(), "Refusing concurrent golden run");
                Err(ServiceError::Conflict {
                    dataset_id: dataset_id.to_string(),
                    running_run_id: running.get().to_string(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(run_id);
                Ok(InFlightGuard {
                    in_flight: &self.in_flight,
                    dataset_id: dataset_id.to_string(),
                })
            }
        }
    }

    async fn execute(&self, run: &mut GoldenRun, dataset: &GoldenDataset) {
        let mut ctx = RunContext::default();

        for check in CheckId::ALL {
            if let Err(e) = run.start_check(check) {
                error!(run_id = %run.id, "Check sequencing broke: {}", e);
                break;
            }

            let outcome = match self.perform(check, run, dataset, &mut ctx).await {
                Ok(outcome) => outcome,
                Err(e) => CheckOutcome::fail(e.to_string()),
            };
            let status = outcome.status;
            if let Err(e) = run.finish_check(check, status, &outcome.evidence, outcome.detail) {
                error!(run_id = %run.id, check = %check, "Could not record check outcome: {}", e);
                break;
            }
            if ctx.workflow_id.is_some() && run.workflow_id.is_none() {
                run.workflow_id = ctx.workflow_id.clone();
            }

            let duration_ms = run.check(check).and_then(|c| c.duration_ms).unwrap_or(0);
            metrics::histogram!("goldthread_check_duration_ms", "check" => check.as_str()).record(duration_ms as f64);
            self.event_bus.publish_validation_event(ValidationEvent::CheckCompleted {
                run_id: run.id,
                check,
                status,
                duration_ms,
            });
            info!(run_id = %run.id, check = %check, status = status.as_str(), duration_ms, "Check settled");

            if status == CheckStatus::Fail {
                run.skip_remaining("");
                break;
            }
        }
    }

    async fn perform(
        &self,
        check: CheckId,
        run: &GoldenRun,
        dataset: &GoldenDataset,
        ctx: &mut RunContext,
    ) -> Result<CheckOutcome, CheckError> {
        match check {
            CheckId::AuthGate => self.check_auth_gate().await,
            CheckId::IngestDocument => self.check_ingest(run.mode, dataset, ctx).await,
            CheckId::IndexChunks => self.check_index(&run.session_id, ctx).await,
            CheckId::MemorySearch => self.check_search(dataset).await,
            CheckId::GroundedAnswer => self.check_grounded_answer(run, dataset, ctx).await,
            CheckId::WorkflowOrdering => self.check_workflow_ordering(run, ctx).await,
            CheckId::ValidationGate => self.check_validation_gate(&run.session_id).await,
            CheckId::EpisodeTranscript => self.check_episode(&run.session_id).await,
        }
    }

    async fn check_auth_gate(&self) -> Result<CheckOutcome, CheckError> {
        let auth = &self.collaborators.auth;
        if auth.authenticate(None).await? {
            return Ok(CheckOutcome::fail("unauthenticated request was accepted"));
        }
        if !auth.authenticate(Some(&self.config.probe_credentials)).await? {
            return Ok(CheckOutcome::fail("unauthenticated rejected; probe credentials also rejected"));
        }
        Ok(CheckOutcome::pass("unauthenticated rejected; authenticated accepted"))
    }

    async fn check_ingest(
        &self,
        mode: RunMode,
        dataset: &GoldenDataset,
        ctx: &mut RunContext,
    ) -> Result<CheckOutcome, CheckError> {
        let provenance = match mode {
            RunMode::Deterministic => InputProvenance::Seeded,
            RunMode::Acceptance => InputProvenance::Live,
        };
        let receipt = self
            .collaborators
            .ingestion
            .ingest(&dataset.filename, &dataset.content, provenance)
            .await?;

        if receipt.chunk_count == 0 {
            return Ok(CheckOutcome::fail(format!("0 chunks produced from {}", dataset.filename)));
        }
        ctx.chunks = receipt.chunks;
        let hash_prefix = dataset.content_hash.get(..12).unwrap_or(&dataset.content_hash);
        Ok(CheckOutcome::pass(format!(
            "{} chunks from {} ({}, sha256 {})",
            receipt.chunk_count, dataset.filename, dataset.size_label, hash_prefix
        ))
        .with_detail(json!({ "chunk_count": receipt.chunk_count, "content_hash": dataset.content_hash })))
    }

    async fn check_index(&self, session_id: &str, ctx: &RunContext) -> Result<CheckOutcome, CheckError> {
        if ctx.chunks.is_empty() {
            return Err(CheckError::Precondition("ingestion returned no chunk text to index".to_string()));
        }
        let receipt = self.collaborators.memory.write_facts(session_id, &ctx.chunks).await?;
        let written = receipt.fact_ids.len();
        let detail = json!({ "fact_ids": receipt.fact_ids });

        let outcome = if written == 0 {
            CheckOutcome::fail(format!("0 of {} chunks confirmed as facts", ctx.chunks.len()))
        } else if written < ctx.chunks.len() {
            CheckOutcome::warn(format!("{} of {} chunks confirmed as facts", written, ctx.chunks.len()))
        } else {
            CheckOutcome::pass(format!("{} facts written", written))
        };
        Ok(outcome.with_detail(detail))
    }

    async fn check_search(&self, dataset: &GoldenDataset) -> Result<CheckOutcome, CheckError> {
        let query = dataset.search_query();
        let hits = self.collaborators.memory.search(&query).await?;
        if hits.is_empty() {
            return Ok(CheckOutcome::fail(format!("0 hits for '{}'", query)));
        }

        let top = hits.iter().map(|h| h.score).fold(f64::MIN, f64::max);
        let from_dataset = hits
            .iter()
            .filter(|h| dataset.expected_sources.iter().any(|s| same_source(&h.source, s)))
            .count();
        let detail = json!({ "query": query, "hits": hits.len(), "top_score": top });

        let outcome = if from_dataset == 0 {
            CheckOutcome::warn(format!("{} hits for '{}', none from {}", hits.len(), query, dataset.filename))
        } else {
            CheckOutcome::pass(format!("{} hits for '{}', top score {:.2}", hits.len(), query, top))
        };
        Ok(outcome.with_detail(detail))
    }

    async fn check_grounded_answer(
        &self,
        run: &GoldenRun,
        dataset: &GoldenDataset,
        ctx: &mut RunContext,
    ) -> Result<CheckOutcome, CheckError> {
        let question = format!(
            "Using only {}, summarise what it says about {}. Cite your source.",
            dataset.filename,
            dataset.anchor_terms.join(", ")
        );

        let workflow = self
            .tracker
            .start(StartWorkflowRequest {
                workflow_type: WorkflowType::ValidationRun,
                input: json!({
                    "run_id": run.id,
                    "dataset_id": dataset.id,
                    "session_id": run.session_id,
                    "trace_id": run.trace_id,
                    "message": question,
                }),
                originating_actor: "golden-thread".to_string(),
                session_id: run.session_id.clone(),
                task_summary: format!("golden thread run {} on {}", run.id, dataset.id),
                delegation_chain: Vec::new(),
            })
            .await?;
        ctx.workflow_id = Some(workflow.id.clone());

        let reply = self.collaborators.conversation.converse(&run.session_id, &question).await?;
        if reply.response_text.trim().is_empty() {
            return Ok(CheckOutcome::fail("empty response to grounded question"));
        }

        let cited = reply
            .cited_sources
            .iter()
            .find(|c| dataset.expected_sources.iter().any(|s| same_source(c, s)));
        let detail = json!({ "cited_sources": reply.cited_sources, "workflow_id": workflow.id });
        let outcome = match cited {
            Some(source) => CheckOutcome::pass(format!("answer cites {}", source)),
            None if reply.cited_sources.is_empty() => CheckOutcome::fail("answer cites no sources"),
            None => CheckOutcome::fail(format!(
                "answer cites [{}], expected {}",
                reply.cited_sources.join(", "),
                dataset.expected_sources.join(" or ")
            )),
        };
        Ok(outcome.with_detail(detail))
    }

    /// Polls the driven workflow with backoff until it is terminal or has
    /// reported every canonical step, giving up early enough to settle the
    /// check inside the run timeout.
    async fn check_workflow_ordering(&self, run: &GoldenRun, ctx: &RunContext) -> Result<CheckOutcome, CheckError> {
        let workflow_id = ctx
            .workflow_id
            .as_ref()
            .ok_or_else(|| CheckError::Precondition("no workflow was driven by this run".to_string()))?;
        let deadline = run.started_at + chrono::Duration::seconds(self.config.run_timeout_secs as i64);

        let mut backoff = ORDERING_POLL_INITIAL;
        let workflow = loop {
            let workflow = self.tracker.refresh_now(workflow_id).await?;
            let reported_all = CANONICAL_STEPS
                .iter()
                .all(|step| workflow.steps().iter().any(|s| s.name == *step));
            if workflow.status().is_terminal() || reported_all {
                break workflow;
            }
            let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            if remaining <= backoff {
                warn!(run_id = %run.id, workflow_id = %workflow_id, status = %workflow.status(), "Gave up waiting for workflow steps");
                break workflow;
            }
            debug!(workflow_id = %workflow_id, steps = workflow.steps().len(), "Waiting for workflow steps");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(ORDERING_POLL_MAX);
        };

        let observed: Vec<&str> = workflow
            .steps()
            .iter()
            .map(|s| s.name.as_str())
            .filter(|name| CANONICAL_STEPS.contains(name))
            .collect();
        let detail = json!({ "workflow_id": workflow_id, "status": workflow.status(), "observed": observed });

        if workflow.status() == WorkflowStatus::Failed || workflow.status() == WorkflowStatus::Cancelled {
            return Ok(CheckOutcome::fail(format!("workflow {} ended {}", workflow_id, workflow.status())).with_detail(detail));
        }
        let missing: Vec<&str> = CANONICAL_STEPS.iter().copied().filter(|s| !observed.contains(s)).collect();
        if !missing.is_empty() {
            return Ok(CheckOutcome::fail(format!(
                "workflow {} ({}) missing steps: {}",
                workflow_id,
                workflow.status(),
                missing.join(", ")
            ))
            .with_detail(detail));
        }
        if observed != CANONICAL_STEPS {
            return Ok(CheckOutcome::fail(format!("out of order: {}", observed.join(" -> "))).with_detail(detail));
        }
        Ok(CheckOutcome::pass(CANONICAL_STEPS.join(" -> ")).with_detail(detail))
    }

    async fn check_validation_gate(&self, session_id: &str) -> Result<CheckOutcome, CheckError> {
        let verdict = self.collaborators.gate.review(session_id, FORCED_FAILURE_CANDIDATE).await?;
        Ok(match verdict {
            GateVerdict::Passed => CheckOutcome::fail("forced ungrounded result passed through the gate"),
            GateVerdict::Rewritten => CheckOutcome::pass("forced ungrounded result was rewritten"),
            GateVerdict::Rejected => CheckOutcome::pass("forced ungrounded result was rejected"),
        })
    }

    async fn check_episode(&self, session_id: &str) -> Result<CheckOutcome, CheckError> {
        let episode = self.collaborators.memory.get_episode(session_id).await?;
        if episode.transcript.is_empty() {
            return Ok(CheckOutcome::fail(format!("transcript for {} is empty", session_id)));
        }
        Ok(CheckOutcome::pass(format!(
            "{} transcript turns for {}",
            episode.transcript.len(),
            session_id
        )))
    }

    /// Settle whichever check the timeout interrupted.
    fn fail_in_flight_check(&self, run: &mut GoldenRun, limit: Duration) {
        let interrupted = run
            .checks
            .iter()
            .find(|c| c.status == CheckStatus::Running)
            .or_else(|| run.checks.iter().find(|c| c.status == CheckStatus::Pending))
            .map(|c| (c.id, c.status));

        let Some((check, status)) = interrupted else {
            return;
        };
        if status == CheckStatus::Pending {
            let _ = run.start_check(check);
        }
        let evidence = format!("timed out after {}s waiting on {}", limit.as_secs(), check);
        warn!(run_id = %run.id, check = %check, "Golden run timed out");
        if let Err(e) = run.finish_check(check, CheckStatus::Fail, evidence, None) {
            error!(run_id = %run.id, "Could not record timeout: {}", e);
        }
    }

    fn record_completion(&self, run: &GoldenRun) {
        metrics::counter!("goldthread_runs_total", "status" => run.status.as_str()).increment(1);

        let failing: Vec<&str> = run.failing_checks().iter().map(|c| c.id.as_str()).collect();
        info!(
            run_id = %run.id,
            dataset_id = %run.dataset_id,
            status = %run.status,
            checks_passed = run.checks_passed,
            checks_total = run.checks_total,
            failing = ?failing,
            "Golden run finished"
        );
        if run.audited {
            info!(
                target: "goldthread::audit",
                run_id = %run.id,
                dataset_id = %run.dataset_id,
                mode = run.mode.as_str(),
                status = %run.status,
                trace_id = %run.trace_id,
                session_id = %run.session_id,
                workflow_id = ?run.workflow_id.as_ref().map(|w| w.to_string()),
                "golden run evidence bundle"
            );
        }

        self.event_bus.publish_validation_event(ValidationEvent::RunCompleted {
            run_id: run.id,
            dataset_id: run.dataset_id.clone(),
            status: run.status,
            checks_passed: run.checks_passed,
            checks_total: run.checks_total,
            finished_at: run.finished_at.unwrap_or_else(Utc::now),
        });
    }
}

/// Source names match on their final path segment, case-insensitively.
fn same_source(cited: &str, expected: &str) -> bool {
    let tail = |s: &str| s.rsplit(['/', '\\']).next().unwrap_or(s).to_ascii_lowercase();
    tail(cited) == tail(expected)
}
