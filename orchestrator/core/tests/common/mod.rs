// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-process fakes of the substrate and collaborators, plus a harness
//! wiring the three services the way the daemon does.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use goldthread_core::application::alert_ledger::AlertLedger;
use goldthread_core::application::{EvidenceTelemetryService, GoldenThreadService, WorkflowTracker};
use goldthread_core::domain::capabilities::{
    AuthGateway, CapabilityError, Collaborators, ConversationReply, ConversationService, Episode, GateVerdict,
    IngestReceipt, IngestionService, InputProvenance, MemoryStore, OutputGate, SearchHit, WriteReceipt,
};
use goldthread_core::domain::golden::CANONICAL_STEPS;
use goldthread_core::domain::node_config::{TelemetryConfig, TrackerConfig, ValidationConfig};
use goldthread_core::domain::repository::WorkflowRepository;
use goldthread_core::domain::substrate::{ExecutionSubstrate, SignalAck, SubstrateError, SubstrateState};
use goldthread_core::domain::workflow::{
    SignalMapping, StepStatus, Workflow, WorkflowId, WorkflowStatus, WorkflowStep, WorkflowType,
};
use goldthread_core::infrastructure::datasets::DatasetCatalog;
use goldthread_core::infrastructure::event_bus::EventBus;
use goldthread_core::infrastructure::evidence_recorder::ChangeLog;
use goldthread_core::infrastructure::metrics_feed::InMemoryMetricsFeed;
use goldthread_core::infrastructure::repositories::{InMemoryGoldenRunRepository, InMemoryWorkflowRepository};
use goldthread_core::infrastructure::RetryingSubstrate;
use goldthread_core::presentation::{app, AppState};

pub const PROBE_CREDENTIALS: &str = "golden-thread-probe";

// ============================================================================
// Execution substrate
// ============================================================================

#[derive(Default)]
pub struct FakeSubstrate {
    states: Mutex<HashMap<WorkflowId, SubstrateState>>,
    pub queries: AtomicUsize,
    pub delivered: Mutex<Vec<(WorkflowId, String)>>,
    pub unavailable: AtomicBool,
    pub transient_signal_failures: AtomicU32,
    /// Report the canonical pipeline, completed, for every started workflow.
    pub run_pipeline: AtomicBool,
    /// Step order reported instead of the canonical one.
    pub pipeline_override: Mutex<Option<Vec<String>>>,
    /// Report the pipeline one step per query instead of all at start.
    pub staged_pipeline: AtomicBool,
    /// Queries served so far per staged workflow.
    stages: Mutex<HashMap<WorkflowId, usize>>,
    /// Latency added to every query.
    pub query_delay: Mutex<Option<Duration>>,
}

impl FakeSubstrate {
    pub fn set_state(&self, id: &WorkflowId, state: SubstrateState) {
        self.states.lock().insert(id.clone(), state);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// The pipeline as seen after `polls` queries: one more step each time,
    /// completed once every step has been reported.
    fn staged(&self, polls: usize) -> SubstrateState {
        let mut full = self.pipeline();
        if polls < full.steps.len() {
            full.steps.truncate(polls);
            if let Some(last) = full.steps.last_mut() {
                last.status = StepStatus::Running;
                last.finished_at = None;
                last.duration_ms = None;
            }
            full.status = WorkflowStatus::Running;
        }
        full
    }

    fn pipeline(&self) -> SubstrateState {
        let names: Vec<String> = self
            .pipeline_override
            .lock()
            .clone()
            .unwrap_or_else(|| CANONICAL_STEPS.iter().map(|s| s.to_string()).collect());
        let start = Utc::now() - ChronoDuration::seconds(names.len() as i64);
        SubstrateState {
            status: WorkflowStatus::Completed,
            steps: names
                .iter()
                .enumerate()
                .map(|(i, name)| completed_step(name, start + ChronoDuration::seconds(i as i64)))
                .collect(),
            awaiting_signals: Vec::new(),
            context: BTreeMap::new(),
        }
    }
}

pub fn completed_step(name: &str, at: chrono::DateTime<Utc>) -> WorkflowStep {
    let mut step = WorkflowStep::started(name, at);
    step.status = StepStatus::Completed;
    step.finished_at = Some(at);
    step.duration_ms = Some(0);
    step
}

pub fn state(status: WorkflowStatus) -> SubstrateState {
    SubstrateState {
        status,
        steps: Vec::new(),
        awaiting_signals: Vec::new(),
        context: BTreeMap::new(),
    }
}

#[async_trait]
impl ExecutionSubstrate for FakeSubstrate {
    async fn start(&self, _workflow_type: WorkflowType, _input: serde_json::Value) -> Result<WorkflowId, SubstrateError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SubstrateError::Unavailable("connection refused".into()));
        }
        let id = WorkflowId::new();
        let initial = if self.staged_pipeline.load(Ordering::SeqCst) {
            self.stages.lock().insert(id.clone(), 0);
            state(WorkflowStatus::Running)
        } else if self.run_pipeline.load(Ordering::SeqCst) {
            self.pipeline()
        } else {
            state(WorkflowStatus::Running)
        };
        self.states.lock().insert(id.clone(), initial);
        Ok(id)
    }

    async fn signal(&self, id: &WorkflowId, name: &str, _payload: serde_json::Value) -> Result<SignalAck, SubstrateError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SubstrateError::Unavailable("connection refused".into()));
        }
        if self
            .transient_signal_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SubstrateError::Timeout(50));
        }
        self.delivered.lock().push((id.clone(), name.to_string()));
        Ok(SignalAck {
            workflow_id: id.clone(),
            signal: name.to_string(),
            accepted: true,
        })
    }

    async fn query(&self, id: &WorkflowId) -> Result<SubstrateState, SubstrateError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let delay = *self.query_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SubstrateError::Unavailable("connection refused".into()));
        }
        let polls = self.stages.lock().get_mut(id).map(|polls| {
            *polls += 1;
            *polls
        });
        if let Some(polls) = polls {
            let staged = self.staged(polls);
            self.states.lock().insert(id.clone(), staged);
        }
        self.states
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| SubstrateError::NotFound(id.clone()))
    }
}

// ============================================================================
// Collaborators
// ============================================================================

pub struct FakeServices {
    pub ingestion_fails: AtomicBool,
    pub ingest_delay: Mutex<Option<Duration>>,
    pub gate_verdict: Mutex<GateVerdict>,
    pub cited_sources: Mutex<Vec<String>>,
    pub search_hits: AtomicUsize,
    transcripts: Mutex<HashMap<String, Vec<String>>>,
}

impl Default for FakeServices {
    fn default() -> Self {
        Self {
            ingestion_fails: AtomicBool::new(false),
            ingest_delay: Mutex::new(None),
            gate_verdict: Mutex::new(GateVerdict::Rejected),
            cited_sources: Mutex::new(vec!["sample-policy.md".to_string()]),
            search_hits: AtomicUsize::new(2),
            transcripts: Mutex::new(HashMap::new()),
        }
    }
}

impl FakeServices {
    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            auth: self.clone(),
            ingestion: self.clone(),
            memory: self.clone(),
            conversation: self.clone(),
            gate: self.clone(),
        }
    }
}

#[async_trait]
impl AuthGateway for FakeServices {
    async fn authenticate(&self, credentials: Option<&str>) -> Result<bool, CapabilityError> {
        Ok(credentials == Some(PROBE_CREDENTIALS))
    }
}

#[async_trait]
impl IngestionService for FakeServices {
    async fn ingest(&self, filename: &str, bytes: &[u8], _provenance: InputProvenance) -> Result<IngestReceipt, CapabilityError> {
        let delay = *self.ingest_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.ingestion_fails.load(Ordering::SeqCst) {
            return Err(CapabilityError::unavailable(
                "ingestion service",
                format!("HTTP 503 parser offline for {}", filename),
            ));
        }
        let chunks: Vec<String> = String::from_utf8_lossy(bytes)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect();
        Ok(IngestReceipt {
            chunk_count: chunks.len(),
            chunks,
        })
    }
}

#[async_trait]
impl MemoryStore for FakeServices {
    async fn write_facts(&self, _session_id: &str, chunks: &[String]) -> Result<WriteReceipt, CapabilityError> {
        Ok(WriteReceipt {
            fact_ids: (0..chunks.len()).map(|i| format!("fact-{}", i)).collect(),
        })
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, CapabilityError> {
        Ok((0..self.search_hits.load(Ordering::SeqCst))
            .map(|i| SearchHit {
                fact_id: format!("fact-{}", i),
                source: "sample-policy.md".to_string(),
                score: 0.9 - i as f64 * 0.1,
            })
            .collect())
    }

    async fn get_episode(&self, session_id: &str) -> Result<Episode, CapabilityError> {
        Ok(Episode {
            session_id: session_id.to_string(),
            transcript: self.transcripts.lock().get(session_id).cloned().unwrap_or_default(),
        })
    }
}

#[async_trait]
impl ConversationService for FakeServices {
    async fn converse(&self, session_id: &str, message: &str) -> Result<ConversationReply, CapabilityError> {
        let reply = "Records are retained for seven years and encrypted at rest.".to_string();
        let mut transcripts = self.transcripts.lock();
        let turns = transcripts.entry(session_id.to_string()).or_default();
        turns.push(message.to_string());
        turns.push(reply.clone());
        Ok(ConversationReply {
            response_text: reply,
            cited_sources: self.cited_sources.lock().clone(),
        })
    }
}

#[async_trait]
impl OutputGate for FakeServices {
    async fn review(&self, _session_id: &str, _candidate: &str) -> Result<GateVerdict, CapabilityError> {
        Ok(*self.gate_verdict.lock())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub substrate: Arc<FakeSubstrate>,
    pub services: Arc<FakeServices>,
    pub workflows: Arc<InMemoryWorkflowRepository>,
    pub runs: Arc<InMemoryGoldenRunRepository>,
    pub event_bus: Arc<EventBus>,
    pub feed: Arc<InMemoryMetricsFeed>,
    pub change_log: Arc<ChangeLog>,
    pub tracker: Arc<WorkflowTracker>,
    pub golden_thread: Arc<GoldenThreadService>,
    pub telemetry: Arc<EvidenceTelemetryService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_validation(ValidationConfig::default())
    }

    pub fn with_validation(validation: ValidationConfig) -> Self {
        let substrate = Arc::new(FakeSubstrate::default());
        substrate.run_pipeline.store(true, Ordering::SeqCst);
        let services = Arc::new(FakeServices::default());
        let workflows = Arc::new(InMemoryWorkflowRepository::new());
        let runs = Arc::new(InMemoryGoldenRunRepository::new());
        let event_bus = Arc::new(EventBus::with_default_capacity());
        let feed = Arc::new(InMemoryMetricsFeed::new(1_000));
        let change_log = Arc::new(ChangeLog::new(10));

        let tracker_config = TrackerConfig::default();
        let retrying = Arc::new(RetryingSubstrate::new(substrate.clone(), 2, 1));
        let tracker = Arc::new(WorkflowTracker::new(
            workflows.clone(),
            retrying,
            event_bus.clone(),
            SignalMapping::default(),
            &tracker_config,
        ));

        let golden_thread = Arc::new(GoldenThreadService::new(
            DatasetCatalog::seeded(),
            services.collaborators(),
            tracker.clone(),
            runs.clone(),
            event_bus.clone(),
            ValidationConfig {
                probe_credentials: PROBE_CREDENTIALS.to_string(),
                ..validation
            },
        ));

        let telemetry = Arc::new(
            EvidenceTelemetryService::new(
                feed.clone(),
                Arc::new(AlertLedger::new()),
                runs.clone(),
                change_log.clone(),
                event_bus.clone(),
                TelemetryConfig {
                    snapshot_cache_secs: 0,
                    ..TelemetryConfig::default()
                },
            )
            .with_tracker(tracker.clone()),
        );

        Self {
            substrate,
            services,
            workflows,
            runs,
            event_bus,
            feed,
            change_log,
            tracker,
            golden_thread,
            telemetry,
        }
    }

    pub fn router(&self) -> axum::Router {
        app(AppState {
            tracker: self.tracker.clone(),
            golden_thread: self.golden_thread.clone(),
            telemetry: self.telemetry.clone(),
            samples: self.feed.clone(),
            start_time: Instant::now(),
        })
    }

    /// Store a workflow directly, bypassing the substrate.
    pub async fn seed_workflow(&self, id: &str, status: WorkflowStatus, age_secs: i64) -> Workflow {
        let mut workflow = Workflow::new(
            WorkflowId::from_string(id),
            WorkflowType::ProcessFlow,
            "ops-agent",
            format!("session-{}", id),
            format!("task for {}", id),
            None,
        );
        workflow.created_at = Utc::now() - ChronoDuration::seconds(age_secs);
        match status {
            WorkflowStatus::Running => {}
            WorkflowStatus::Waiting => {
                workflow.begin_step("review").unwrap();
                workflow.request_approval("review", vec!["approve".into(), "reject".into()]).unwrap();
            }
            WorkflowStatus::Completed => workflow.complete().unwrap(),
            WorkflowStatus::Failed => workflow.fail("seeded failure").unwrap(),
            WorkflowStatus::Cancelled => {
                let mapping = SignalMapping::default();
                workflow.apply_signal("cancel", mapping.resolve("cancel")).unwrap();
            }
        }
        self.workflows.save(&workflow).await.unwrap();
        workflow
    }
}
