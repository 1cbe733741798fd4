// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow State Tracker
//!
//! Application service maintaining the observable lifecycle of workflows
//! run by the execution substrate.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** list / detail / signal / start / step events
//! - **Integration:** WorkflowRepository + ExecutionSubstrate + EventBus
//!
//! # Concurrency
//!
//! - `list` reads the repository only and never touches the substrate.
//! - `detail` reconciles with the substrate through a short-TTL poll cache;
//!   concurrent pollers of one workflow share a single in-flight query.
//! - `signal`, step events and the write-back half of `detail` are
//!   serialized per workflow id. The first writer wins and a loser whose
//!   signal no longer fits the new state gets `invalid_state`.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::error::ServiceError;
use crate::domain::events::WorkflowEvent;
use crate::domain::node_config::TrackerConfig;
use crate::domain::repository::WorkflowRepository;
use crate::domain::substrate::{ExecutionSubstrate, SubstrateState};
use crate::domain::workflow::{
    DelegationChain, SignalMapping, Workflow, WorkflowDetail, WorkflowId, WorkflowStatus, WorkflowSummary,
    WorkflowType,
};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowPage {
    pub items: Vec<WorkflowSummary>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalOutcome {
    pub workflow_id: WorkflowId,
    pub signal: String,
    pub status: WorkflowStatus,
    /// False when the signal was an accepted no-op (cancel on a terminal workflow).
    pub applied: bool,
    /// True until the next substrate poll confirms the transition.
    pub pending_confirmation: bool,
}

/// Request to register a newly triggered workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartWorkflowRequest {
    pub workflow_type: WorkflowType,
    #[serde(default)]
    pub input: serde_json::Value,
    pub originating_actor: String,
    pub session_id: String,
    pub task_summary: String,
    #[serde(default)]
    pub delegation_chain: Vec<String>,
}

/// Step-level event reported by the substrate's workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StepEvent {
    StepStarted {
        step: String,
    },
    StepCompleted {
        step: String,
        #[serde(default)]
        metadata: HashMap<String, serde_json::Value>,
    },
    StepFailed {
        step: String,
        error: String,
        #[serde(default)]
        recoverable: bool,
    },
    ApprovalRequested {
        step: String,
        signals: Vec<String>,
    },
    WorkflowCompleted,
    WorkflowFailed {
        reason: String,
    },
}

impl StepEvent {
    fn cause(&self) -> String {
        match self {
            Self::StepStarted { step }
            | Self::StepCompleted { step, .. }
            | Self::StepFailed { step, .. }
            | Self::ApprovalRequested { step, .. } => format!("step:{}", step),
            Self::WorkflowCompleted => "workflow_completed".to_string(),
            Self::WorkflowFailed { .. } => "workflow_failed".to_string(),
        }
    }
}

struct CachedState {
    fetched_at: Instant,
    state: SubstrateState,
}

pub struct WorkflowTracker {
    repository: Arc<dyn WorkflowRepository>,
    substrate: Arc<dyn ExecutionSubstrate>,
    event_bus: Arc<EventBus>,
    mapping: SignalMapping,
    max_page_size: usize,
    poll_ttl: Duration,
    stuck_after: chrono::Duration,
    signal_locks: DashMap<WorkflowId, Arc<Mutex<()>>>,
    poll_locks: DashMap<WorkflowId, Arc<Mutex<()>>>,
    poll_cache: DashMap<WorkflowId, CachedState>,
}

impl WorkflowTracker {
    pub fn new(
        repository: Arc<dyn WorkflowRepository>,
        substrate: Arc<dyn ExecutionSubstrate>,
        event_bus: Arc<EventBus>,
        mapping: SignalMapping,
        config: &TrackerConfig,
    ) -> Self {
        Self {
            repository,
            substrate,
            event_bus,
            mapping,
            max_page_size: config.max_page_size.max(1),
            poll_ttl: Duration::from_secs(config.poll_cache_ttl_secs),
            stuck_after: chrono::Duration::seconds(config.stuck_after_secs as i64),
            signal_locks: DashMap::new(),
            poll_locks: DashMap::new(),
            poll_cache: DashMap::new(),
        }
    }

    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    /// Most-recent-first page of workflow summaries. `limit` is capped.
    pub async fn list(
        &self,
        status: Option<WorkflowStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<WorkflowPage, ServiceError> {
        let limit = limit.min(self.max_page_size);
        let (workflows, total) = self
            .repository
            .list_page(status, limit, offset)
            .await
            .map_err(|e| ServiceError::from_repository("workflows", e))?;

        Ok(WorkflowPage {
            items: workflows.iter().map(Workflow::summary).collect(),
            total,
            limit,
            offset,
        })
    }

    pub async fn detail(&self, id: &WorkflowId) -> Result<WorkflowDetail, ServiceError> {
        let workflow = self.refresh(id).await?;
        Ok(WorkflowDetail::from(&workflow))
    }

    /// Load a workflow and fold in the substrate's latest view.
    ///
    /// A substrate outage degrades to the stored state; only an unknown id
    /// fails. The write-back runs under the per-workflow lock against a
    /// fresh copy, so a signal landing while the query is in flight is
    /// never overwritten. Nothing is written when the report changes nothing.
    pub async fn refresh(&self, id: &WorkflowId) -> Result<Workflow, ServiceError> {
        let workflow = self.load(id).await?;
        if workflow.status().is_terminal() {
            return Ok(workflow);
        }

        let state = match self.cached_query(id).await {
            Ok(state) => state,
            Err(e) => {
                warn!(workflow_id = %id, "Substrate query failed, serving stored state: {}", e);
                return Ok(workflow);
            }
        };

        let lock = self.signal_lock(id);
        let _guard = lock.lock().await;

        let mut workflow = self.load(id).await?;
        if workflow.status().is_terminal() {
            return Ok(workflow);
        }
        let before = workflow.status();
        if !self.should_accept(&workflow, &state) {
            debug!(workflow_id = %id, reported = %state.status, stored = %before, "Awaiting substrate confirmation");
            return Ok(workflow);
        }

        match workflow.reconcile(state.status, state.steps.clone(), state.context.clone()) {
            Ok(mut changed) => {
                if workflow.status() == WorkflowStatus::Waiting {
                    changed |= self.declare_signals(&mut workflow, &state.awaiting_signals)?;
                }
                if changed {
                    self.persist(&workflow).await?;
                }
                if workflow.status() != before {
                    self.publish_transition(&workflow, before, "substrate");
                }
            }
            Err(e) => {
                warn!(workflow_id = %id, "Ignoring substrate state: {}", e);
            }
        }
        Ok(workflow)
    }

    /// Record the signals a waiting workflow accepts. An empty report keeps
    /// an existing declaration, or falls back to every mapped signal that is
    /// valid from `waiting`.
    fn declare_signals(&self, workflow: &mut Workflow, reported: &[String]) -> Result<bool, ServiceError> {
        let signals = if !reported.is_empty() {
            reported.to_vec()
        } else if workflow.expected_signals().is_empty() {
            self.mapping.accepted_from(WorkflowStatus::Waiting)
        } else {
            return Ok(false);
        };
        if workflow.expected_signals() == signals.as_slice() {
            return Ok(false);
        }
        workflow.set_expected_signals(signals)?;
        Ok(true)
    }

    fn signal_lock(&self, id: &WorkflowId) -> Arc<Mutex<()>> {
        self.signal_locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// `refresh` that always asks the substrate, skipping the poll cache.
    pub async fn refresh_now(&self, id: &WorkflowId) -> Result<Workflow, ServiceError> {
        self.poll_cache.remove(id);
        self.refresh(id).await
    }

    /// While an optimistic transition awaits confirmation, a lagging
    /// substrate report of the old state is not allowed to roll it back.
    fn should_accept(&self, workflow: &Workflow, state: &SubstrateState) -> bool {
        if workflow.pending_confirmation().is_none() {
            return true;
        }
        state.status == workflow.status() || state.status.is_terminal()
    }

    async fn cached_query(&self, id: &WorkflowId) -> Result<SubstrateState, ServiceError> {
        if let Some(state) = self.fresh_cached(id) {
            return Ok(state);
        }

        // Single flight per workflow: late arrivals reuse the winner's result.
        let lock = self
            .poll_locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(state) = self.fresh_cached(id) {
            return Ok(state);
        }

        let state = self
            .substrate
            .query(id)
            .await
            .map_err(|e| ServiceError::from_substrate(id, e))?;
        self.poll_cache.insert(
            id.clone(),
            CachedState {
                fetched_at: Instant::now(),
                state: state.clone(),
            },
        );
        Ok(state)
    }

    fn fresh_cached(&self, id: &WorkflowId) -> Option<SubstrateState> {
        self.poll_cache
            .get(id)
            .filter(|c| c.fetched_at.elapsed() < self.poll_ttl)
            .map(|c| c.state.clone())
    }

    /// Deliver a signal to a workflow.
    pub async fn signal(
        &self,
        id: &WorkflowId,
        signal: &str,
        payload: serde_json::Value,
    ) -> Result<SignalOutcome, ServiceError> {
        let lock = self.signal_lock(id);
        let _guard = lock.lock().await;

        let mut workflow = self.load(id).await?;
        let transition = self.mapping.resolve(signal);

        if workflow.status().is_terminal() {
            if transition.map(|t| t.to) == Some(WorkflowStatus::Cancelled) {
                info!(workflow_id = %id, signal, status = %workflow.status(), "Cancel on terminal workflow is a no-op");
                record_signal(signal, "noop");
                return Ok(SignalOutcome {
                    workflow_id: id.clone(),
                    signal: signal.to_string(),
                    status: workflow.status(),
                    applied: false,
                    pending_confirmation: false,
                });
            }
            return Err(self.reject(id, signal, format!("workflow is {}", workflow.status())));
        }

        if let Err(e) = workflow.check_signal(signal, transition) {
            return Err(self.reject(id, signal, e.to_string()));
        }

        let ack = self.substrate.signal(id, signal, payload).await.map_err(|e| {
            record_signal(signal, "upstream_error");
            ServiceError::from_substrate(id, e)
        })?;
        if !ack.accepted {
            return Err(self.reject(id, signal, "execution substrate declined the signal".to_string()));
        }

        let before = workflow.status();
        let next = workflow.apply_signal(signal, transition)?;
        self.persist(&workflow).await?;
        self.poll_cache.remove(id);

        info!(workflow_id = %id, signal, from = %before, to = %next, "Signal applied");
        record_signal(signal, "applied");
        self.event_bus.publish_workflow_event(WorkflowEvent::SignalDelivered {
            workflow_id: id.clone(),
            signal: signal.to_string(),
            delivered_at: Utc::now(),
        });
        self.publish_transition(&workflow, before, &format!("signal:{}", signal));

        Ok(SignalOutcome {
            workflow_id: id.clone(),
            signal: signal.to_string(),
            status: next,
            applied: true,
            pending_confirmation: true,
        })
    }

    fn reject(&self, id: &WorkflowId, signal: &str, reason: String) -> ServiceError {
        warn!(workflow_id = %id, signal, "Signal rejected: {}", reason);
        record_signal(signal, "rejected");
        self.event_bus.publish_workflow_event(WorkflowEvent::SignalRejected {
            workflow_id: id.clone(),
            signal: signal.to_string(),
            reason: reason.clone(),
            rejected_at: Utc::now(),
        });
        ServiceError::invalid_state(id, reason)
    }

    /// Register a triggered workflow: start it on the substrate, then track it.
    pub async fn start(&self, request: StartWorkflowRequest) -> Result<Workflow, ServiceError> {
        let delegation = if request.delegation_chain.is_empty() {
            None
        } else {
            Some(DelegationChain::new(request.delegation_chain)?)
        };

        let id = self
            .substrate
            .start(request.workflow_type, request.input)
            .await
            .map_err(|e| ServiceError::from_substrate(request.workflow_type.as_str(), e))?;

        let workflow = Workflow::new(
            id.clone(),
            request.workflow_type,
            request.originating_actor,
            request.session_id,
            request.task_summary,
            delegation,
        );
        self.persist(&workflow).await?;

        info!(workflow_id = %id, workflow_type = workflow.workflow_type.as_str(), "Workflow registered");
        self.event_bus.publish_workflow_event(WorkflowEvent::WorkflowStarted {
            workflow_id: id,
            workflow_type: workflow.workflow_type,
            originating_actor: workflow.originating_actor.clone(),
            started_at: workflow.created_at,
        });
        Ok(workflow)
    }

    /// Apply a step-level event reported by the substrate.
    pub async fn apply_step_event(&self, id: &WorkflowId, event: StepEvent) -> Result<Workflow, ServiceError> {
        let lock = self.signal_lock(id);
        let _guard = lock.lock().await;

        let mut workflow = self.load(id).await?;
        let before = workflow.status();
        let cause = event.cause();

        match event {
            StepEvent::StepStarted { step } => workflow.begin_step(&step)?,
            StepEvent::StepCompleted { step, metadata } => workflow.complete_step(&step, metadata)?,
            StepEvent::StepFailed {
                step,
                error,
                recoverable,
            } => workflow.fail_step(&step, &error, recoverable)?,
            StepEvent::ApprovalRequested { step, signals } => {
                workflow.request_approval(&step, signals)?;
                self.declare_signals(&mut workflow, &[])?;
            }
            StepEvent::WorkflowCompleted => workflow.complete()?,
            StepEvent::WorkflowFailed { reason } => workflow.fail(&reason)?,
        }

        self.persist(&workflow).await?;
        self.poll_cache.remove(id);
        debug!(workflow_id = %id, cause = %cause, status = %workflow.status(), "Step event applied");
        if workflow.status() != before {
            self.publish_transition(&workflow, before, &cause);
        }
        Ok(workflow)
    }

    /// Running or waiting workflows untouched for longer than the stuck
    /// threshold.
    pub async fn stuck_count(&self) -> Result<usize, ServiceError> {
        let cutoff = Utc::now() - self.stuck_after;
        let mut stuck = 0;
        for status in [WorkflowStatus::Running, WorkflowStatus::Waiting] {
            let (workflows, _) = self
                .repository
                .list_page(Some(status), usize::MAX, 0)
                .await
                .map_err(|e| ServiceError::from_repository("workflows", e))?;
            stuck += workflows.iter().filter(|w| w.updated_at < cutoff).count();
        }
        Ok(stuck)
    }

    async fn load(&self, id: &WorkflowId) -> Result<Workflow, ServiceError> {
        self.repository
            .find_by_id(id)
            .await
            .map_err(|e| ServiceError::from_repository(id, e))?
            .ok_or_else(|| ServiceError::not_found("workflow", id))
    }

    async fn persist(&self, workflow: &Workflow) -> Result<(), ServiceError> {
        self.repository
            .save(workflow)
            .await
            .map_err(|e| ServiceError::from_repository(&workflow.id, e))
    }

    fn publish_transition(&self, workflow: &Workflow, from: WorkflowStatus, cause: &str) {
        self.event_bus.publish_workflow_event(WorkflowEvent::WorkflowTransitioned {
            workflow_id: workflow.id.clone(),
            from,
            to: workflow.status(),
            cause: cause.to_string(),
            transitioned_at: workflow.updated_at,
        });
    }
}

fn record_signal(signal: &str, outcome: &'static str) {
    metrics::counter!("goldthread_signals_total", "signal" => signal.to_string(), "outcome" => outcome).increment(1);
}
