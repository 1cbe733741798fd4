// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Workflow Domain Model
//!
//! Observable lifecycle of a durable, resumable unit of work. The durable
//! execution substrate owns replay and history; this aggregate is the
//! control plane's view of it, mutated only through step events, signal
//! delivery, or a terminal transition.
//!
//! # Architectural Context
//!
//! - **Bounded Context:** Workflow Tracking Context
//! - **Aggregate Root:** Workflow
//!
//! # Lifecycle
//!
//! ```text
//!            approve                 cancel
//!   WAITING ---------> RUNNING ----------------> CANCELLED
//!     ^  \               |  \
//!     |   \ cancel       |   \ all steps done / unrecoverable failure
//!     |    \-> CANCELLED |    \-> COMPLETED | FAILED
//!     +------------------+
//!        step requests approval
//! ```
//!
//! Completed, failed and cancelled are terminal: no outgoing edges, and the
//! aggregate refuses every further mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Value Objects: Identifiers
// ============================================================================

/// Workflow identifier as issued by the execution substrate (e.g. `wf-123`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    pub fn new() -> Self {
        Self(format!("wf-{}", Uuid::new_v4().simple()))
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Value Objects: Status & Type
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Waiting,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Edges of the lifecycle graph. `Waiting -> Failed` exists only so an
    /// explicitly mapped rejection signal can terminate a gate.
    pub fn can_transition_to(&self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (self, next),
            (Running, Completed)
                | (Running, Failed)
                | (Running, Waiting)
                | (Running, Cancelled)
                | (Waiting, Running)
                | (Waiting, Cancelled)
                | (Waiting, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "waiting" => Ok(Self::Waiting),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(WorkflowError::UnknownStatus(other.to_string())),
        }
    }
}

/// What triggered the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    /// One agent handing work to another.
    AgentDelegation,
    /// A declared multi-step process flow.
    ProcessFlow,
    /// A workflow driven by a golden thread run.
    ValidationRun,
}

impl WorkflowType {
    /// Whether the workflow hands off between actors, in which case the
    /// delegation chain is surfaced to readers.
    pub fn is_multi_actor(&self) -> bool {
        matches!(self, Self::AgentDelegation)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentDelegation => "agent_delegation",
            Self::ProcessFlow => "process_flow",
            Self::ValidationRun => "validation_run",
        }
    }
}

// ============================================================================
// Entities: Steps
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

/// A named step in the workflow's ordered history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: String,
    pub status: StepStatus,
    /// Starts at 1, incremented on every retry of the same step.
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl WorkflowStep {
    pub fn started(name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Running,
            attempt: 1,
            started_at: at,
            finished_at: None,
            duration_ms: None,
            metadata: HashMap::new(),
            notes: None,
        }
    }

    fn finish(&mut self, status: StepStatus, at: DateTime<Utc>) {
        self.status = status;
        self.finished_at = Some(at);
        self.duration_ms = Some((at - self.started_at).num_milliseconds().max(0) as u64);
    }
}

// ============================================================================
// Value Objects: Delegation & Signals
// ============================================================================

/// Ordered, acyclic list of actors the work was handed through.
///
/// Fixed at workflow creation; no actor may appear twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct DelegationChain(Vec<String>);

impl DelegationChain {
    pub fn new(actors: Vec<String>) -> Result<Self, WorkflowError> {
        let mut seen = HashSet::new();
        for actor in &actors {
            if actor.trim().is_empty() {
                return Err(WorkflowError::EmptyActor);
            }
            if !seen.insert(actor.as_str()) {
                return Err(WorkflowError::CyclicDelegation(actor.clone()));
            }
        }
        Ok(Self(actors))
    }

    pub fn actors(&self) -> &[String] {
        &self.0
    }
}

impl TryFrom<Vec<String>> for DelegationChain {
    type Error = WorkflowError;

    fn try_from(actors: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(actors)
    }
}

impl From<DelegationChain> for Vec<String> {
    fn from(chain: DelegationChain) -> Self {
        chain.0
    }
}

pub const SIGNAL_APPROVE: &str = "approve";
pub const SIGNAL_CANCEL: &str = "cancel";
pub const SIGNAL_REJECT: &str = "reject";

/// One row of the signal-to-transition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalTransition {
    pub signal: String,
    /// States from which the signal is accepted.
    pub from: Vec<WorkflowStatus>,
    pub to: WorkflowStatus,
}

/// Explicit mapping from signal name to lifecycle transition.
///
/// Signals outside the table are rejected. Loaded from configuration so that
/// extensions such as `reject` are a deliberate choice rather than an
/// accident of naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMapping {
    transitions: Vec<SignalTransition>,
}

impl SignalMapping {
    pub fn new(transitions: Vec<SignalTransition>) -> Self {
        Self { transitions }
    }

    pub fn resolve(&self, signal: &str) -> Option<&SignalTransition> {
        self.transitions.iter().find(|t| t.signal == signal)
    }

    pub fn transitions(&self) -> &[SignalTransition] {
        &self.transitions
    }

    /// Names of the signals accepted from `status`, in table order.
    pub fn accepted_from(&self, status: WorkflowStatus) -> Vec<String> {
        self.transitions
            .iter()
            .filter(|t| t.from.contains(&status))
            .map(|t| t.signal.clone())
            .collect()
    }
}

impl Default for SignalMapping {
    fn default() -> Self {
        use WorkflowStatus::*;
        Self::new(vec![
            SignalTransition {
                signal: SIGNAL_APPROVE.to_string(),
                from: vec![Waiting],
                to: Running,
            },
            SignalTransition {
                signal: SIGNAL_CANCEL.to_string(),
                from: vec![Running, Waiting],
                to: Cancelled,
            },
            SignalTransition {
                signal: SIGNAL_REJECT.to_string(),
                from: vec![Waiting],
                to: Failed,
            },
        ])
    }
}

// ============================================================================
// Aggregate Root: Workflow
// ============================================================================

/// Workflow Aggregate Root
///
/// # Invariants
/// - Exactly one status at all times.
/// - Terminal workflows are immutable.
/// - A waiting workflow only accepts the signal names it declared.
/// - The delegation chain never repeats an actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub workflow_type: WorkflowType,
    status: WorkflowStatus,
    pub originating_actor: String,
    pub session_id: String,
    pub task_summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    delegation: Option<DelegationChain>,
    steps: Vec<WorkflowStep>,
    /// Signal names accepted while waiting.
    expected_signals: Vec<String>,
    /// Signal forwarded to the substrate but not yet confirmed by a poll.
    pending_confirmation: Option<String>,
    /// Key/value debug state reported by the substrate.
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl Workflow {
    pub fn new(
        id: WorkflowId,
        workflow_type: WorkflowType,
        originating_actor: impl Into<String>,
        session_id: impl Into<String>,
        task_summary: impl Into<String>,
        delegation: Option<DelegationChain>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            workflow_type,
            status: WorkflowStatus::Running,
            originating_actor: originating_actor.into(),
            session_id: session_id.into(),
            task_summary: task_summary.into(),
            created_at: now,
            updated_at: now,
            finished_at: None,
            delegation,
            steps: Vec::new(),
            expected_signals: Vec::new(),
            pending_confirmation: None,
            context: BTreeMap::new(),
        }
    }

    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn delegation(&self) -> Option<&DelegationChain> {
        self.delegation.as_ref()
    }

    pub fn expected_signals(&self) -> &[String] {
        &self.expected_signals
    }

    pub fn pending_confirmation(&self) -> Option<&str> {
        self.pending_confirmation.as_deref()
    }

    pub fn current_step(&self) -> Option<&WorkflowStep> {
        self.steps.iter().rev().find(|s| !s.status.is_done()).or(self.steps.last())
    }

    fn ensure_mutable(&self) -> Result<(), WorkflowError> {
        if self.status.is_terminal() {
            return Err(WorkflowError::TerminalImmutable {
                id: self.id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    fn transition(&mut self, next: WorkflowStatus) -> Result<(), WorkflowError> {
        self.ensure_mutable()?;
        if !self.status.can_transition_to(next) {
            return Err(WorkflowError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        if next != WorkflowStatus::Waiting {
            self.expected_signals.clear();
        }
        Ok(())
    }

    /// Start a step, or retry it if its previous attempt failed.
    pub fn begin_step(&mut self, name: &str) -> Result<(), WorkflowError> {
        self.ensure_mutable()?;
        let now = Utc::now();
        match self.steps.iter_mut().find(|s| s.name == name) {
            Some(step) if step.status == StepStatus::Failed => {
                step.attempt += 1;
                step.status = StepStatus::Running;
                step.started_at = now;
                step.finished_at = None;
                step.duration_ms = None;
            }
            Some(_) => {
                return Err(WorkflowError::StepAlreadyStarted {
                    id: self.id.clone(),
                    step: name.to_string(),
                })
            }
            None => self.steps.push(WorkflowStep::started(name, now)),
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn complete_step(
        &mut self,
        name: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<(), WorkflowError> {
        self.ensure_mutable()?;
        let now = Utc::now();
        let step = self.step_mut(name)?;
        step.metadata.extend(metadata);
        step.finish(StepStatus::Completed, now);
        self.updated_at = now;
        Ok(())
    }

    /// Record a step failure. An unrecoverable failure fails the workflow;
    /// a recoverable one leaves it running so the step can be retried.
    pub fn fail_step(&mut self, name: &str, error: &str, recoverable: bool) -> Result<(), WorkflowError> {
        self.ensure_mutable()?;
        let now = Utc::now();
        let step = self.step_mut(name)?;
        step.notes = Some(error.to_string());
        step.finish(StepStatus::Failed, now);
        self.updated_at = now;
        if !recoverable {
            self.transition(WorkflowStatus::Failed)?;
        }
        Ok(())
    }

    /// A step asks for human approval: running -> waiting.
    pub fn request_approval(&mut self, name: &str, expected_signals: Vec<String>) -> Result<(), WorkflowError> {
        self.ensure_mutable()?;
        let step = self.step_mut(name)?;
        step.status = StepStatus::Waiting;
        self.transition(WorkflowStatus::Waiting)?;
        self.expected_signals = expected_signals;
        Ok(())
    }

    /// running -> completed, only once every step is done.
    pub fn complete(&mut self) -> Result<(), WorkflowError> {
        self.ensure_mutable()?;
        if let Some(step) = self.steps.iter().find(|s| !s.status.is_done()) {
            return Err(WorkflowError::StepsIncomplete {
                id: self.id.clone(),
                step: step.name.clone(),
            });
        }
        self.transition(WorkflowStatus::Completed)
    }

    pub fn fail(&mut self, reason: &str) -> Result<(), WorkflowError> {
        self.transition(WorkflowStatus::Failed)?;
        self.context
            .insert("failure_reason".to_string(), serde_json::Value::String(reason.to_string()));
        Ok(())
    }

    /// Check a signal against the current state without mutating anything.
    pub fn check_signal(&self, signal: &str, transition: Option<&SignalTransition>) -> Result<WorkflowStatus, WorkflowError> {
        self.ensure_mutable()?;
        let transition = transition.ok_or_else(|| WorkflowError::UnrecognizedSignal {
            id: self.id.clone(),
            signal: signal.to_string(),
        })?;
        if self.status == WorkflowStatus::Waiting
            && !self.expected_signals.is_empty()
            && !self.expected_signals.iter().any(|s| s == signal)
            && transition.to != WorkflowStatus::Cancelled
        {
            return Err(WorkflowError::UnrecognizedSignal {
                id: self.id.clone(),
                signal: signal.to_string(),
            });
        }
        if !transition.from.contains(&self.status) {
            return Err(WorkflowError::SignalNotAccepted {
                id: self.id.clone(),
                signal: signal.to_string(),
                status: self.status,
            });
        }
        Ok(transition.to)
    }

    /// Optimistically apply a signal that the substrate acknowledged.
    pub fn apply_signal(&mut self, signal: &str, transition: Option<&SignalTransition>) -> Result<WorkflowStatus, WorkflowError> {
        let next = self.check_signal(signal, transition)?;
        if next == WorkflowStatus::Running {
            let now = Utc::now();
            for step in self.steps.iter_mut().filter(|s| s.status == StepStatus::Waiting) {
                step.finish(StepStatus::Completed, now);
                step.notes = Some(format!("released by signal '{}'", signal));
            }
        }
        self.transition(next)?;
        self.pending_confirmation = Some(signal.to_string());
        Ok(next)
    }

    /// Fold the substrate's authoritative view into the aggregate.
    ///
    /// A terminal aggregate ignores later reports. Illegal status jumps are
    /// refused; step history and context are replaced when reported.
    /// Returns whether anything changed; an identical report leaves the
    /// aggregate untouched, `updated_at` included.
    pub fn reconcile(
        &mut self,
        status: WorkflowStatus,
        steps: Vec<WorkflowStep>,
        context: BTreeMap<String, serde_json::Value>,
    ) -> Result<bool, WorkflowError> {
        if self.status.is_terminal() {
            return Ok(false);
        }
        if status != self.status && !self.status.can_transition_to(status) {
            return Err(WorkflowError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: status,
            });
        }
        let status_changed = status != self.status;
        let steps_changed = !steps.is_empty() && steps != self.steps;
        let context_changed = context.iter().any(|(k, v)| self.context.get(k) != Some(v));
        let confirmed = self.pending_confirmation.take().is_some();
        if !(status_changed || steps_changed || context_changed || confirmed) {
            return Ok(false);
        }

        if steps_changed {
            self.steps = steps;
        }
        self.context.extend(context);
        self.updated_at = Utc::now();
        if status_changed {
            self.status = status;
            if status.is_terminal() {
                self.finished_at = Some(self.updated_at);
            }
            if status != WorkflowStatus::Waiting {
                self.expected_signals.clear();
            }
        }
        Ok(true)
    }

    /// Declare the signals a waiting workflow accepts (reported by the substrate).
    pub fn set_expected_signals(&mut self, signals: Vec<String>) -> Result<(), WorkflowError> {
        self.ensure_mutable()?;
        self.expected_signals = signals;
        Ok(())
    }

    fn step_mut(&mut self, name: &str) -> Result<&mut WorkflowStep, WorkflowError> {
        let id = self.id.clone();
        self.steps
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| WorkflowError::StepNotFound {
                id,
                step: name.to_string(),
            })
    }

    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            id: self.id.clone(),
            workflow_type: self.workflow_type,
            status: self.status,
            originating_actor: self.originating_actor.clone(),
            session_id: self.session_id.clone(),
            task_summary: self.task_summary.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            step_count: self.steps.len(),
            current_step: self.current_step().map(|s| s.name.clone()),
            delegation_chain: self.surfaced_delegation(),
        }
    }

    fn surfaced_delegation(&self) -> Option<Vec<String>> {
        if !self.workflow_type.is_multi_actor() {
            return None;
        }
        self.delegation.as_ref().map(|c| c.actors().to_vec())
    }
}

/// List-view projection of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: WorkflowId,
    pub workflow_type: WorkflowType,
    pub status: WorkflowStatus,
    pub originating_actor: String,
    pub session_id: String,
    pub task_summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub step_count: usize,
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegation_chain: Option<Vec<String>>,
}

/// Detail-view projection: the full aggregate plus its debug context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDetail {
    pub summary: WorkflowSummary,
    pub steps: Vec<WorkflowStep>,
    pub expected_signals: Vec<String>,
    pub pending_confirmation: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
    pub context_snapshot: BTreeMap<String, serde_json::Value>,
}

impl From<&Workflow> for WorkflowDetail {
    fn from(workflow: &Workflow) -> Self {
        Self {
            summary: workflow.summary(),
            steps: workflow.steps.clone(),
            expected_signals: workflow.expected_signals.clone(),
            pending_confirmation: workflow.pending_confirmation.clone(),
            finished_at: workflow.finished_at,
            context_snapshot: workflow.context.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow {id} is {status} and can no longer change")]
    TerminalImmutable { id: WorkflowId, status: WorkflowStatus },

    #[error("Workflow {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: WorkflowId,
        from: WorkflowStatus,
        to: WorkflowStatus,
    },

    #[error("Signal '{signal}' is not recognized by workflow {id}")]
    UnrecognizedSignal { id: WorkflowId, signal: String },

    #[error("Signal '{signal}' is not accepted while workflow {id} is {status}")]
    SignalNotAccepted {
        id: WorkflowId,
        signal: String,
        status: WorkflowStatus,
    },

    #[error("Step '{step}' not found in workflow {id}")]
    StepNotFound { id: WorkflowId, step: String },

    #[error("Step '{step}' of workflow {id} is already in progress or done")]
    StepAlreadyStarted { id: WorkflowId, step: String },

    #[error("Workflow {id} still has unfinished step '{step}'")]
    StepsIncomplete { id: WorkflowId, step: String },

    #[error("Actor '{0}' appears more than once in the delegation chain")]
    CyclicDelegation(String),

    #[error("Delegation chain contains an empty actor id")]
    EmptyActor,

    #[error("Unknown workflow status: {0}")]
    UnknownStatus(String),
}

impl WorkflowError {
    /// Workflow the error refers to, if any.
    pub fn workflow_id(&self) -> Option<&WorkflowId> {
        match self {
            Self::TerminalImmutable { id, .. }
            | Self::InvalidTransition { id, .. }
            | Self::UnrecognizedSignal { id, .. }
            | Self::SignalNotAccepted { id, .. }
            | Self::StepNotFound { id, .. }
            | Self::StepAlreadyStarted { id, .. }
            | Self::StepsIncomplete { id, .. } => Some(id),
            Self::CyclicDelegation(_) | Self::EmptyActor | Self::UnknownStatus(_) => None,
        }
    }
}
