// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::golden::{CheckId, CheckStatus, RunId, RunMode, RunStatus};
use crate::domain::telemetry::{AlertSeverity, MetricKey};
use crate::domain::workflow::{WorkflowId, WorkflowStatus, WorkflowType};

/// Workflow lifecycle events (Workflow Tracking Context)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkflowEvent {
    WorkflowStarted {
        workflow_id: WorkflowId,
        workflow_type: WorkflowType,
        originating_actor: String,
        started_at: DateTime<Utc>,
    },
    WorkflowTransitioned {
        workflow_id: WorkflowId,
        from: WorkflowStatus,
        to: WorkflowStatus,
        cause: String, // "signal:<name>", "step:<name>", "substrate"
        transitioned_at: DateTime<Utc>,
    },
    SignalDelivered {
        workflow_id: WorkflowId,
        signal: String,
        delivered_at: DateTime<Utc>,
    },
    SignalRejected {
        workflow_id: WorkflowId,
        signal: String,
        reason: String,
        rejected_at: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    pub fn workflow_id(&self) -> &WorkflowId {
        match self {
            Self::WorkflowStarted { workflow_id, .. }
            | Self::WorkflowTransitioned { workflow_id, .. }
            | Self::SignalDelivered { workflow_id, .. }
            | Self::SignalRejected { workflow_id, .. } => workflow_id,
        }
    }
}

/// Golden thread run events (Validation Context)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ValidationEvent {
    RunStarted {
        run_id: RunId,
        dataset_id: String,
        mode: RunMode,
        started_at: DateTime<Utc>,
    },
    CheckCompleted {
        run_id: RunId,
        check: CheckId,
        status: CheckStatus,
        duration_ms: u64,
    },
    RunCompleted {
        run_id: RunId,
        dataset_id: String,
        status: RunStatus,
        checks_passed: usize,
        checks_total: usize,
        finished_at: DateTime<Utc>,
    },
}

/// Alert ledger events (Telemetry Context)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AlertEvent {
    AlertRaised {
        alert_id: String,
        cause: MetricKey,
        severity: AlertSeverity,
        title: String,
        raised_at: DateTime<Utc>,
    },
    AlertEscalated {
        alert_id: String,
        cause: MetricKey,
        from: AlertSeverity,
        to: AlertSeverity,
        title: String,
        escalated_at: DateTime<Utc>,
    },
    AlertClosed {
        alert_id: String,
        cause: MetricKey,
        closed_at: DateTime<Utc>,
    },
}
