// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Execution Substrate Contract
//!
//! The durable-execution engine persists workflow history, replays it after
//! crashes and delivers signals at least once. The control plane directs it
//! through this narrow contract and never reimplements any of it.
//!
//! # Architecture
//!
//! - **Layer:** Domain (port)
//! - **Implementations:** `infrastructure::substrate_client::HttpSubstrateClient`,
//!   wrapped by `RetryingSubstrate`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::workflow::{WorkflowId, WorkflowStatus, WorkflowStep, WorkflowType};

/// Authoritative state of a workflow as reported by the substrate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstrateState {
    pub status: WorkflowStatus,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    /// Signals the workflow is currently blocked on.
    #[serde(default)]
    pub awaiting_signals: Vec<String>,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalAck {
    pub workflow_id: WorkflowId,
    pub signal: String,
    pub accepted: bool,
}

#[async_trait]
pub trait ExecutionSubstrate: Send + Sync {
    async fn start(&self, workflow_type: WorkflowType, input: serde_json::Value) -> Result<WorkflowId, SubstrateError>;

    async fn signal(
        &self,
        workflow_id: &WorkflowId,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<SignalAck, SubstrateError>;

    async fn query(&self, workflow_id: &WorkflowId) -> Result<SubstrateState, SubstrateError>;
}

#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error("Workflow {0} unknown to the execution substrate")]
    NotFound(WorkflowId),

    #[error("Execution substrate rejected the request: {0}")]
    Rejected(String),

    #[error("Execution substrate unavailable: {0}")]
    Unavailable(String),

    #[error("Execution substrate timed out after {0}ms")]
    Timeout(u64),
}

impl SubstrateError {
    /// Transient failures worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}
