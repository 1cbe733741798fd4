// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Service Errors
//!
//! The error surface shared by the three application services. Every
//! variant carries the offending identifier(s) and maps to one stable
//! snake_case kind that callers can match on.
//!
//! | Kind | Retried | HTTP |
//! |------|---------|------|
//! | `not_found` | never | 404 |
//! | `invalid_state` | never | 409 |
//! | `conflict` | never | 409 |
//! | `upstream_unavailable` | bounded, with backoff (signals only) | 502 |
//! | `timeout` | never | 504 |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::repository::RepositoryError;
use crate::domain::substrate::SubstrateError;
use crate::domain::workflow::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    Conflict,
    UpstreamUnavailable,
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidState => "invalid_state",
            Self::Conflict => "conflict",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{id}: {reason}")]
    InvalidState { id: String, reason: String },

    #[error("dataset '{dataset_id}' already has a run in progress ({running_run_id})")]
    Conflict { dataset_id: String, running_run_id: String },

    #[error("{service} unavailable for '{id}': {reason}")]
    UpstreamUnavailable { service: String, id: String, reason: String },

    #[error("'{id}' exceeded its {limit_ms}ms window")]
    Timeout { id: String, limit_ms: u64 },
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Identifiers this error refers to.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Self::NotFound { id, .. }
            | Self::InvalidState { id, .. }
            | Self::UpstreamUnavailable { id, .. }
            | Self::Timeout { id, .. } => vec![id.as_str()],
            Self::Conflict {
                dataset_id,
                running_run_id,
            } => vec![dataset_id.as_str(), running_run_id.as_str()],
        }
    }

    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(id: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn upstream(service: impl Into<String>, id: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Self::UpstreamUnavailable {
            service: service.into(),
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Translate a substrate failure for the given workflow.
    pub fn from_substrate(id: impl std::fmt::Display, err: SubstrateError) -> Self {
        match err {
            SubstrateError::NotFound(wf) => Self::not_found("workflow", wf),
            SubstrateError::Rejected(reason) => Self::invalid_state(id, reason),
            other => Self::upstream("execution substrate", id, other),
        }
    }

    /// Translate a storage failure; storage is treated as an upstream.
    pub fn from_repository(id: impl std::fmt::Display, err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(_) => Self::not_found("record", id),
            RepositoryError::Immutable(reason) => Self::invalid_state(id, reason),
            other => Self::upstream("storage", id, other),
        }
    }
}

impl From<WorkflowError> for ServiceError {
    fn from(err: WorkflowError) -> Self {
        let id = err
            .workflow_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "workflow".to_string());
        ServiceError::InvalidState {
            id,
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::{WorkflowId, WorkflowStatus};

    #[test]
    fn test_kinds_are_stable_snake_case() {
        let err = ServiceError::not_found("workflow", "wf-1");
        assert_eq!(err.kind().as_str(), "not_found");
        assert_eq!(serde_json::to_string(&ErrorKind::UpstreamUnavailable).unwrap(), "\"upstream_unavailable\"");
    }

    #[test]
    fn test_workflow_error_carries_workflow_id() {
        let err: ServiceError = WorkflowError::SignalNotAccepted {
            id: WorkflowId::from_string("wf-123"),
            signal: "approve".into(),
            status: WorkflowStatus::Running,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(err.ids(), vec!["wf-123"]);
        assert!(err.to_string().contains("approve"));
    }

    #[test]
    fn test_conflict_names_both_ids() {
        let err = ServiceError::Conflict {
            dataset_id: "sample-policy".into(),
            running_run_id: "r-1".into(),
        };
        assert_eq!(err.ids(), vec!["sample-policy", "r-1"]);
    }

    #[test]
    fn test_substrate_mapping() {
        let err = ServiceError::from_substrate("wf-9", SubstrateError::Timeout(500));
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
        let err = ServiceError::from_substrate("wf-9", SubstrateError::NotFound(WorkflowId::from_string("wf-9")));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
