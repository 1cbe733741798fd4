// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository contracts defined in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve domain aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresWorkflowRepository** - Workflow snapshots, terminal rows frozen
//! - **PostgresGoldenRunRepository** - Insert-only golden run log
//!
//! ## In-Memory Repositories
//!
//! - **InMemoryWorkflowRepository** - Lock-protected map, default backend
//! - **InMemoryGoldenRunRepository** - Lock-protected append-only vector

pub mod postgres_golden_run;
pub mod postgres_workflow;

pub use postgres_golden_run::PostgresGoldenRunRepository;
pub use postgres_workflow::PostgresWorkflowRepository;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::golden::{GoldenRun, RunId};
use crate::domain::repository::{GoldenRunRepository, RepositoryError, WorkflowRepository};
use crate::domain::workflow::{Workflow, WorkflowId, WorkflowStatus};

#[derive(Clone, Default)]
pub struct InMemoryWorkflowRepository {
    workflows: Arc<RwLock<HashMap<WorkflowId, Workflow>>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn save(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let mut workflows = self.workflows.write();
        if let Some(existing) = workflows.get(&workflow.id) {
            if existing.status().is_terminal() {
                return Err(RepositoryError::Immutable(format!(
                    "workflow {} is {}",
                    workflow.id,
                    existing.status()
                )));
            }
        }
        workflows.insert(workflow.id.clone(), workflow.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<Workflow>, RepositoryError> {
        Ok(self.workflows.read().get(id).cloned())
    }

    async fn list_page(
        &self,
        status: Option<WorkflowStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Workflow>, usize), RepositoryError> {
        let workflows = self.workflows.read();
        let mut matching: Vec<&Workflow> = workflows
            .values()
            .filter(|w| status.map_or(true, |s| w.status() == s))
            .collect();
        // Ties on created_at fall back to id so pages are stable
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        let total = matching.len();
        let page = matching.into_iter().skip(offset).take(limit).cloned().collect();
        Ok((page, total))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryGoldenRunRepository {
    runs: Arc<RwLock<Vec<GoldenRun>>>,
}

impl InMemoryGoldenRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GoldenRunRepository for InMemoryGoldenRunRepository {
    async fn append(&self, run: &GoldenRun) -> Result<(), RepositoryError> {
        let mut runs = self.runs.write();
        if runs.iter().any(|r| r.id == run.id) {
            return Err(RepositoryError::Immutable(format!("golden run {} already recorded", run.id)));
        }
        runs.push(run.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: RunId) -> Result<Option<GoldenRun>, RepositoryError> {
        Ok(self.runs.read().iter().find(|r| r.id == id).cloned())
    }

    async fn latest(&self) -> Result<Option<GoldenRun>, RepositoryError> {
        Ok(self.runs.read().iter().max_by_key(|r| r.started_at).cloned())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<GoldenRun>, RepositoryError> {
        let mut runs = self.runs.read().clone();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::golden::RunMode;
    use crate::domain::workflow::WorkflowType;

    fn workflow(id: &str) -> Workflow {
        Workflow::new(WorkflowId::from_string(id), WorkflowType::ProcessFlow, "a", "s", "t", None)
    }

    #[tokio::test]
    async fn test_terminal_workflow_is_never_rewritten() {
        let repo = InMemoryWorkflowRepository::new();
        let mut wf = workflow("wf-1");
        repo.save(&wf).await.unwrap();
        wf.fail("boom").unwrap();
        repo.save(&wf).await.unwrap();

        let stale = workflow("wf-1");
        let err = repo.save(&stale).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Immutable(_)));
        let stored = repo.find_by_id(&WorkflowId::from_string("wf-1")).await.unwrap().unwrap();
        assert_eq!(stored.status(), WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_run_log_is_append_only() {
        let repo = InMemoryGoldenRunRepository::new();
        let run = GoldenRun::new("sample-policy", RunMode::Deterministic);
        repo.append(&run).await.unwrap();
        assert!(repo.append(&run).await.is_err());
        assert_eq!(repo.list_recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_latest_is_by_timestamp() {
        let repo = InMemoryGoldenRunRepository::new();
        let mut newer = GoldenRun::new("a", RunMode::Deterministic);
        let older = GoldenRun::new("b", RunMode::Deterministic);
        newer.started_at = older.started_at + chrono::Duration::seconds(5);
        repo.append(&newer).await.unwrap();
        repo.append(&older).await.unwrap();
        assert_eq!(repo.latest().await.unwrap().unwrap().id, newer.id);
    }
}
