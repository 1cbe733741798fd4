// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate root: one repository per
//! aggregate, interface defined in the domain layer, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `WorkflowRepository` | `Workflow` | `InMemoryWorkflowRepository`, `PostgresWorkflowRepository` |
//! | `GoldenRunRepository` | `GoldenRun` | `InMemoryGoldenRunRepository`, `PostgresGoldenRunRepository` |
//!
//! ## Storage Backend Abstraction
//!
//! Implementations are selected at startup from `spec.database` in
//! `goldthread-config.yaml`: in-memory when absent, PostgreSQL otherwise.
//!
//! Both stores are history: workflows are never deleted and terminal rows
//! are never rewritten; golden runs are insert-only.

use async_trait::async_trait;

use crate::domain::golden::{GoldenRun, RunId};
use crate::domain::workflow::{Workflow, WorkflowId, WorkflowStatus};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// Repository interface for Workflow aggregates
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Save workflow (create or update). Refuses to rewrite a stored
    /// terminal workflow.
    async fn save(&self, workflow: &Workflow) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<Workflow>, RepositoryError>;

    /// Most-recent-first page plus the total matching count.
    async fn list_page(
        &self,
        status: Option<WorkflowStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Workflow>, usize), RepositoryError>;
}

/// Append-only log of golden runs
#[async_trait]
pub trait GoldenRunRepository: Send + Sync {
    /// Append a finalized run. Fails if the id already exists.
    async fn append(&self, run: &GoldenRun) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: RunId) -> Result<Option<GoldenRun>, RepositoryError>;

    /// Most recent run by start timestamp.
    async fn latest(&self) -> Result<Option<GoldenRun>, RepositoryError>;

    async fn list_recent(&self, limit: usize) -> Result<Vec<GoldenRun>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Immutable record: {0}")]
    Immutable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
