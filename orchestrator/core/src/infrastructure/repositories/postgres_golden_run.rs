// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::golden::{GoldenRun, RunId};
use crate::domain::repository::{GoldenRunRepository, RepositoryError};

/// Insert-only golden run log. There is no update or delete path.
pub struct PostgresGoldenRunRepository {
    pool: PgPool,
}

impl PostgresGoldenRunRepository {
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode(row: &sqlx::postgres::PgRow) -> Result<GoldenRun, RepositoryError> {
        let run_json: serde_json::Value = row
            .try_get("run_json")
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        serde_json::from_value(run_json).map_err(|e| RepositoryError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl GoldenRunRepository for PostgresGoldenRunRepository {
    async fn append(&self, run: &GoldenRun) -> Result<(), RepositoryError> {
        let run_json = serde_json::to_value(run)?;

        let result = sqlx::query(
            r#"
            INSERT INTO golden_runs (id, dataset_id, mode, status, audited, started_at, finished_at, run_json)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(run.id.0)
        .bind(&run.dataset_id)
        .bind(run.mode.as_str())
        .bind(run.status.as_str())
        .bind(run.audited)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(&run_json)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to append golden run: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Immutable(format!("golden run {} already recorded", run.id)));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: RunId) -> Result<Option<GoldenRun>, RepositoryError> {
        let row = sqlx::query("SELECT run_json FROM golden_runs WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn latest(&self) -> Result<Option<GoldenRun>, RepositoryError> {
        let row = sqlx::query("SELECT run_json FROM golden_runs ORDER BY started_at DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<GoldenRun>, RepositoryError> {
        let rows = sqlx::query("SELECT run_json FROM golden_runs ORDER BY started_at DESC LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::decode).collect()
    }
}
