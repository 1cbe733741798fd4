// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::repository::{RepositoryError, WorkflowRepository};
use crate::domain::workflow::{Workflow, WorkflowId, WorkflowStatus};

pub struct PostgresWorkflowRepository {
    pool: PgPool,
}

impl PostgresWorkflowRepository {
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode(row: &sqlx::postgres::PgRow) -> Result<Workflow, RepositoryError> {
        let domain_json: serde_json::Value = row
            .try_get("domain_json")
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        serde_json::from_value(domain_json).map_err(|e| RepositoryError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl WorkflowRepository for PostgresWorkflowRepository {
    async fn save(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let domain_json = serde_json::to_value(workflow)?;

        // Terminal rows are frozen: the update arm only fires for live rows.
        let result = sqlx::query(
            r#"
            INSERT INTO workflows (id, workflow_type, status, created_at, updated_at, domain_json)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at,
                domain_json = EXCLUDED.domain_json
            WHERE workflows.status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(workflow.id.as_str())
        .bind(workflow.workflow_type.as_str())
        .bind(workflow.status().as_str())
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .bind(&domain_json)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save workflow: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Immutable(format!(
                "workflow {} is already terminal",
                workflow.id
            )));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT domain_json
            FROM workflows
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn list_page(
        &self,
        status: Option<WorkflowStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Workflow>, usize), RepositoryError> {
        let status = status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM workflows
            WHERE ($1::TEXT IS NULL OR status = $1)
            "#,
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(
            r#"
            SELECT domain_json
            FROM workflows
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let workflows = rows.iter().map(Self::decode).collect::<Result<Vec<_>, _>>()?;
        Ok((workflows, total.max(0) as usize))
    }
}
