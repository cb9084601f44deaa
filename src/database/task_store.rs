//! Postgres-backed `TaskStore`.
//!
//! Aggregate fields live on `crawl_tasks`; each settled branch is one row in
//! `crawl_task_branch_results`, so concurrent branches upsert independent
//! rows instead of rewriting the task.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{BranchResult, Task, TaskFilter};
use crate::registry::{StatusUpdate, TaskStore};
use crate::state_machine::TaskState;

const TASK_COLUMNS: &str = "task_id, platforms, execution_mode, account_strategy, status, \
     progress, params, message, created_at, started_at, completed_at, updated_at";

#[derive(Debug, FromRow)]
struct TaskRow {
    task_id: Uuid,
    platforms: Vec<String>,
    execution_mode: String,
    account_strategy: String,
    status: String,
    progress: i16,
    params: serde_json::Value,
    message: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct BranchRow {
    task_id: Uuid,
    result: serde_json::Value,
}

fn parse<T: std::str::FromStr<Err = String>>(value: &str) -> Result<T, StoreError> {
    value
        .parse()
        .map_err(|e: String| StoreError::corrupt("crawl_tasks", e))
}

impl TaskRow {
    fn into_task(self, branches: Vec<BranchResult>) -> Result<Task, StoreError> {
        let progress = u8::try_from(self.progress).map_err(|_| {
            StoreError::corrupt("crawl_tasks", format!("progress {} out of range", self.progress))
        })?;

        let mut task = Task {
            task_id: self.task_id,
            platforms: self.platforms,
            execution_mode: parse(&self.execution_mode)?,
            account_strategy: parse(&self.account_strategy)?,
            status: parse(&self.status)?,
            progress,
            platform_results: BTreeMap::new(),
            platform_errors: BTreeMap::new(),
            branch_results: BTreeMap::new(),
            params: self.params,
            message: self.message,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            updated_at: self.updated_at,
        };
        let updated_at = task.updated_at;
        for branch in branches {
            task.apply_branch_result(branch);
        }
        task.updated_at = updated_at;
        Ok(task)
    }
}

#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn branches_for(&self, task_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<BranchResult>>, StoreError> {
        let rows = sqlx::query_as::<_, BranchRow>(
            r#"
            SELECT task_id, result
            FROM crawl_task_branch_results
            WHERE task_id = ANY($1)
            ORDER BY settled_at
            "#,
        )
        .bind(task_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<BranchResult>> = HashMap::new();
        for row in rows {
            let result: BranchResult = serde_json::from_value(row.result)?;
            grouped.entry(row.task_id).or_default().push(result);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn insert(&self, task: &Task) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO crawl_tasks (
                task_id, platforms, execution_mode, account_strategy, status,
                progress, params, message, created_at, started_at, completed_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(task.task_id)
        .bind(&task.platforms)
        .bind(task.execution_mode.to_string())
        .bind(task.account_strategy.to_string())
        .bind(task.status.to_string())
        .bind(task.progress as i16)
        .bind(&task.params)
        .bind(&task.message)
        .bind(task.created_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        let query = format!("SELECT {TASK_COLUMNS} FROM crawl_tasks WHERE task_id = $1");
        let Some(row) = sqlx::query_as::<_, TaskRow>(&query)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let branches = self
            .branches_for(&[task_id])
            .await?
            .remove(&task_id)
            .unwrap_or_default();
        row.into_task(branches).map(Some)
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let query = format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM crawl_tasks
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR $2 = ANY(platforms))
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        );
        let rows = sqlx::query_as::<_, TaskRow>(&query)
            .bind(filter.status.map(|s| s.to_string()))
            .bind(filter.platform.as_deref())
            .bind(filter.effective_limit() as i64)
            .bind(filter.effective_offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.task_id).collect();
        let mut branches = self.branches_for(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let task_branches = branches.remove(&row.task_id).unwrap_or_default();
                row.into_task(task_branches)
            })
            .collect()
    }

    async fn delete(&self, task_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM crawl_tasks WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_status(&self, task_id: Uuid, update: &StatusUpdate) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE crawl_tasks
            SET status = $2,
                progress = $3,
                started_at = $4,
                completed_at = $5,
                message = $6,
                updated_at = $7
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .bind(update.status.to_string())
        .bind(update.progress as i16)
        .bind(update.started_at)
        .bind(update.completed_at)
        .bind(&update.message)
        .bind(update.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("task", task_id));
        }
        Ok(())
    }

    async fn record_branch_result(
        &self,
        task_id: Uuid,
        result: &BranchResult,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query("UPDATE crawl_tasks SET updated_at = NOW() WHERE task_id = $1")
            .bind(task_id)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(StoreError::not_found("task", task_id));
        }

        sqlx::query(
            r#"
            INSERT INTO crawl_task_branch_results (task_id, platform, status, item_count, result, settled_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (task_id, platform) DO UPDATE
            SET status = EXCLUDED.status,
                item_count = EXCLUDED.item_count,
                result = EXCLUDED.result,
                settled_at = EXCLUDED.settled_at
            "#,
        )
        .bind(task_id)
        .bind(&result.platform)
        .bind(result.status.to_string())
        .bind(result.item_count as i32)
        .bind(serde_json::to_value(result)?)
        .bind(result.settled_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn counts_by_status(&self) -> Result<BTreeMap<TaskState, u64>, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM crawl_tasks GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(status, count)| -> Result<(TaskState, u64), StoreError> {
                Ok((parse(&status)?, count.max(0) as u64))
            })
            .collect()
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let terminal: Vec<String> = TaskState::ALL
            .iter()
            .filter(|s| s.is_terminal())
            .map(|s| s.to_string())
            .collect();

        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            DELETE FROM crawl_tasks
            WHERE status = ANY($1)
              AND COALESCE(completed_at, updated_at) < $2
            RETURNING task_id
            "#,
        )
        .bind(&terminal)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}
