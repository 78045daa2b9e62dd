use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::BoxError;
use crate::models::{SyncTask, SyncType, TaskStatus};
use crate::store::{TaskStatusCounts, TaskStore};

use super::PgStore;

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    order_id: String,
    connection_id: String,
    sync_type: String,
    status: String,
    attempts: i32,
    max_attempts: i32,
    scheduled_at: i64,
    error_message: Option<String>,
    payload: Option<Value>,
    created_at: i64,
    processed_at: Option<i64>,
}

impl TaskRow {
    fn into_model(self) -> Result<SyncTask, BoxError> {
        Ok(SyncTask {
            sync_type: SyncType::from_db(&self.sync_type)
                .ok_or_else(|| format!("unknown sync type: {}", self.sync_type))?,
            status: TaskStatus::from_db(&self.status)
                .ok_or_else(|| format!("unknown task status: {}", self.status))?,
            id: self.id,
            order_id: self.order_id,
            connection_id: self.connection_id,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            scheduled_at: self.scheduled_at,
            error_message: self.error_message,
            payload: self.payload,
            created_at: self.created_at,
            processed_at: self.processed_at,
        })
    }
}

const SELECT: &str = "SELECT id, order_id, connection_id, sync_type, status, attempts,
        max_attempts, scheduled_at, error_message, payload, created_at, processed_at
     FROM sync_tasks";

pub async fn insert(pool: &PgPool, task: &SyncTask) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO sync_tasks (id, order_id, connection_id, sync_type, status,
            attempts, max_attempts, scheduled_at, error_message, payload,
            created_at, processed_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(&task.id)
    .bind(&task.order_id)
    .bind(&task.connection_id)
    .bind(task.sync_type.as_db())
    .bind(task.status.as_db())
    .bind(task.attempts)
    .bind(task.max_attempts)
    .bind(task.scheduled_at)
    .bind(&task.error_message)
    .bind(&task.payload)
    .bind(task.created_at)
    .bind(task.processed_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get(pool: &PgPool, id: &str) -> Result<Option<SyncTask>, BoxError> {
    let row: Option<TaskRow> = sqlx::query_as(&format!("{SELECT} WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(TaskRow::into_model).transpose()
}

pub async fn due(pool: &PgPool, now: i64, limit: i64) -> Result<Vec<SyncTask>, BoxError> {
    let rows: Vec<TaskRow> = sqlx::query_as(&format!(
        "{SELECT} WHERE status = 'pending' AND scheduled_at <= $1
         ORDER BY scheduled_at ASC
         LIMIT $2"
    ))
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(TaskRow::into_model).collect()
}

/// State-machine guarded: only a pending task can enter processing. The row
/// count tells whether this caller won the claim against concurrent passes.
pub async fn mark_processing(pool: &PgPool, id: &str, attempts: i32) -> Result<bool, BoxError> {
    let result = sqlx::query(
        "UPDATE sync_tasks SET status = 'processing', attempts = $2
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .bind(attempts)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn complete(pool: &PgPool, id: &str, processed_at: i64) -> Result<(), BoxError> {
    sqlx::query(
        "UPDATE sync_tasks
         SET status = 'completed', processed_at = $2, error_message = NULL
         WHERE id = $1",
    )
    .bind(id)
    .bind(processed_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn reschedule(
    pool: &PgPool,
    id: &str,
    scheduled_at: i64,
    error_message: &str,
) -> Result<(), BoxError> {
    sqlx::query(
        "UPDATE sync_tasks
         SET status = 'pending', scheduled_at = $2, error_message = $3
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(scheduled_at)
    .bind(error_message)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fail(
    pool: &PgPool,
    id: &str,
    error_message: &str,
    processed_at: i64,
) -> Result<(), BoxError> {
    sqlx::query(
        "UPDATE sync_tasks
         SET status = 'failed', error_message = $2, processed_at = $3
         WHERE id = $1",
    )
    .bind(id)
    .bind(error_message)
    .bind(processed_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn status_counts(pool: &PgPool, since: i64) -> Result<TaskStatusCounts, BoxError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM sync_tasks WHERE created_at >= $1 GROUP BY status",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut counts = TaskStatusCounts::default();
    for (status, count) in rows {
        match status.as_str() {
            "pending" => counts.pending = count,
            "processing" => counts.processing = count,
            "completed" => counts.completed = count,
            "failed" => counts.failed = count,
            _ => {}
        }
    }
    Ok(counts)
}

#[async_trait]
impl TaskStore for PgStore {
    async fn insert(&self, task: &SyncTask) -> Result<(), BoxError> {
        insert(&self.pool, task).await
    }

    async fn get(&self, id: &str) -> Result<Option<SyncTask>, BoxError> {
        get(&self.pool, id).await
    }

    async fn due(&self, now: i64, limit: i64) -> Result<Vec<SyncTask>, BoxError> {
        due(&self.pool, now, limit).await
    }

    async fn mark_processing(&self, id: &str, attempts: i32) -> Result<bool, BoxError> {
        mark_processing(&self.pool, id, attempts).await
    }

    async fn complete(&self, id: &str, processed_at: i64) -> Result<(), BoxError> {
        complete(&self.pool, id, processed_at).await
    }

    async fn reschedule(
        &self,
        id: &str,
        scheduled_at: i64,
        error_message: &str,
    ) -> Result<(), BoxError> {
        reschedule(&self.pool, id, scheduled_at, error_message).await
    }

    async fn fail(
        &self,
        id: &str,
        error_message: &str,
        processed_at: i64,
    ) -> Result<(), BoxError> {
        fail(&self.pool, id, error_message, processed_at).await
    }

    async fn status_counts(&self, since: i64) -> Result<TaskStatusCounts, BoxError> {
        status_counts(&self.pool, since).await
    }
}
