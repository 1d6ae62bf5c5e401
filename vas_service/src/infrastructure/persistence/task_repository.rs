use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::{TaskKind, TransactionTask};
use crate::domain::error::TaskError;
use crate::domain::repository::TaskQueue;
use crate::domain::types::{TaskId, TransactionId, UserId};
use crate::infrastructure::persistence::models::TransactionTaskModel;

/// Cola durable de tareas de liquidación sobre PostgreSQL.
///
/// El reclamo usa `FOR UPDATE SKIP LOCKED` para que a lo sumo un worker
/// tome cada tarea; el lease acota cuánto puede retenerla un worker caído.
pub struct PostgresTaskQueue {
    pool: PgPool,
}

impl PostgresTaskQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskQueue for PostgresTaskQueue {
    async fn enqueue(
        &self,
        kind: TaskKind,
        transaction_id: TransactionId,
        payload: serde_json::Value,
    ) -> Result<TaskId, TaskError> {
        // Encolado idempotente por transacción: en colisión el DO UPDATE
        // no cambia nada pero deja que RETURNING devuelva el id de la
        // tarea ya existente, nunca un id que no apunta a ninguna fila.
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO transaction_tasks (
                id, kind, transaction_id, payload, status, attempts,
                next_run_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, 'PENDING', 0, NOW(), NOW(), NOW())
            ON CONFLICT (transaction_id) DO UPDATE
                SET transaction_id = EXCLUDED.transaction_id
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(kind)
        .bind(transaction_id.0)
        .bind(&payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| TaskError::Repository(e.to_string()))?;

        Ok(TaskId(id))
    }

    async fn claim_next(&self, lease_seconds: i64) -> Result<Option<TransactionTask>, TaskError> {
        let model = sqlx::query_as::<_, TransactionTaskModel>(
            r#"
            UPDATE transaction_tasks
            SET status = 'PROCESSING',
                lease_expires_at = NOW() + make_interval(secs => $1::double precision),
                updated_at = NOW()
            WHERE id = (
                SELECT id FROM transaction_tasks
                WHERE status = 'PENDING' AND next_run_at <= NOW()
                ORDER BY next_run_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(lease_seconds as f64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TaskError::Repository(e.to_string()))?;

        Ok(model.map(Into::into))
    }

    async fn complete(&self, task_id: TaskId) -> Result<(), TaskError> {
        sqlx::query(
            r#"
            UPDATE transaction_tasks
            SET status = 'DONE',
                lease_expires_at = NULL,
                last_error = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(task_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| TaskError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn retry_later(
        &self,
        task_id: TaskId,
        attempts: i32,
        error: &str,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), TaskError> {
        sqlx::query(
            r#"
            UPDATE transaction_tasks
            SET status = 'PENDING',
                attempts = $1,
                last_error = $2,
                lease_expires_at = NULL,
                next_run_at = $3,
                updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(attempts)
        .bind(error)
        .bind(next_run_at)
        .bind(task_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| TaskError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn fail(&self, task_id: TaskId, error: &str) -> Result<(), TaskError> {
        sqlx::query(
            r#"
            UPDATE transaction_tasks
            SET status = 'FAILED',
                last_error = $1,
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(error)
        .bind(task_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| TaskError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn release_expired_leases(&self) -> Result<u64, TaskError> {
        let result = sqlx::query(
            r#"
            UPDATE transaction_tasks
            SET status = 'PENDING',
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE status = 'PROCESSING' AND lease_expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| TaskError::Repository(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn pending_for_user(&self, user_id: UserId) -> Result<Vec<TransactionTask>, TaskError> {
        let models = sqlx::query_as::<_, TransactionTaskModel>(
            r#"
            SELECT t.* FROM transaction_tasks t
            JOIN vas_transactions v ON v.id = t.transaction_id
            WHERE v.user_id = $1 AND t.status IN ('PENDING', 'PROCESSING')
            ORDER BY t.created_at DESC
            "#,
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TaskError::Repository(e.to_string()))?;

        Ok(models.into_iter().map(Into::into).collect())
    }
}
