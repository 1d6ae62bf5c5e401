use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::entities::{AdminAction, Notification, PlanMismatchLog};
use crate::domain::error::LedgerError;
use crate::domain::repository::{AdminAuditLog, MismatchLog, NotificationSender};

/// Bitácora de divergencias de plan entregado.
pub struct PostgresMismatchLog {
    pool: PgPool,
}

impl PostgresMismatchLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MismatchLog for PostgresMismatchLog {
    async fn record(&self, entry: PlanMismatchLog) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO plan_mismatch_logs (
                id, user_id, transaction_id, provider, requested_plan_id,
                requested_plan_name, requested_amount, delivered_plan,
                delivered_amount, severity, refund_eligible, user_notified, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (transaction_id) DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id.0)
        .bind(entry.transaction_id.0)
        .bind(entry.provider)
        .bind(&entry.requested_plan_id)
        .bind(&entry.requested_plan_name)
        .bind(entry.requested_amount.0)
        .bind(&entry.delivered_plan)
        .bind(entry.delivered_amount.map(|k| k.0))
        .bind(&entry.severity)
        .bind(entry.refund_eligible)
        .bind(entry.user_notified)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;
        Ok(())
    }
}

/// Notificaciones persistidas (usuario y operadores).
pub struct PostgresNotificationSender {
    pool: PgPool,
}

impl PostgresNotificationSender {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSender for PostgresNotificationSender {
    async fn notify(&self, notification: Notification) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, user_id, category, title, body, related_reference, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id.map(|u| u.0))
        .bind(&notification.category)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(&notification.related_reference)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;
        Ok(())
    }
}

/// Auditoría de acciones administrativas.
pub struct PostgresAdminAuditLog {
    pool: PgPool,
}

impl PostgresAdminAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdminAuditLog for PostgresAdminAuditLog {
    async fn record(&self, action: AdminAction) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO admin_actions (id, admin_id, action, target_user, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(action.id)
        .bind(action.admin_id.0)
        .bind(&action.action)
        .bind(action.target_user.0)
        .bind(&action.details)
        .bind(action.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;
        Ok(())
    }
}
