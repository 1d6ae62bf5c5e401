use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::{CorporateRevenueEntry, ExpenseEvent};
use crate::domain::error::LedgerError;
use crate::domain::gateways::LedgerEventSink;
use crate::domain::repository::RevenueLedger;

/// Contabilidad corporativa sobre PostgreSQL.
pub struct PostgresRevenueLedger {
    pool: PgPool,
}

impl PostgresRevenueLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevenueLedger for PostgresRevenueLedger {
    async fn record(&self, entry: CorporateRevenueEntry) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO corporate_revenue (
                id, entry_type, category, amount, user_id, related_transaction,
                description, gateway_fee, net_revenue, status, metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'RECORDED', $10, $11)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.entry_type)
        .bind(&entry.category)
        .bind(entry.amount.0)
        .bind(entry.user_id.map(|u| u.0))
        .bind(&entry.related_transaction)
        .bind(&entry.description)
        .bind(entry.gateway_fee.map(|k| k.0))
        .bind(entry.net_revenue.map(|k| k.0))
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;
        Ok(())
    }
}

/// Sumidero hacia el módulo contable externo. La tabla `business_expenses`
/// es la bandeja de entrada de ese módulo: el core solo inserta eventos.
pub struct PostgresLedgerEventSink {
    pool: PgPool,
}

impl PostgresLedgerEventSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerEventSink for PostgresLedgerEventSink {
    async fn record_expense(&self, event: ExpenseEvent) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO business_expenses (id, user_id, amount, description, reference, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (reference) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.user_id.0)
        .bind(event.amount.0)
        .bind(&event.description)
        .bind(&event.reference)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;
        Ok(())
    }
}
