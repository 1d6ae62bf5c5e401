use async_trait::async_trait;
use common::Kobo;
use sqlx::PgPool;

use crate::domain::entities::{
    UnmatchedFunding, VasTransaction, VasTransactionStatus, VasTransactionType, IN_PROGRESS_REASON,
};
use crate::domain::error::LedgerError;
use crate::domain::repository::{
    EconomicsFields, FundingInsert, SuccessFields, TransactionLedger,
};
use crate::domain::types::{TransactionId, UserId};
use crate::infrastructure::persistence::models::VasTransactionModel;

/// Ledger de transacciones VAS sobre PostgreSQL.
///
/// Los índices únicos sobre `transaction_reference` y `(user_id,
/// request_id)` hacen cumplir la idempotencia en la capa de almacenamiento;
/// el código de arriba solo interpreta las colisiones.
pub struct PostgresTransactionLedger {
    pool: PgPool,
}

impl PostgresTransactionLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, tx: &VasTransaction) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO vas_transactions (
                id, user_id, tx_type, subtype, network, phone_number,
                data_plan_id, data_plan_name, amount, selling_price, total_amount,
                status, failure_reason, provider, request_id, transaction_reference,
                provider_cost, provider_commission, provider_commission_rate,
                gateway_fee, net_margin, is_premium_user, needs_reconciliation,
                settlement_failed, emergency_pricing, provider_confirmed,
                metadata, created_at, completed_at, expires_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30
            )
            "#,
        )
        .bind(tx.id.0)
        .bind(tx.user_id.0)
        .bind(tx.tx_type)
        .bind(&tx.subtype)
        .bind(&tx.network)
        .bind(&tx.phone_number)
        .bind(&tx.data_plan_id)
        .bind(&tx.data_plan_name)
        .bind(tx.amount.0)
        .bind(tx.selling_price.0)
        .bind(tx.total_amount.0)
        .bind(tx.status)
        .bind(&tx.failure_reason)
        .bind(tx.provider)
        .bind(&tx.request_id)
        .bind(&tx.transaction_reference)
        .bind(tx.provider_cost.map(|k| k.0))
        .bind(tx.provider_commission.map(|k| k.0))
        .bind(tx.provider_commission_rate)
        .bind(tx.gateway_fee.0)
        .bind(tx.net_margin.map(|k| k.0))
        .bind(tx.is_premium_user)
        .bind(tx.needs_reconciliation)
        .bind(tx.settlement_failed)
        .bind(tx.emergency_pricing)
        .bind(tx.provider_confirmed)
        .bind(&tx.metadata)
        .bind(tx.created_at)
        .bind(tx.completed_at)
        .bind(tx.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}

#[async_trait]
impl TransactionLedger for PostgresTransactionLedger {
    async fn create_in_progress(&self, tx: VasTransaction) -> Result<TransactionId, LedgerError> {
        self.insert(&tx).await.map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::DuplicateReference(tx.transaction_reference.clone())
            } else {
                LedgerError::Repository(e.to_string())
            }
        })?;
        Ok(tx.id)
    }

    async fn mark_success(
        &self,
        id: TransactionId,
        fields: SuccessFields,
    ) -> Result<(), LedgerError> {
        // Solo el centinela FAILED/"in-progress" o PENDING puede promoverse:
        // los estados terminales son inmutables por contrato.
        let result = sqlx::query(
            r#"
            UPDATE vas_transactions
            SET status = 'SUCCESS',
                failure_reason = NULL,
                provider = $1,
                subtype = COALESCE($2, subtype),
                metadata = $3,
                completed_at = NOW()
            WHERE id = $4
              AND (
                    (status = 'FAILED' AND failure_reason = $5)
                    OR status = 'PENDING'
                  )
            "#,
        )
        .bind(fields.provider)
        .bind(&fields.delivered_product_name)
        .bind(&fields.metadata)
        .bind(id.0)
        .bind(IN_PROGRESS_REASON)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        if result.rows_affected() == 0 {
            // Distinguir "no existe" de "ya terminal".
            let current = self.find_by_id(id).await?;
            return match current {
                None => Err(LedgerError::NotFound(id)),
                Some(row) if row.status == VasTransactionStatus::SUCCESS => Ok(()),
                Some(_) => Err(LedgerError::TerminalState(id)),
            };
        }
        Ok(())
    }

    async fn mark_failed(&self, id: TransactionId, reason: &str) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE vas_transactions
            SET status = 'FAILED',
                failure_reason = $1,
                completed_at = NOW()
            WHERE id = $2
              AND (
                    (status = 'FAILED' AND failure_reason = $3)
                    OR status = 'PENDING'
                  )
            "#,
        )
        .bind(reason)
        .bind(id.0)
        .bind(IN_PROGRESS_REASON)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        if result.rows_affected() == 0 {
            let current = self.find_by_id(id).await?;
            return match current {
                None => Err(LedgerError::NotFound(id)),
                Some(_) => Err(LedgerError::TerminalState(id)),
            };
        }
        Ok(())
    }

    async fn update_economics(
        &self,
        id: TransactionId,
        economics: EconomicsFields,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            UPDATE vas_transactions
            SET provider_cost = $1,
                provider_commission = $2,
                provider_commission_rate = $3,
                gateway_fee = $4,
                net_margin = $5,
                emergency_pricing = $6
            WHERE id = $7
            "#,
        )
        .bind(economics.provider_cost.0)
        .bind(economics.provider_commission.0)
        .bind(economics.provider_commission_rate)
        .bind(economics.gateway_fee.0)
        .bind(economics.net_margin.0)
        .bind(economics.emergency_pricing)
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn set_needs_reconciliation(&self, id: TransactionId) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            UPDATE vas_transactions
            SET needs_reconciliation = TRUE
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn set_settlement_failed(&self, id: TransactionId) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            UPDATE vas_transactions
            SET settlement_failed = TRUE
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn insert_funding(&self, tx: VasTransaction) -> Result<FundingInsert, LedgerError> {
        match self.insert(&tx).await {
            Ok(()) => Ok(FundingInsert::Inserted(tx.id)),
            Err(e) if is_unique_violation(&e) => Ok(FundingInsert::AlreadyProcessed),
            Err(e) => Err(LedgerError::Repository(e.to_string())),
        }
    }

    async fn confirm_provider_webhook(
        &self,
        reference: &str,
        metadata: serde_json::Value,
    ) -> Result<Option<VasTransaction>, LedgerError> {
        let existing = sqlx::query_as::<_, VasTransactionModel>(
            r#"
            SELECT * FROM vas_transactions
            WHERE (request_id = $1 OR transaction_reference = $1)
              AND tx_type IN ('AIRTIME', 'DATA')
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        let Some(existing) = existing else {
            return Ok(None);
        };

        // PENDING se promueve; los demás estados solo registran la
        // confirmación. Nunca se crea una fila nueva desde un webhook VAS.
        sqlx::query(
            r#"
            UPDATE vas_transactions
            SET provider_confirmed = TRUE,
                metadata = COALESCE(metadata, '{}'::jsonb) || jsonb_build_object('webhook', $1::jsonb),
                status = CASE WHEN status = 'PENDING' THEN 'SUCCESS'::vas_transaction_status ELSE status END,
                completed_at = CASE WHEN status = 'PENDING' THEN NOW() ELSE completed_at END
            WHERE id = $2
            "#,
        )
        .bind(&metadata)
        .bind(existing.id)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        Ok(Some(existing.into()))
    }

    async fn find_by_id(&self, id: TransactionId) -> Result<Option<VasTransaction>, LedgerError> {
        let model = sqlx::query_as::<_, VasTransactionModel>(
            r#"
            SELECT * FROM vas_transactions
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        Ok(model.map(Into::into))
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<VasTransaction>, LedgerError> {
        let model = sqlx::query_as::<_, VasTransactionModel>(
            r#"
            SELECT * FROM vas_transactions
            WHERE transaction_reference = $1 OR request_id = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        Ok(model.map(Into::into))
    }

    async fn find_recent_success(
        &self,
        user_id: UserId,
        tx_type: VasTransactionType,
        amount: Kobo,
        phone_number: &str,
        window_minutes: i64,
    ) -> Result<Option<VasTransaction>, LedgerError> {
        let model = sqlx::query_as::<_, VasTransactionModel>(
            r#"
            SELECT * FROM vas_transactions
            WHERE user_id = $1
              AND tx_type = $2
              AND amount = $3
              AND phone_number = $4
              AND status IN ('SUCCESS', 'NEEDS_RECONCILIATION')
              AND created_at >= NOW() - make_interval(mins => $5::int)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id.0)
        .bind(tx_type)
        .bind(amount.0)
        .bind(phone_number)
        .bind(window_minutes)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        Ok(model.map(Into::into))
    }

    async fn find_in_flight(
        &self,
        user_id: UserId,
        tx_type: VasTransactionType,
        amount: Kobo,
        phone_number: &str,
        window_minutes: i64,
    ) -> Result<Option<VasTransaction>, LedgerError> {
        let model = sqlx::query_as::<_, VasTransactionModel>(
            r#"
            SELECT * FROM vas_transactions
            WHERE user_id = $1
              AND tx_type = $2
              AND amount = $3
              AND phone_number = $4
              AND (
                    status = 'PENDING'
                    OR (status = 'FAILED' AND failure_reason = $5)
                  )
              AND created_at >= NOW() - make_interval(mins => $6::int)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id.0)
        .bind(tx_type)
        .bind(amount.0)
        .bind(phone_number)
        .bind(IN_PROGRESS_REASON)
        .bind(window_minutes)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        Ok(model.map(Into::into))
    }

    async fn promote_funding(
        &self,
        id: TransactionId,
        amount_paid: Kobo,
        metadata: serde_json::Value,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE vas_transactions
            SET status = 'SUCCESS',
                total_amount = $1,
                metadata = $2,
                failure_reason = NULL,
                completed_at = NOW()
            WHERE id = $3 AND status <> 'SUCCESS'
            "#,
        )
        .bind(amount_paid.0)
        .bind(&metadata)
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        if result.rows_affected() == 0 {
            // Ya era SUCCESS: repetición inofensiva.
            return Ok(());
        }
        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<VasTransaction>, i64), LedgerError> {
        let models = sqlx::query_as::<_, VasTransactionModel>(
            r#"
            SELECT * FROM vas_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(user_id.0)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM vas_transactions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        Ok((models.into_iter().map(Into::into).collect(), total))
    }

    async fn statuses_for_references(
        &self,
        user_id: UserId,
        references: Vec<String>,
    ) -> Result<Vec<(String, Option<VasTransactionStatus>)>, LedgerError> {
        let mut results = Vec::with_capacity(references.len());

        let rows: Vec<(String, VasTransactionStatus)> = sqlx::query_as(
            r#"
            SELECT transaction_reference, status FROM vas_transactions
            WHERE user_id = $1 AND transaction_reference = ANY($2)
            "#,
        )
        .bind(user_id.0)
        .bind(&references)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        for reference in references {
            let found = rows
                .iter()
                .find(|(r, _)| *r == reference)
                .map(|(_, status)| *status);
            results.push((reference, found));
        }

        Ok(results)
    }

    async fn find_pending_kyc(
        &self,
        reference: &str,
    ) -> Result<Option<VasTransaction>, LedgerError> {
        let model = sqlx::query_as::<_, VasTransactionModel>(
            r#"
            SELECT * FROM vas_transactions
            WHERE (transaction_reference = $1 OR request_id = $1)
              AND tx_type = 'KYC_VERIFICATION'
              AND status = 'PENDING'
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        Ok(model.map(Into::into))
    }

    async fn record_unmatched_funding(&self, event: UnmatchedFunding) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO unmatched_webhooks (id, transaction_reference, amount_paid, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (transaction_reference) DO NOTHING
            "#,
        )
        .bind(event.id)
        .bind(&event.transaction_reference)
        .bind(event.amount_paid.0)
        .bind(&event.payload)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;
        Ok(())
    }
}
