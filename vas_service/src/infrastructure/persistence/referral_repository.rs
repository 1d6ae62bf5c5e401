use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::{Referral, ReferralPayout};
use crate::domain::error::LedgerError;
use crate::domain::repository::ReferralStore;
use crate::domain::types::UserId;
use crate::infrastructure::persistence::models::ReferralModel;

/// Puerto de referidos sobre PostgreSQL.
pub struct PostgresReferralStore {
    pool: PgPool,
}

impl PostgresReferralStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReferralStore for PostgresReferralStore {
    async fn find_for_referee(&self, referee: UserId) -> Result<Option<Referral>, LedgerError> {
        let model = sqlx::query_as::<_, ReferralModel>(
            r#"
            SELECT * FROM referrals
            WHERE referee_id = $1
            "#,
        )
        .bind(referee.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        Ok(model.map(Into::into))
    }

    async fn find_active_share(
        &self,
        referee: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<Referral>, LedgerError> {
        let model = sqlx::query_as::<_, ReferralModel>(
            r#"
            SELECT * FROM referrals
            WHERE referee_id = $1
              AND vas_share_active = TRUE
              AND vas_share_expires_at >= $2
            "#,
        )
        .bind(referee.0)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        Ok(model.map(Into::into))
    }

    async fn activate(
        &self,
        referral_id: Uuid,
        share_expires_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            UPDATE referrals
            SET status = 'active',
                deposit_bonus_granted = TRUE,
                vas_share_active = TRUE,
                vas_share_expires_at = $1,
                first_deposit_at = NOW(),
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(share_expires_at)
        .bind(referral_id)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn record_payout(&self, payout: ReferralPayout) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO referral_payouts (
                id, referrer_id, referee_id, referral_id, payout_type,
                amount, status, source_transaction, metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (source_transaction, payout_type) DO NOTHING
            "#,
        )
        .bind(payout.id)
        .bind(payout.referrer_id.0)
        .bind(payout.referee_id.0)
        .bind(payout.referral_id)
        .bind(&payout.payout_type)
        .bind(payout.amount.0)
        .bind(&payout.status)
        .bind(payout.source_transaction.0)
        .bind(&payout.metadata)
        .bind(payout.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;
        Ok(())
    }
}
