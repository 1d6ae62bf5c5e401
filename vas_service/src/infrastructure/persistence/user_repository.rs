use async_trait::async_trait;
use common::Kobo;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::User;
use crate::domain::error::LedgerError;
use crate::domain::repository::UserStore;
use crate::domain::types::UserId;
use crate::infrastructure::persistence::models::UserModel;

/// Repositorio de Usuarios basado en PostgreSQL.
///
/// El core lee usuarios para decisiones de precio (premium) y resolución de
/// webhooks, y solo escribe las banderas que le pertenecen: primer
/// depósito, créditos FiCore y saldo retirable del referente.
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn find(&self, user_id: UserId) -> Result<Option<User>, LedgerError> {
        let model = sqlx::query_as::<_, UserModel>(
            r#"
            SELECT * FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        Ok(model.map(Into::into))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, LedgerError> {
        let model = sqlx::query_as::<_, UserModel>(
            r#"
            SELECT * FROM users
            WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        Ok(model.map(Into::into))
    }

    async fn mark_first_deposit(&self, user_id: UserId) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            UPDATE users
            SET first_deposit_completed = TRUE,
                first_deposit_at = NOW()
            WHERE id = $1 AND first_deposit_completed = FALSE
            "#,
        )
        .bind(user_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn grant_ficore_credits(
        &self,
        user_id: UserId,
        amount: Decimal,
        description: &str,
    ) -> Result<(), LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::Repository(e.to_string()))?;

        let balance: Option<(Decimal,)> = sqlx::query_as(
            r#"
            UPDATE users
            SET ficore_credit_balance = ficore_credit_balance + $1
            WHERE id = $2
            RETURNING ficore_credit_balance
            "#,
        )
        .bind(amount)
        .bind(user_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        let Some((balance_after,)) = balance else {
            return Err(LedgerError::Repository(format!(
                "user {} not found for credit grant",
                user_id
            )));
        };

        sqlx::query(
            r#"
            INSERT INTO credit_transactions (
                id, user_id, direction, amount, description, operation,
                balance_before, balance_after, created_at
            )
            VALUES ($1, $2, 'credit', $3, $4, 'referral_bonus', $5, $6, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id.0)
        .bind(amount)
        .bind(description)
        .bind(balance_after - amount)
        .bind(balance_after)
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| LedgerError::Repository(e.to_string()))
    }

    async fn increment_withdrawable(
        &self,
        user_id: UserId,
        amount: Kobo,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            UPDATE users
            SET withdrawable_balance = withdrawable_balance + $1
            WHERE id = $2
            "#,
        )
        .bind(amount.0)
        .bind(user_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn increment_referral_count(&self, user_id: UserId) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            UPDATE users
            SET referral_count = referral_count + 1
            WHERE id = $1
            "#,
        )
        .bind(user_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Repository(e.to_string()))?;
        Ok(())
    }
}
