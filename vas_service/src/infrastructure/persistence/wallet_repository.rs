use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Kobo;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::domain::entities::{
    BankAccount, HistoryDirection, Reservation, ReservationState, Wallet, WalletStatus,
};
use crate::domain::error::WalletError;
use crate::domain::repository::{BalanceChange, WalletStore};
use crate::domain::types::{ReservationId, TransactionId, UserId};
use crate::infrastructure::persistence::models::{ReservationModel, WalletModel};

/// Wallet Store sobre PostgreSQL.
///
/// Toda mutación monetaria pasa por aquí, en una transacción sqlx y
/// condicionada a la `version` leída (bloqueo optimista). La línea de
/// historial con referencia única es lo que vuelve idempotentes los
/// créditos y débitos.
pub struct PostgresWalletStore {
    pool: PgPool,
}

impl PostgresWalletStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_wallet(
        executor: impl sqlx::PgExecutor<'_>,
        user_id: UserId,
    ) -> Result<Option<Wallet>, WalletError> {
        let model = sqlx::query_as::<_, WalletModel>(
            r#"
            SELECT * FROM wallets
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.0)
        .fetch_optional(executor)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?;

        model.map(Wallet::try_from).transpose()
    }

    fn ensure_active(wallet: &Wallet) -> Result<(), WalletError> {
        if wallet.status == WalletStatus::Suspended {
            return Err(WalletError::Suspended(wallet.user_id));
        }
        Ok(())
    }

    /// Inserta la línea de historial dentro de la transacción dada. Devuelve
    /// `false` si la referencia ya existía (movimiento repetido).
    async fn append_history(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        wallet: &Wallet,
        direction: HistoryDirection,
        amount: Kobo,
        balance_after: Kobo,
        reference: &str,
        description: &str,
    ) -> Result<bool, WalletError> {
        let result = sqlx::query(
            r#"
            INSERT INTO wallet_history (
                id, wallet_id, user_id, direction, amount, balance_after,
                reference, description, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (reference) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(wallet.id.0)
        .bind(wallet.user_id.0)
        .bind(direction)
        .bind(amount.0)
        .bind(balance_after.0)
        .bind(reference)
        .bind(description)
        .execute(&mut **tx)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl WalletStore for PostgresWalletStore {
    async fn create(&self, wallet: Wallet) -> Result<Wallet, WalletError> {
        let accounts = serde_json::to_value(&wallet.accounts)
            .map_err(|e| WalletError::Repository(e.to_string()))?;

        let model = sqlx::query_as::<_, WalletModel>(
            r#"
            INSERT INTO wallets (
                id, user_id, balance, reserved_amount, account_reference, accounts,
                status, pin_hash, pin_salt, pin_attempts, pin_locked_until, version,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(wallet.id.0)
        .bind(wallet.user_id.0)
        .bind(wallet.balance.0)
        .bind(wallet.reserved_amount.0)
        .bind(&wallet.account_reference)
        .bind(accounts)
        .bind(wallet.status)
        .bind(&wallet.pin_hash)
        .bind(&wallet.pin_salt)
        .bind(wallet.pin_attempts)
        .bind(wallet.pin_locked_until)
        .bind(wallet.version)
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                WalletError::AlreadyExists(wallet.user_id)
            } else {
                WalletError::Repository(e.to_string())
            }
        })?;

        Wallet::try_from(model)
    }

    async fn find(&self, user_id: UserId) -> Result<Option<Wallet>, WalletError> {
        Self::fetch_wallet(&self.pool, user_id).await
    }

    async fn get(&self, user_id: UserId) -> Result<Wallet, WalletError> {
        Self::fetch_wallet(&self.pool, user_id)
            .await?
            .ok_or(WalletError::NotFound(user_id))
    }

    async fn credit_balance(
        &self,
        user_id: UserId,
        amount: Kobo,
        reference: &str,
        description: &str,
    ) -> Result<BalanceChange, WalletError> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount(format!(
                "credit amount must be positive, got {}",
                amount
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| WalletError::Repository(e.to_string()))?;

        let wallet = Self::fetch_wallet(&mut *tx, user_id)
            .await?
            .ok_or(WalletError::NotFound(user_id))?;
        Self::ensure_active(&wallet)?;

        let new_balance = wallet
            .balance
            .checked_add(amount)
            .map_err(|e| WalletError::Repository(e.to_string()))?;

        let inserted = Self::append_history(
            &mut tx,
            &wallet,
            HistoryDirection::CREDIT,
            amount,
            new_balance,
            reference,
            description,
        )
        .await?;

        if !inserted {
            // Referencia ya aplicada: no-op, se devuelve el saldo vigente.
            tx.rollback()
                .await
                .map_err(|e| WalletError::Repository(e.to_string()))?;
            return Ok(BalanceChange::AlreadyApplied {
                balance: wallet.balance,
            });
        }

        let updated = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = balance + $1,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $2 AND version = $3
            "#,
        )
        .bind(amount.0)
        .bind(wallet.id.0)
        .bind(wallet.version)
        .execute(&mut *tx)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?;

        if updated.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| WalletError::Repository(e.to_string()))?;
            return Err(WalletError::Conflict);
        }

        tx.commit()
            .await
            .map_err(|e| WalletError::Repository(e.to_string()))?;

        Ok(BalanceChange::Applied { new_balance })
    }

    async fn debit_balance(
        &self,
        user_id: UserId,
        amount: Kobo,
        reference: &str,
        description: &str,
    ) -> Result<BalanceChange, WalletError> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount(format!(
                "debit amount must be positive, got {}",
                amount
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| WalletError::Repository(e.to_string()))?;

        let wallet = Self::fetch_wallet(&mut *tx, user_id)
            .await?
            .ok_or(WalletError::NotFound(user_id))?;
        Self::ensure_active(&wallet)?;

        if wallet.available_balance() < amount {
            return Err(WalletError::InsufficientFunds {
                required: amount,
                available: wallet.available_balance(),
            });
        }

        let new_balance = wallet.balance - amount;

        let inserted = Self::append_history(
            &mut tx,
            &wallet,
            HistoryDirection::DEBIT,
            amount,
            new_balance,
            reference,
            description,
        )
        .await?;

        if !inserted {
            tx.rollback()
                .await
                .map_err(|e| WalletError::Repository(e.to_string()))?;
            return Ok(BalanceChange::AlreadyApplied {
                balance: wallet.balance,
            });
        }

        let updated = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = balance - $1,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $2 AND version = $3 AND balance - reserved_amount >= $1
            "#,
        )
        .bind(amount.0)
        .bind(wallet.id.0)
        .bind(wallet.version)
        .execute(&mut *tx)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?;

        if updated.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| WalletError::Repository(e.to_string()))?;
            return Err(WalletError::Conflict);
        }

        tx.commit()
            .await
            .map_err(|e| WalletError::Repository(e.to_string()))?;

        Ok(BalanceChange::Applied { new_balance })
    }

    async fn reserve(
        &self,
        user_id: UserId,
        amount: Kobo,
        transaction_id: TransactionId,
    ) -> Result<ReservationId, WalletError> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount(format!(
                "reservation amount must be positive, got {}",
                amount
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| WalletError::Repository(e.to_string()))?;

        let wallet = Self::fetch_wallet(&mut *tx, user_id)
            .await?
            .ok_or(WalletError::NotFound(user_id))?;
        Self::ensure_active(&wallet)?;

        if wallet.available_balance() < amount {
            return Err(WalletError::InsufficientFunds {
                required: amount,
                available: wallet.available_balance(),
            });
        }

        let reservation_id = ReservationId::new();
        sqlx::query(
            r#"
            INSERT INTO reservations (id, user_id, amount, transaction_id, state, created_at)
            VALUES ($1, $2, $3, $4, 'HELD', NOW())
            "#,
        )
        .bind(reservation_id.0)
        .bind(user_id.0)
        .bind(amount.0)
        .bind(transaction_id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?;

        let updated = sqlx::query(
            r#"
            UPDATE wallets
            SET reserved_amount = reserved_amount + $1,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $2 AND version = $3 AND balance - reserved_amount >= $1
            "#,
        )
        .bind(amount.0)
        .bind(wallet.id.0)
        .bind(wallet.version)
        .execute(&mut *tx)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?;

        if updated.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| WalletError::Repository(e.to_string()))?;
            return Err(WalletError::Conflict);
        }

        tx.commit()
            .await
            .map_err(|e| WalletError::Repository(e.to_string()))?;

        Ok(reservation_id)
    }

    async fn commit_reservation(&self, reservation_id: ReservationId) -> Result<(), WalletError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| WalletError::Repository(e.to_string()))?;

        // Lock corto sobre la reserva: la transición de estado es la
        // sección crítica, nunca una llamada externa.
        let reservation = sqlx::query_as::<_, ReservationModel>(
            r#"
            SELECT * FROM reservations
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(reservation_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?
        .map(Reservation::from)
        .ok_or(WalletError::ReservationNotFound(reservation_id))?;

        match reservation.state {
            // Idempotente: un commit repetido no debita dos veces.
            ReservationState::COMMITTED => return Ok(()),
            // Una reserva liberada ya no respalda el débito; que el
            // llamador lo trate como fallo y alerte, no como éxito mudo.
            ReservationState::RELEASED => {
                return Err(WalletError::Repository(format!(
                    "reservation {} was released before commit",
                    reservation_id
                )));
            }
            ReservationState::HELD => {}
        }

        let wallet = Self::fetch_wallet(&mut *tx, reservation.user_id)
            .await?
            .ok_or(WalletError::NotFound(reservation.user_id))?;

        let new_balance: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE wallets
            SET balance = balance - $1,
                reserved_amount = reserved_amount - $1,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $2 AND balance >= $1 AND reserved_amount >= $1
            RETURNING balance
            "#,
        )
        .bind(reservation.amount.0)
        .bind(wallet.id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?;

        let Some((balance_after,)) = new_balance else {
            // Una reserva HELD siempre está respaldada por saldo; si esto
            // dispara hay corrupción y es mejor fallar que debitar mal.
            tx.rollback()
                .await
                .map_err(|e| WalletError::Repository(e.to_string()))?;
            return Err(WalletError::Repository(format!(
                "reservation {} not backed by wallet balance",
                reservation_id
            )));
        };

        sqlx::query(
            r#"
            UPDATE reservations
            SET state = 'COMMITTED', resolved_at = NOW()
            WHERE id = $1 AND state = 'HELD'
            "#,
        )
        .bind(reservation_id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?;

        Self::append_history(
            &mut tx,
            &wallet,
            HistoryDirection::DEBIT,
            reservation.amount,
            Kobo(balance_after),
            &format!("RSV-{}", reservation_id.0.simple()),
            "VAS purchase settlement",
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| WalletError::Repository(e.to_string()))
    }

    async fn release_reservation(&self, reservation_id: ReservationId) -> Result<(), WalletError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| WalletError::Repository(e.to_string()))?;

        let reservation = sqlx::query_as::<_, ReservationModel>(
            r#"
            SELECT * FROM reservations
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(reservation_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?
        .map(Reservation::from)
        .ok_or(WalletError::ReservationNotFound(reservation_id))?;

        if reservation.state.is_terminal() {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE wallets
            SET reserved_amount = reserved_amount - $1,
                version = version + 1,
                updated_at = NOW()
            WHERE user_id = $2 AND reserved_amount >= $1
            "#,
        )
        .bind(reservation.amount.0)
        .bind(reservation.user_id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE reservations
            SET state = 'RELEASED', resolved_at = NOW()
            WHERE id = $1 AND state = 'HELD'
            "#,
        )
        .bind(reservation_id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| WalletError::Repository(e.to_string()))
    }

    async fn find_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, WalletError> {
        let model = sqlx::query_as::<_, ReservationModel>(
            r#"
            SELECT * FROM reservations
            WHERE id = $1
            "#,
        )
        .bind(reservation_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?;

        Ok(model.map(Reservation::from))
    }

    async fn available_balance(&self, user_id: UserId) -> Result<Kobo, WalletError> {
        // Definición canónica: balance − Σ(reservas HELD), no el campo
        // cacheado, para que el invariante sea verificable desde afuera.
        let row: Option<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT w.balance,
                   COALESCE((
                       SELECT SUM(r.amount) FROM reservations r
                       WHERE r.user_id = w.user_id AND r.state = 'HELD'
                   ), 0) AS held
            FROM wallets w
            WHERE w.user_id = $1
            "#,
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?;

        let (balance, held) = row.ok_or(WalletError::NotFound(user_id))?;
        Ok(Kobo(balance) - Kobo(held))
    }

    async fn update_accounts(
        &self,
        user_id: UserId,
        account_reference: &str,
        accounts: &[BankAccount],
    ) -> Result<(), WalletError> {
        let accounts_json =
            serde_json::to_value(accounts).map_err(|e| WalletError::Repository(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET account_reference = $1,
                accounts = $2,
                updated_at = NOW()
            WHERE user_id = $3
            "#,
        )
        .bind(account_reference)
        .bind(accounts_json)
        .bind(user_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(WalletError::NotFound(user_id));
        }
        Ok(())
    }

    async fn set_pin(&self, user_id: UserId, hash: &str, salt: &str) -> Result<(), WalletError> {
        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET pin_hash = $1,
                pin_salt = $2,
                pin_attempts = 0,
                pin_locked_until = NULL,
                updated_at = NOW()
            WHERE user_id = $3
            "#,
        )
        .bind(hash)
        .bind(salt)
        .bind(user_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(WalletError::NotFound(user_id));
        }
        Ok(())
    }

    async fn record_pin_failure(
        &self,
        user_id: UserId,
        attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), WalletError> {
        sqlx::query(
            r#"
            UPDATE wallets
            SET pin_attempts = $1,
                pin_locked_until = $2,
                updated_at = NOW()
            WHERE user_id = $3
            "#,
        )
        .bind(attempts)
        .bind(locked_until)
        .bind(user_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn reset_pin_attempts(&self, user_id: UserId) -> Result<(), WalletError> {
        sqlx::query(
            r#"
            UPDATE wallets
            SET pin_attempts = 0,
                pin_locked_until = NULL,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn clear_pin(&self, user_id: UserId) -> Result<(), WalletError> {
        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET pin_hash = NULL,
                pin_salt = NULL,
                pin_attempts = 0,
                pin_locked_until = NULL,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(WalletError::NotFound(user_id));
        }
        Ok(())
    }

    async fn release_stale_reservations(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<u64, WalletError> {
        let stale: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM reservations
            WHERE state = 'HELD' AND created_at < $1
            ORDER BY created_at ASC
            LIMIT 100
            "#,
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WalletError::Repository(e.to_string()))?;

        let mut released = 0u64;
        for (id,) in stale {
            match self.release_reservation(ReservationId(id)).await {
                Ok(()) => released += 1,
                Err(e) => {
                    warn!("Failed to release stale reservation {}: {}", id, e);
                }
            }
        }

        Ok(released)
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}
