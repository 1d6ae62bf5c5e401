use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::entities::AdminAction;
use crate::domain::error::PinError;
use crate::domain::pin;
use crate::domain::repository::{AdminAuditLog, WalletStore};
use crate::domain::types::UserId;

/// Estado del PIN visible para el cliente.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PinStatus {
    #[serde(rename = "pinSetup")]
    pub pin_setup: bool,
    #[serde(rename = "attemptsRemaining")]
    pub attempts_remaining: i32,
    #[serde(rename = "lockedMinutesRemaining")]
    pub locked_minutes_remaining: Option<i64>,
}

/// Caso de uso: ciclo de vida del PIN de gasto.
///
/// Alta única, validación con contador de intentos y bloqueo de 15 minutos
/// al tercer fallo consecutivo, cambio con PIN anterior y reseteo
/// administrativo auditado.
pub struct ManagePinUseCase {
    wallet_store: Arc<dyn WalletStore>,
    audit: Arc<dyn AdminAuditLog>,
}

impl ManagePinUseCase {
    pub fn new(wallet_store: Arc<dyn WalletStore>, audit: Arc<dyn AdminAuditLog>) -> Self {
        Self { wallet_store, audit }
    }

    #[tracing::instrument(name = "ManagePinUseCase::setup", skip(self, new_pin))]
    pub async fn setup(&self, user_id: UserId, new_pin: &str) -> Result<(), PinError> {
        pin::validate_pin(new_pin)?;

        let wallet = self.wallet_store.get(user_id).await?;
        if wallet.has_pin() {
            return Err(PinError::AlreadySet);
        }

        let salt = pin::generate_salt();
        let hash = pin::hash_pin(new_pin, &salt);
        self.wallet_store.set_pin(user_id, &hash, &salt).await?;

        info!("Spending PIN set up for user {}", user_id);
        Ok(())
    }

    #[tracing::instrument(name = "ManagePinUseCase::validate", skip(self, pin_input))]
    pub async fn validate(&self, user_id: UserId, pin_input: &str) -> Result<(), PinError> {
        let wallet = self.wallet_store.get(user_id).await?;

        let (Some(hash), Some(salt)) = (wallet.pin_hash.as_deref(), wallet.pin_salt.as_deref())
        else {
            return Err(PinError::NotSet);
        };

        let now = Utc::now();
        if let Some(locked_until) = wallet.pin_locked_until {
            if locked_until > now {
                let minutes_remaining = (locked_until - now).num_minutes() + 1;
                return Err(PinError::Locked { minutes_remaining });
            }
        }

        if pin::verify_pin(pin_input, salt, hash) {
            self.wallet_store.reset_pin_attempts(user_id).await?;
            return Ok(());
        }

        // Fallo: contar el intento y bloquear al llegar al límite.
        let attempts = wallet.pin_attempts + 1;
        if attempts >= pin::MAX_ATTEMPTS {
            let locked_until = now + Duration::minutes(pin::LOCKOUT_MINUTES);
            self.wallet_store
                .record_pin_failure(user_id, attempts, Some(locked_until))
                .await?;
            return Err(PinError::Locked {
                minutes_remaining: pin::LOCKOUT_MINUTES,
            });
        }

        self.wallet_store
            .record_pin_failure(user_id, attempts, None)
            .await?;
        Err(PinError::Incorrect {
            attempts_remaining: pin::MAX_ATTEMPTS - attempts,
        })
    }

    #[tracing::instrument(name = "ManagePinUseCase::change", skip(self, old_pin, new_pin))]
    pub async fn change(
        &self,
        user_id: UserId,
        old_pin: &str,
        new_pin: &str,
    ) -> Result<(), PinError> {
        pin::validate_pin(new_pin)?;

        // Validar el PIN anterior respeta contador y bloqueo.
        self.validate(user_id, old_pin).await?;

        let salt = pin::generate_salt();
        let hash = pin::hash_pin(new_pin, &salt);
        self.wallet_store.set_pin(user_id, &hash, &salt).await?;

        info!("Spending PIN changed for user {}", user_id);
        Ok(())
    }

    pub async fn status(&self, user_id: UserId) -> Result<PinStatus, PinError> {
        let wallet = self.wallet_store.get(user_id).await?;
        let now = Utc::now();

        let locked_minutes_remaining = wallet.pin_locked_until.and_then(|until| {
            if until > now {
                Some((until - now).num_minutes() + 1)
            } else {
                None
            }
        });

        Ok(PinStatus {
            pin_setup: wallet.has_pin(),
            attempts_remaining: (pin::MAX_ATTEMPTS - wallet.pin_attempts).max(0),
            locked_minutes_remaining,
        })
    }

    /// Reseteo administrativo: limpia hash y contadores y deja el rastro de
    /// auditoría.
    #[tracing::instrument(name = "ManagePinUseCase::admin_reset", skip(self))]
    pub async fn admin_reset(&self, admin_id: UserId, user_id: UserId) -> Result<(), PinError> {
        self.wallet_store.clear_pin(user_id).await?;

        self.audit
            .record(AdminAction {
                id: Uuid::new_v4(),
                admin_id,
                action: "PIN_RESET".to_string(),
                target_user: user_id,
                details: serde_json::json!({ "clearedAt": Utc::now() }),
                created_at: Utc::now(),
            })
            .await
            .map_err(|e| PinError::Wallet(crate::domain::error::WalletError::Repository(
                e.to_string(),
            )))?;

        info!("Admin {} reset PIN for user {}", admin_id, user_id);
        Ok(())
    }
}
