use std::sync::Arc;
use tracing::{info, warn};

use common::reference as refs;

use crate::domain::entities::Wallet;
use crate::domain::error::PurchaseError;
use crate::domain::gateways::BankAccountProvider;
use crate::domain::repository::{UserStore, WalletStore};
use crate::domain::types::UserId;

/// Caso de uso: creación de la billetera y su cuenta bancaria reservada.
///
/// Idempotente: si la billetera ya existe con cuentas, se devuelve tal
/// cual. Si existe sin cuentas (el proveedor falló en un intento previo) se
/// reintenta solo la emisión de cuentas.
pub struct CreateWalletUseCase {
    wallet_store: Arc<dyn WalletStore>,
    users: Arc<dyn UserStore>,
    accounts: Arc<dyn BankAccountProvider>,
}

impl CreateWalletUseCase {
    pub fn new(
        wallet_store: Arc<dyn WalletStore>,
        users: Arc<dyn UserStore>,
        accounts: Arc<dyn BankAccountProvider>,
    ) -> Self {
        Self {
            wallet_store,
            users,
            accounts,
        }
    }

    #[tracing::instrument(name = "CreateWalletUseCase::execute", skip(self))]
    pub async fn execute(&self, user_id: UserId) -> Result<Wallet, PurchaseError> {
        let user = self
            .users
            .find(user_id)
            .await
            .map_err(|e| PurchaseError::Repository(e.to_string()))?
            .ok_or_else(|| PurchaseError::Validation(format!("User not found: {}", user_id)))?;

        let wallet = match self.wallet_store.find(user_id).await? {
            Some(wallet) => wallet,
            None => self.wallet_store.create(Wallet::new(user_id)).await?,
        };

        if !wallet.accounts.is_empty() {
            return Ok(wallet);
        }

        // Emitir (o recuperar) las cuentas reservadas en el proveedor.
        let account_reference = wallet
            .account_reference
            .clone()
            .unwrap_or_else(|| refs::account_reference(user_id.0));

        let details = match self
            .accounts
            .create_reserved_account(&account_reference, &user.full_name, &user.email)
            .await
        {
            Ok(details) => details,
            Err(create_error) => {
                // La cuenta pudo existir de un intento anterior: probar el
                // fetch antes de rendirse.
                warn!(
                    "Reserved account creation failed ({}), trying fetch",
                    create_error
                );
                self.accounts
                    .fetch_reserved_account(&account_reference)
                    .await?
            }
        };

        self.wallet_store
            .update_accounts(user_id, &details.account_reference, &details.accounts)
            .await?;

        info!(
            "Reserved account ready for user {}: {} bank accounts",
            user_id,
            details.accounts.len()
        );

        self.wallet_store.get(user_id).await.map_err(Into::into)
    }
}
