use std::sync::Arc;
use tracing::warn;

use common::Kobo;

use crate::domain::entities::{BankAccount, Wallet, WalletStatus};
use crate::domain::error::WalletError;
use crate::domain::gateways::BankAccountProvider;
use crate::domain::repository::WalletStore;
use crate::domain::types::UserId;

/// Vista de saldos de la billetera.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BalanceView {
    #[serde(rename = "totalBalance")]
    pub total_balance: Kobo,
    #[serde(rename = "reservedAmount")]
    pub reserved_amount: Kobo,
    #[serde(rename = "availableBalance")]
    pub available_balance: Kobo,
    pub accounts: Vec<BankAccount>,
    pub status: WalletStatus,
}

/// Caso de uso: consulta de saldos (vista completa y variante liviana de
/// polling).
pub struct GetBalanceUseCase {
    wallet_store: Arc<dyn WalletStore>,
    accounts: Arc<dyn BankAccountProvider>,
}

impl GetBalanceUseCase {
    pub fn new(wallet_store: Arc<dyn WalletStore>, accounts: Arc<dyn BankAccountProvider>) -> Self {
        Self {
            wallet_store,
            accounts,
        }
    }

    #[tracing::instrument(name = "GetBalanceUseCase::execute", skip(self))]
    pub async fn execute(&self, user_id: UserId) -> Result<BalanceView, WalletError> {
        let mut wallet = self.wallet_store.get(user_id).await?;

        // Auto-recuperación: billeteras sin cuentas (creación a medias)
        // reintentan el fetch del proveedor. Un fallo aquí no rompe la
        // consulta de saldo.
        if wallet.accounts.is_empty() {
            if let Some(reference) = wallet.account_reference.clone() {
                match self.accounts.fetch_reserved_account(&reference).await {
                    Ok(details) if !details.accounts.is_empty() => {
                        if self
                            .wallet_store
                            .update_accounts(user_id, &details.account_reference, &details.accounts)
                            .await
                            .is_ok()
                        {
                            wallet.accounts = details.accounts;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Account auto-recovery failed for {}: {}", user_id, e),
                }
            }
        }

        let available_balance = self.wallet_store.available_balance(user_id).await?;

        Ok(BalanceView {
            total_balance: wallet.balance,
            reserved_amount: wallet.reserved_amount,
            available_balance,
            accounts: wallet.accounts,
            status: wallet.status,
        })
    }

    /// Variante liviana para el polling del cliente (cada 3 segundos): sin
    /// auto-recuperación ni cuentas.
    pub async fn current(&self, user_id: UserId) -> Result<BalanceView, WalletError> {
        let wallet: Wallet = self.wallet_store.get(user_id).await?;
        let available_balance = self.wallet_store.available_balance(user_id).await?;

        Ok(BalanceView {
            total_balance: wallet.balance,
            reserved_amount: wallet.reserved_amount,
            available_balance,
            accounts: Vec::new(),
            status: wallet.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gateways::MockBankAccountProvider;
    use crate::domain::repository::MockWalletStore;

    #[tokio::test]
    async fn test_balance_reflects_reservations() {
        let mut wallet_store = MockWalletStore::new();
        let accounts = MockBankAccountProvider::new();
        let user_id = UserId::new();

        wallet_store.expect_get().returning(|id| {
            let mut w = Wallet::new(id);
            w.balance = Kobo(30_000);
            w.reserved_amount = Kobo(20_000);
            w.account_reference = None;
            Ok(w)
        });
        wallet_store
            .expect_available_balance()
            .returning(|_| Ok(Kobo(10_000)));

        let uc = GetBalanceUseCase::new(Arc::new(wallet_store), Arc::new(accounts));
        let view = uc.execute(user_id).await.unwrap();

        // Escenario de referencia: 300.00 de saldo con 200.00 retenidos
        // deja 100.00 disponibles.
        assert_eq!(view.total_balance, Kobo(30_000));
        assert_eq!(view.reserved_amount, Kobo(20_000));
        assert_eq!(view.available_balance, Kobo(10_000));
    }

    #[tokio::test]
    async fn test_missing_wallet_is_not_found() {
        let mut wallet_store = MockWalletStore::new();
        let accounts = MockBankAccountProvider::new();

        wallet_store
            .expect_get()
            .returning(|id| Err(WalletError::NotFound(id)));

        let uc = GetBalanceUseCase::new(Arc::new(wallet_store), Arc::new(accounts));
        let result = uc.execute(UserId::new()).await;

        assert!(matches!(result, Err(WalletError::NotFound(_))));
    }
}
