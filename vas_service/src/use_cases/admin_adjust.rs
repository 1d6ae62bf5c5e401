use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use common::Kobo;

use crate::domain::entities::{AdminAction, VasTransaction, VasTransactionType};
use crate::domain::error::PurchaseError;
use crate::domain::repository::{
    AdminAuditLog, BalanceChange, FundingInsert, TransactionLedger, WalletStore,
};
use crate::domain::types::{TransactionId, UserId};

/// Resultado de un ajuste administrativo.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AdjustmentResult {
    pub transaction_id: Option<TransactionId>,
    pub reference: String,
    pub new_balance: Kobo,
    /// true cuando la referencia ya se había aplicado (replay).
    pub already_applied: bool,
}

/// Caso de uso: reembolsos y deducciones administrativas.
///
/// Idempotente sobre la referencia del llamador: la fila del ledger choca
/// con el índice único y el movimiento de saldo choca con el historial, de
/// modo que repetir la misma orden no duplica dinero.
pub struct AdminAdjustUseCase {
    wallet_store: Arc<dyn WalletStore>,
    ledger: Arc<dyn TransactionLedger>,
    audit: Arc<dyn AdminAuditLog>,
}

impl AdminAdjustUseCase {
    pub fn new(
        wallet_store: Arc<dyn WalletStore>,
        ledger: Arc<dyn TransactionLedger>,
        audit: Arc<dyn AdminAuditLog>,
    ) -> Self {
        Self {
            wallet_store,
            ledger,
            audit,
        }
    }

    #[tracing::instrument(name = "AdminAdjustUseCase::refund", skip(self, reason))]
    pub async fn refund(
        &self,
        admin_id: UserId,
        user_id: UserId,
        amount: Kobo,
        reference: String,
        reason: String,
    ) -> Result<AdjustmentResult, PurchaseError> {
        self.apply(
            admin_id,
            user_id,
            amount,
            reference,
            reason,
            VasTransactionType::ADMIN_REFUND,
        )
        .await
    }

    #[tracing::instrument(name = "AdminAdjustUseCase::deduct", skip(self, reason))]
    pub async fn deduct(
        &self,
        admin_id: UserId,
        user_id: UserId,
        amount: Kobo,
        reference: String,
        reason: String,
    ) -> Result<AdjustmentResult, PurchaseError> {
        self.apply(
            admin_id,
            user_id,
            amount,
            reference,
            reason,
            VasTransactionType::ADMIN_DEDUCTION,
        )
        .await
    }

    async fn apply(
        &self,
        admin_id: UserId,
        user_id: UserId,
        amount: Kobo,
        reference: String,
        reason: String,
        tx_type: VasTransactionType,
    ) -> Result<AdjustmentResult, PurchaseError> {
        if !amount.is_positive() {
            return Err(PurchaseError::Validation(
                "Adjustment amount must be positive".to_string(),
            ));
        }
        if reference.trim().is_empty() {
            return Err(PurchaseError::Validation(
                "Adjustment reference is required".to_string(),
            ));
        }

        let tx = VasTransaction::new_admin_adjustment(
            user_id,
            tx_type,
            amount,
            reference.clone(),
            reason.clone(),
        );
        let insert = self.ledger.insert_funding(tx).await?;

        let change = match tx_type {
            VasTransactionType::ADMIN_REFUND => {
                self.wallet_store
                    .credit_balance(user_id, amount, &reference, &reason)
                    .await?
            }
            _ => {
                self.wallet_store
                    .debit_balance(user_id, amount, &reference, &reason)
                    .await?
            }
        };

        let (transaction_id, already_applied) = match insert {
            FundingInsert::Inserted(id) => (Some(id), false),
            FundingInsert::AlreadyProcessed => (None, true),
        };

        self.audit
            .record(AdminAction {
                id: Uuid::new_v4(),
                admin_id,
                action: format!("{:?}", tx_type),
                target_user: user_id,
                details: serde_json::json!({
                    "amount": amount,
                    "reference": reference,
                    "reason": reason,
                    "alreadyApplied": already_applied,
                }),
                created_at: Utc::now(),
            })
            .await
            .map_err(|e| PurchaseError::Repository(e.to_string()))?;

        info!(
            "Admin adjustment {:?} of {} for user {} (replay: {})",
            tx_type, amount, user_id, already_applied
        );

        Ok(AdjustmentResult {
            transaction_id,
            reference,
            new_balance: change.balance(),
            already_applied: matches!(change, BalanceChange::AlreadyApplied { .. }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::WalletError;
    use crate::domain::repository::{
        MockAdminAuditLog, MockTransactionLedger, MockWalletStore,
    };

    #[tokio::test]
    async fn test_refund_credits_and_audits() {
        let mut wallet = MockWalletStore::new();
        let mut ledger = MockTransactionLedger::new();
        let mut audit = MockAdminAuditLog::new();

        ledger
            .expect_insert_funding()
            .withf(|tx: &VasTransaction| tx.tx_type == VasTransactionType::ADMIN_REFUND)
            .times(1)
            .returning(|tx| Ok(FundingInsert::Inserted(tx.id)));
        wallet
            .expect_credit_balance()
            .times(1)
            .returning(|_, amount, _, _| Ok(BalanceChange::Applied { new_balance: amount }));
        audit.expect_record().times(1).returning(|_| Ok(()));

        let uc = AdminAdjustUseCase::new(Arc::new(wallet), Arc::new(ledger), Arc::new(audit));
        let result = uc
            .refund(
                UserId::new(),
                UserId::new(),
                Kobo(20_000),
                "ADMIN-REF-1".to_string(),
                "Mismatch compensation".to_string(),
            )
            .await
            .unwrap();

        assert!(!result.already_applied);
        assert_eq!(result.new_balance, Kobo(20_000));
    }

    #[tokio::test]
    async fn test_repeated_reference_is_a_noop() {
        let mut wallet = MockWalletStore::new();
        let mut ledger = MockTransactionLedger::new();
        let mut audit = MockAdminAuditLog::new();

        // La fila ya existe y el historial ya tiene la referencia.
        ledger
            .expect_insert_funding()
            .returning(|_| Ok(FundingInsert::AlreadyProcessed));
        wallet
            .expect_credit_balance()
            .returning(|_, _, _, _| Ok(BalanceChange::AlreadyApplied { balance: Kobo(50_000) }));
        audit.expect_record().returning(|_| Ok(()));

        let uc = AdminAdjustUseCase::new(Arc::new(wallet), Arc::new(ledger), Arc::new(audit));
        let result = uc
            .refund(
                UserId::new(),
                UserId::new(),
                Kobo(20_000),
                "ADMIN-REF-1".to_string(),
                "Mismatch compensation".to_string(),
            )
            .await
            .unwrap();

        // El replay no mueve dinero.
        assert!(result.already_applied);
        assert_eq!(result.new_balance, Kobo(50_000));
    }

    #[tokio::test]
    async fn test_deduction_requires_available_funds() {
        let mut wallet = MockWalletStore::new();
        let mut ledger = MockTransactionLedger::new();
        let audit = MockAdminAuditLog::new();

        ledger
            .expect_insert_funding()
            .returning(|tx| Ok(FundingInsert::Inserted(tx.id)));
        wallet.expect_debit_balance().returning(|_, amount, _, _| {
            Err(WalletError::InsufficientFunds {
                required: amount,
                available: Kobo(1_000),
            })
        });

        let uc = AdminAdjustUseCase::new(Arc::new(wallet), Arc::new(ledger), Arc::new(audit));
        let result = uc
            .deduct(
                UserId::new(),
                UserId::new(),
                Kobo(20_000),
                "ADMIN-DED-1".to_string(),
                "Chargeback".to_string(),
            )
            .await;

        assert!(matches!(
            result,
            Err(PurchaseError::Wallet(WalletError::InsufficientFunds { .. }))
        ));
    }
}
