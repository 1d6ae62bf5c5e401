use std::sync::Arc;

use crate::domain::entities::{VasTransaction, VasTransactionStatus};
use crate::domain::error::LedgerError;
use crate::domain::repository::TransactionLedger;
use crate::domain::types::UserId;

/// Página de la vista unificada de transacciones.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<VasTransaction>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

/// Estado autoritativo de una referencia reportada por el cliente.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SyncResult {
    pub reference: String,
    pub status: Option<VasTransactionStatus>,
    pub found: bool,
}

const MAX_PAGE_SIZE: i64 = 50;
const MAX_SYNC_BATCH: usize = 100;

/// Caso de uso: vista unificada paginada y conciliación cliente-backend.
pub struct ListTransactionsUseCase {
    ledger: Arc<dyn TransactionLedger>,
}

impl ListTransactionsUseCase {
    pub fn new(ledger: Arc<dyn TransactionLedger>) -> Self {
        Self { ledger }
    }

    #[tracing::instrument(name = "ListTransactionsUseCase::list", skip(self))]
    pub async fn list(
        &self,
        user_id: UserId,
        page: i64,
        limit: i64,
    ) -> Result<TransactionPage, LedgerError> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1) * limit;

        let (transactions, total) = self.ledger.list_for_user(user_id, offset, limit).await?;

        Ok(TransactionPage {
            transactions,
            page,
            limit,
            total,
        })
    }

    /// El cliente manda las referencias que conoce; el backend responde el
    /// estado real de cada una. La fuente de verdad siempre es el ledger.
    #[tracing::instrument(name = "ListTransactionsUseCase::sync", skip(self, references))]
    pub async fn sync(
        &self,
        user_id: UserId,
        mut references: Vec<String>,
    ) -> Result<Vec<SyncResult>, LedgerError> {
        references.truncate(MAX_SYNC_BATCH);

        let statuses = self
            .ledger
            .statuses_for_references(user_id, references)
            .await?;

        Ok(statuses
            .into_iter()
            .map(|(reference, status)| SyncResult {
                found: status.is_some(),
                reference,
                status,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::MockTransactionLedger;

    #[tokio::test]
    async fn test_page_size_is_capped() {
        let mut ledger = MockTransactionLedger::new();
        ledger
            .expect_list_for_user()
            .withf(|_, offset, limit| *offset == 0 && *limit == 50)
            .times(1)
            .returning(|_, _, _| Ok((Vec::new(), 0)));

        let uc = ListTransactionsUseCase::new(Arc::new(ledger));
        let page = uc.list(UserId::new(), 1, 500).await.unwrap();

        assert_eq!(page.limit, 50);
    }

    #[tokio::test]
    async fn test_sync_reports_missing_references() {
        let mut ledger = MockTransactionLedger::new();
        ledger
            .expect_statuses_for_references()
            .returning(|_, references| {
                Ok(references
                    .into_iter()
                    .map(|r| {
                        let status = if r == "known" {
                            Some(VasTransactionStatus::SUCCESS)
                        } else {
                            None
                        };
                        (r, status)
                    })
                    .collect())
            });

        let uc = ListTransactionsUseCase::new(Arc::new(ledger));
        let results = uc
            .sync(
                UserId::new(),
                vec!["known".to_string(), "ghost".to_string()],
            )
            .await
            .unwrap();

        assert!(results[0].found);
        assert_eq!(results[0].status, Some(VasTransactionStatus::SUCCESS));
        assert!(!results[1].found);
    }
}
