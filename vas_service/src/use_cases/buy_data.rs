use std::sync::Arc;
use tracing::{error, info, warn};

use common::{phone, reference, Kobo};

use crate::domain::entities::{
    Provider, SettlementPayload, TaskKind, VasTransaction, VasTransactionType,
};
use crate::domain::error::{PurchaseError, WalletError};
use crate::domain::gateways::{BillsProvider, VendProvider, VendSuccess};
use crate::domain::plan_codes;
use crate::domain::repository::{TaskQueue, TransactionLedger, WalletStore};
use crate::domain::routing::{self, DataRoute};
use crate::domain::types::{ReservationId, TransactionId, UserId};
use crate::use_cases::{PurchaseReceipt, CONFLICT_RETRIES, DUPLICATE_WINDOW_MINUTES};

/// Solicitud de compra de datos ya deserializada.
#[derive(Debug, Clone)]
pub struct DataRequest {
    pub phone_number: String,
    pub network: String,
    pub data_plan_id: String,
    pub data_plan_name: String,
    pub amount: Kobo,
    /// Familia de planes elegida por el usuario ("all_plans", "mtn_share",
    /// "mtn_gifting", ...). La elección es autoritativa.
    pub plan_type: String,
}

/// Caso de uso: compra de un plan de datos.
///
/// A diferencia de airtime, aquí NO hay fallback entre proveedores: los
/// planes no son intercambiables y el fallback silencioso del pasado
/// producía entregas de plan equivocado. Si el proveedor elegido falla, el
/// error sale tipado con las familias alternativas de la red.
pub struct BuyDataUseCase {
    wallet_store: Arc<dyn WalletStore>,
    ledger: Arc<dyn TransactionLedger>,
    task_queue: Arc<dyn TaskQueue>,
    monnify: Arc<dyn BillsProvider>,
    peyflex: Arc<dyn VendProvider>,
}

impl BuyDataUseCase {
    pub fn new(
        wallet_store: Arc<dyn WalletStore>,
        ledger: Arc<dyn TransactionLedger>,
        task_queue: Arc<dyn TaskQueue>,
        monnify: Arc<dyn BillsProvider>,
        peyflex: Arc<dyn VendProvider>,
    ) -> Self {
        Self {
            wallet_store,
            ledger,
            task_queue,
            monnify,
            peyflex,
        }
    }

    #[tracing::instrument(name = "BuyDataUseCase::execute", skip(self, request))]
    pub async fn execute(
        &self,
        user_id: UserId,
        request: DataRequest,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        // 1. Validación de entrada.
        let phone_number = phone::normalize(&request.phone_number)
            .ok_or_else(|| PurchaseError::Validation("Invalid phone number".to_string()))?;

        if !routing::is_known_network(&request.network) {
            return Err(PurchaseError::Validation(format!(
                "Unknown network: {}",
                request.network
            )));
        }
        if request.data_plan_id.trim().is_empty() {
            return Err(PurchaseError::Validation(
                "Phone number, network, data plan, and amount are required".to_string(),
            ));
        }
        if !request.amount.is_positive() {
            return Err(PurchaseError::Validation(
                "Amount must be positive".to_string(),
            ));
        }

        // 2. Ruta determinista: la elección del usuario manda.
        let route = routing::route_data_purchase(&request.plan_type, &request.network)?;

        // Valor de cara, sin margen.
        let amount = request.amount;
        let total_amount = amount;

        // 3-4. Guardias de duplicado.
        if let Some(recent) = self
            .ledger
            .find_recent_success(
                user_id,
                VasTransactionType::DATA,
                amount,
                &phone_number,
                DUPLICATE_WINDOW_MINUTES,
            )
            .await?
        {
            return Err(PurchaseError::RecentDuplicate {
                reference: recent.request_id,
            });
        }

        if self
            .ledger
            .find_in_flight(
                user_id,
                VasTransactionType::DATA,
                amount,
                &phone_number,
                DUPLICATE_WINDOW_MINUTES,
            )
            .await?
            .is_some()
        {
            return Err(PurchaseError::DuplicateInFlight);
        }

        // 5. Saldo disponible.
        let available = self.wallet_store.available_balance(user_id).await?;
        if available < total_amount {
            return Err(WalletError::InsufficientFunds {
                required: total_amount,
                available,
            }
            .into());
        }

        // Traducción del código al dialecto del proveedor elegido, antes de
        // reservar nada: un código irresoluble es un rechazo limpio.
        let plan_code = plan_codes::adapt_for_provider(
            &request.data_plan_id,
            route.provider,
            &request.network,
        )?;

        // 6-7. Fila centinela.
        let request_id = reference::generate_request_id("DATA", user_id.0);
        let network = request.network.to_uppercase();
        let mut tx = VasTransaction::new_purchase(
            user_id,
            VasTransactionType::DATA,
            network.clone(),
            phone_number.clone(),
            amount,
            request_id.clone(),
        );
        tx.data_plan_id = Some(request.data_plan_id.clone());
        tx.data_plan_name = Some(request.data_plan_name.clone());
        let transaction_id = self.ledger.create_in_progress(tx).await?;

        // 8. Reserva.
        let reservation_id = match self
            .reserve_with_retry(user_id, total_amount, transaction_id)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                let _ = self
                    .ledger
                    .mark_failed(transaction_id, &e.to_string())
                    .await;
                return Err(e);
            }
        };

        // 9. Vend con el proveedor elegido. Sin fallback.
        let vend = match self
            .vend(&route, &plan_code, &phone_number, &request_id)
            .await
        {
            Ok(vend) => vend,
            Err(provider_error) => {
                warn!(
                    "Data purchase failed for user {} via {:?}: {}",
                    user_id, route.provider, provider_error
                );

                if let Err(e) = self.wallet_store.release_reservation(reservation_id).await {
                    error!("Failed to release reservation {}: {}", reservation_id, e);
                }
                let _ = self
                    .ledger
                    .mark_failed(transaction_id, &provider_error.to_string())
                    .await;

                return Err(PurchaseError::ProviderUnavailable {
                    reason: provider_error.to_string(),
                    alternatives: routing::alternatives_for(&request.network, &request.plan_type),
                });
            }
        };

        // 10. Encolar liquidación; el match de producto se valida allí.
        self.enqueue_settlement(
            user_id,
            transaction_id,
            reservation_id,
            total_amount,
            amount,
            &network,
            &phone_number,
            &request,
            &vend,
        )
        .await?;

        let available_balance = self
            .wallet_store
            .available_balance(user_id)
            .await
            .unwrap_or(available - total_amount);

        info!(
            "Data purchase queued: user={} ref={} provider={:?} plan={}",
            user_id, request_id, vend.provider, request.data_plan_id
        );

        Ok(PurchaseReceipt {
            transaction_id,
            reference: request_id,
            processing_status: "QUEUED",
            provider: vend.provider,
            amount,
            total_amount,
            available_balance,
        })
    }

    async fn vend(
        &self,
        route: &DataRoute,
        plan_code: &str,
        phone_number: &str,
        request_id: &str,
    ) -> Result<VendSuccess, crate::domain::error::ProviderError> {
        match route.provider {
            Provider::Monnify => {
                self.monnify
                    .vend_data(&route.provider_network, plan_code, phone_number, request_id)
                    .await
            }
            Provider::Peyflex => {
                self.peyflex
                    .vend_data(&route.provider_network, plan_code, phone_number, request_id)
                    .await
            }
            Provider::Internal => unreachable!("data purchases never route internally"),
        }
    }

    async fn reserve_with_retry(
        &self,
        user_id: UserId,
        amount: Kobo,
        transaction_id: TransactionId,
    ) -> Result<ReservationId, PurchaseError> {
        let mut last_error = WalletError::Conflict;
        for attempt in 0..CONFLICT_RETRIES {
            match self
                .wallet_store
                .reserve(user_id, amount, transaction_id)
                .await
            {
                Ok(id) => return Ok(id),
                Err(WalletError::Conflict) => {
                    warn!(
                        "Optimistic conflict reserving for user {} (attempt {})",
                        user_id,
                        attempt + 1
                    );
                    last_error = WalletError::Conflict;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_error.into())
    }

    #[allow(clippy::too_many_arguments)]
    async fn enqueue_settlement(
        &self,
        user_id: UserId,
        transaction_id: TransactionId,
        reservation_id: ReservationId,
        amount_to_debit: Kobo,
        face_value: Kobo,
        network: &str,
        phone_number: &str,
        request: &DataRequest,
        vend: &VendSuccess,
    ) -> Result<(), PurchaseError> {
        let payload = SettlementPayload {
            transaction_id,
            user_id,
            reservation_id,
            amount_to_debit,
            face_value,
            provider: vend.provider,
            tx_type: VasTransactionType::DATA,
            network: network.to_string(),
            description: format!(
                "{} Data - {} for {}",
                network, request.data_plan_name, phone_number
            ),
            requested_plan_id: Some(request.data_plan_id.clone()),
            requested_plan_name: Some(request.data_plan_name.clone()),
            delivered_product_name: vend.product_name.clone(),
            delivered_amount: vend.vend_amount,
            provider_reference: vend.transaction_reference.clone(),
            provider_response: vend.raw.clone(),
        };

        let payload_json = serde_json::to_value(&payload)
            .map_err(|e| PurchaseError::Repository(e.to_string()))?;

        let mut last_error = None;
        for _ in 0..3 {
            match self
                .task_queue
                .enqueue(TaskKind::SETTLE_VAS, transaction_id, payload_json.clone())
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) => {
                    error!("Failed to enqueue settlement for {}: {}", transaction_id, e);
                    last_error = Some(e);
                }
            }
        }

        Err(PurchaseError::Repository(format!(
            "settlement enqueue failed after provider success: {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::VasTransactionStatus;
    use crate::domain::error::ProviderError;
    use crate::domain::gateways::{MockBillsProvider, MockVendProvider};
    use crate::domain::repository::{MockTaskQueue, MockTransactionLedger, MockWalletStore};
    use crate::domain::types::TaskId;
    use mockall::predicate::*;

    fn vend_success(provider: Provider, product: &str, amount: i64) -> VendSuccess {
        VendSuccess {
            provider,
            transaction_reference: "PX-REF-9".to_string(),
            vend_reference: "FICORE_DATA_x".to_string(),
            product_name: Some(product.to_string()),
            vend_amount: Some(Kobo(amount)),
            commission: None,
            raw: serde_json::json!({}),
        }
    }

    fn request(plan_type: &str) -> DataRequest {
        DataRequest {
            phone_number: "08031234567".to_string(),
            network: "mtn".to_string(),
            data_plan_id: "M1GBS".to_string(),
            data_plan_name: "MTN SHARE 1GB 7 Days".to_string(),
            amount: Kobo(50_000),
            plan_type: plan_type.to_string(),
        }
    }

    fn use_case(
        wallet: MockWalletStore,
        ledger: MockTransactionLedger,
        tasks: MockTaskQueue,
        monnify: MockBillsProvider,
        peyflex: MockVendProvider,
    ) -> BuyDataUseCase {
        BuyDataUseCase::new(
            Arc::new(wallet),
            Arc::new(ledger),
            Arc::new(tasks),
            Arc::new(monnify),
            Arc::new(peyflex),
        )
    }

    fn permissive_guards(wallet: &mut MockWalletStore, ledger: &mut MockTransactionLedger) {
        ledger
            .expect_find_recent_success()
            .returning(|_, _, _, _, _| Ok(None));
        ledger
            .expect_find_in_flight()
            .returning(|_, _, _, _, _| Ok(None));
        wallet
            .expect_available_balance()
            .returning(|_| Ok(Kobo(100_000)));
    }

    #[tokio::test]
    async fn test_share_plan_routes_to_peyflex_only() {
        let mut wallet = MockWalletStore::new();
        let mut ledger = MockTransactionLedger::new();
        let mut tasks = MockTaskQueue::new();
        let monnify = MockBillsProvider::new(); // no debe tocarse
        let mut peyflex = MockVendProvider::new();

        let reservation = ReservationId::new();
        permissive_guards(&mut wallet, &mut ledger);
        ledger.expect_create_in_progress().returning(|tx| Ok(tx.id));
        wallet
            .expect_reserve()
            .returning(move |_, _, _| Ok(reservation));
        peyflex
            .expect_vend_data()
            .withf(|network, plan, _, _| network == "mtn_data_share" && plan == "M1GBS")
            .times(1)
            .returning(|_, _, _, _| {
                Ok(vend_success(Provider::Peyflex, "MTN SHARE 1GB", 50_000))
            });
        tasks
            .expect_enqueue()
            .times(1)
            .returning(|_, id, _| Ok(TaskId(id.0)));

        let uc = use_case(wallet, ledger, tasks, monnify, peyflex);
        let receipt = uc.execute(UserId::new(), request("mtn_share")).await.unwrap();

        assert_eq!(receipt.provider, Provider::Peyflex);
        assert_eq!(receipt.total_amount, Kobo(50_000)); // valor de cara
    }

    #[tokio::test]
    async fn test_regular_plan_routes_to_monnify_with_translated_code() {
        let mut wallet = MockWalletStore::new();
        let mut ledger = MockTransactionLedger::new();
        let mut tasks = MockTaskQueue::new();
        let mut monnify = MockBillsProvider::new();
        let peyflex = MockVendProvider::new();

        let reservation = ReservationId::new();
        permissive_guards(&mut wallet, &mut ledger);
        ledger.expect_create_in_progress().returning(|tx| Ok(tx.id));
        wallet
            .expect_reserve()
            .returning(move |_, _, _| Ok(reservation));
        // El código Peyflex M1GBS viaja traducido al 1815 de Monnify.
        monnify
            .expect_vend_data()
            .withf(|network, plan, _, _| network == "MTN" && plan == "1815")
            .times(1)
            .returning(|_, _, _, _| Ok(vend_success(Provider::Monnify, "MTN 1GB", 50_000)));
        tasks
            .expect_enqueue()
            .times(1)
            .returning(|_, id, _| Ok(TaskId(id.0)));

        let uc = use_case(wallet, ledger, tasks, monnify, peyflex);
        let receipt = uc
            .execute(UserId::new(), request("all_plans"))
            .await
            .unwrap();

        assert_eq!(receipt.provider, Provider::Monnify);
    }

    #[tokio::test]
    async fn test_provider_failure_surfaces_alternatives_no_fallback() {
        let mut wallet = MockWalletStore::new();
        let mut ledger = MockTransactionLedger::new();
        let tasks = MockTaskQueue::new();
        let monnify = MockBillsProvider::new(); // fallback prohibido
        let mut peyflex = MockVendProvider::new();

        let reservation = ReservationId::new();
        permissive_guards(&mut wallet, &mut ledger);
        ledger.expect_create_in_progress().returning(|tx| Ok(tx.id));
        wallet
            .expect_reserve()
            .returning(move |_, _, _| Ok(reservation));
        peyflex
            .expect_vend_data()
            .returning(|_, _, _, _| Err(ProviderError::Api("network not active".to_string())));
        wallet
            .expect_release_reservation()
            .with(eq(reservation))
            .times(1)
            .returning(|_| Ok(()));
        ledger
            .expect_mark_failed()
            .times(1)
            .returning(|_, _| Ok(()));

        let uc = use_case(wallet, ledger, tasks, monnify, peyflex);
        let result = uc.execute(UserId::new(), request("mtn_share")).await;

        match result.unwrap_err() {
            PurchaseError::ProviderUnavailable { alternatives, .. } => {
                assert!(alternatives.contains("MTN GIFTING"));
                assert!(alternatives.contains("REGULAR PLANS"));
            }
            other => panic!("Expected ProviderUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_plan_type_rejected_before_reserving() {
        let wallet = MockWalletStore::new();
        let mut ledger = MockTransactionLedger::new();
        let tasks = MockTaskQueue::new();
        let monnify = MockBillsProvider::new();
        let peyflex = MockVendProvider::new();

        ledger
            .expect_find_recent_success()
            .returning(|_, _, _, _, _| Ok(None));

        let uc = use_case(wallet, ledger, tasks, monnify, peyflex);
        let result = uc.execute(UserId::new(), request("mtn_sme")).await;

        assert!(matches!(result, Err(PurchaseError::UnknownPlanType(_))));
    }

    #[tokio::test]
    async fn test_reserve_conflict_retries_then_fails_transaction() {
        let mut wallet = MockWalletStore::new();
        let mut ledger = MockTransactionLedger::new();
        let tasks = MockTaskQueue::new();
        let monnify = MockBillsProvider::new();
        let peyflex = MockVendProvider::new();

        permissive_guards(&mut wallet, &mut ledger);
        ledger.expect_create_in_progress().returning(|tx| Ok(tx.id));
        wallet
            .expect_reserve()
            .times(3)
            .returning(|_, _, _| Err(WalletError::Conflict));
        ledger
            .expect_mark_failed()
            .withf(|_, reason| reason.contains("retry"))
            .times(1)
            .returning(|_, _| Ok(()));

        let uc = use_case(wallet, ledger, tasks, monnify, peyflex);
        let result = uc.execute(UserId::new(), request("mtn_share")).await;

        assert!(matches!(
            result,
            Err(PurchaseError::Wallet(WalletError::Conflict))
        ));
    }

    #[tokio::test]
    async fn test_recent_success_includes_reconciliation_rows() {
        let wallet = MockWalletStore::new();
        let mut ledger = MockTransactionLedger::new();
        let tasks = MockTaskQueue::new();
        let monnify = MockBillsProvider::new();
        let peyflex = MockVendProvider::new();

        ledger
            .expect_find_recent_success()
            .returning(|user, _, _, _, _| {
                let mut tx = VasTransaction::new_purchase(
                    user,
                    VasTransactionType::DATA,
                    "MTN".to_string(),
                    "08031234567".to_string(),
                    Kobo(50_000),
                    "FICORE_DATA_prev".to_string(),
                );
                tx.status = VasTransactionStatus::SUCCESS;
                tx.needs_reconciliation = true;
                Ok(Some(tx))
            });

        let uc = use_case(wallet, ledger, tasks, monnify, peyflex);
        let result = uc.execute(UserId::new(), request("mtn_share")).await;

        assert!(matches!(
            result,
            Err(PurchaseError::RecentDuplicate { .. })
        ));
    }
}
