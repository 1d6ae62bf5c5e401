use std::sync::Arc;
use tracing::{error, info, warn};

use common::{phone, reference};

use crate::domain::entities::{SettlementPayload, TaskKind, VasTransaction, VasTransactionType};
use crate::domain::error::{ProviderError, PurchaseError, WalletError};
use crate::domain::gateways::{BillsProvider, VendProvider, VendSuccess};
use crate::domain::pricing;
use crate::domain::repository::{TaskQueue, TransactionLedger, WalletStore};
use crate::domain::routing;
use crate::domain::types::{ReservationId, TransactionId, UserId};
use crate::use_cases::{PurchaseReceipt, CONFLICT_RETRIES, DUPLICATE_WINDOW_MINUTES};

/// Solicitud de compra de airtime ya deserializada.
#[derive(Debug, Clone)]
pub struct AirtimeRequest {
    pub phone_number: String,
    pub network: String,
    pub amount: common::Kobo,
}

/// Caso de uso: compra de airtime de extremo a extremo.
///
/// Orquesta el contrato completo: validaciones → guardias de duplicado →
/// fila centinela en el ledger → reserva de fondos → vend → encolar la
/// liquidación. El débito real NUNCA ocurre aquí; lo aplica el worker al
/// confirmar la reserva.
///
/// Airtime es el único producto con fallback entre proveedores: si Monnify
/// falla se intenta Peyflex una vez con el mismo request id.
pub struct BuyAirtimeUseCase {
    wallet_store: Arc<dyn WalletStore>,
    ledger: Arc<dyn TransactionLedger>,
    task_queue: Arc<dyn TaskQueue>,
    monnify: Arc<dyn BillsProvider>,
    peyflex: Arc<dyn VendProvider>,
}

impl BuyAirtimeUseCase {
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

    #[tracing::instrument(name = "BuyAirtimeUseCase::execute", skip(self, request))]
    pub async fn execute(
        &self,
        user_id: UserId,
        request: AirtimeRequest,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        // 1. Validación de entrada, antes de tocar ningún estado.
        let phone_number = phone::normalize(&request.phone_number)
            .ok_or_else(|| PurchaseError::Validation("Invalid phone number".to_string()))?;

        if !routing::is_known_network(&request.network) {
            return Err(PurchaseError::Validation(format!(
                "Unknown network: {}",
                request.network
            )));
        }
        pricing::validate_airtime_amount(request.amount)?;

        // 2. Valor de cara: el usuario paga exactamente lo que ve.
        let amount = request.amount;
        let total_amount = amount;

        // 3-4. Guardias de duplicado (éxito reciente y compra en vuelo).
        if let Some(recent) = self
            .ledger
            .find_recent_success(
                user_id,
                VasTransactionType::AIRTIME,
                amount,
                &phone_number,
                DUPLICATE_WINDOW_MINUTES,
            )
            .await?
        {
            warn!(
                "Recent successful airtime transaction found for user {}, blocking duplicate",
                user_id
            );
            return Err(PurchaseError::RecentDuplicate {
                reference: recent.request_id,
            });
        }

        if self
            .ledger
            .find_in_flight(
                user_id,
                VasTransactionType::AIRTIME,
                amount,
                &phone_number,
                DUPLICATE_WINDOW_MINUTES,
            )
            .await?
            .is_some()
        {
            return Err(PurchaseError::DuplicateInFlight);
        }

        // 5. Saldo disponible (total − reservas vivas).
        let available = self.wallet_store.available_balance(user_id).await?;
        if available < total_amount {
            return Err(WalletError::InsufficientFunds {
                required: total_amount,
                available,
            }
            .into());
        }

        // 6-7. Fila centinela antes de cualquier efecto externo: si el
        // proceso muere aquí queda un FAILED honesto, no un PENDING mudo.
        let request_id = reference::generate_request_id("AIRTIME", user_id.0);
        let network = request.network.to_uppercase();
        let tx = VasTransaction::new_purchase(
            user_id,
            VasTransactionType::AIRTIME,
            network.clone(),
            phone_number.clone(),
            amount,
            request_id.clone(),
        );
        let transaction_id = self.ledger.create_in_progress(tx).await?;

        // 8. Reserva de fondos con reintento acotado ante conflicto.
        let reservation_id = match self
            .reserve_with_retry(user_id, total_amount, transaction_id)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                let _ = self.ledger.mark_failed(transaction_id, &e.to_string()).await;
                return Err(e);
            }
        };

        // 9. Vend: Monnify primero, Peyflex como único fallback permitido.
        let vend = match self
            .monnify
            .vend_airtime(
                &routing::monnify_network(&network),
                amount,
                &phone_number,
                &request_id,
            )
            .await
        {
            Ok(vend) => vend,
            Err(monnify_error) => {
                warn!("Monnify airtime failed, falling back: {}", monnify_error);

                match self
                    .peyflex
                    .vend_airtime(
                        &routing::peyflex_airtime_network(&network),
                        amount,
                        &phone_number,
                        &request_id,
                    )
                    .await
                {
                    Ok(vend) => vend,
                    Err(peyflex_error) => {
                        let combined = format!(
                            "Both providers failed. Monnify: {}, Peyflex: {}",
                            monnify_error, peyflex_error
                        );
                        error!("Airtime purchase failed: {}", combined);

                        self.release_and_fail(reservation_id, transaction_id, &combined)
                            .await;
                        return Err(PurchaseError::Provider(ProviderError::Api(combined)));
                    }
                }
            }
        };

        // 10. Proveedor exitoso: la liquidación viaja por la cola durable.
        self.enqueue_settlement(
            user_id,
            transaction_id,
            reservation_id,
            total_amount,
            amount,
            &network,
            &phone_number,
            &vend,
        )
        .await?;

        let available_balance = self
            .wallet_store
            .available_balance(user_id)
            .await
            .unwrap_or(available - total_amount);

        info!(
            "Airtime purchase queued: user={} ref={} provider={:?}",
            user_id, request_id, vend.provider
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

    async fn reserve_with_retry(
        &self,
        user_id: UserId,
        amount: common::Kobo,
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

    async fn release_and_fail(
        &self,
        reservation_id: ReservationId,
        transaction_id: TransactionId,
        reason: &str,
    ) {
        if let Err(e) = self.wallet_store.release_reservation(reservation_id).await {
            error!("Failed to release reservation {}: {}", reservation_id, e);
        }
        let _ = self.ledger.mark_failed(transaction_id, reason).await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn enqueue_settlement(
        &self,
        user_id: UserId,
        transaction_id: TransactionId,
        reservation_id: ReservationId,
        amount_to_debit: common::Kobo,
        face_value: common::Kobo,
        network: &str,
        phone_number: &str,
        vend: &VendSuccess,
    ) -> Result<(), PurchaseError> {
        let payload = SettlementPayload {
            transaction_id,
            user_id,
            reservation_id,
            amount_to_debit,
            face_value,
            provider: vend.provider,
            tx_type: VasTransactionType::AIRTIME,
            network: network.to_string(),
            description: format!("{} Airtime - {}", network, phone_number),
            requested_plan_id: None,
            requested_plan_name: None,
            delivered_product_name: vend.product_name.clone(),
            delivered_amount: vend.vend_amount,
            provider_reference: vend.transaction_reference.clone(),
            provider_response: vend.raw.clone(),
        };

        let payload_json = serde_json::to_value(&payload)
            .map_err(|e| PurchaseError::Repository(e.to_string()))?;

        // El vend ya ocurrió: perder esta tarea sería regalar el servicio.
        // Se insiste antes de rendirse y dejar el caso a un operador.
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
    use crate::domain::entities::Provider;
    use crate::domain::gateways::{MockBillsProvider, MockVendProvider, VendSuccess};
    use crate::domain::repository::{
        MockTaskQueue, MockTransactionLedger, MockWalletStore,
    };
    use common::Kobo;
    use mockall::predicate::*;

    fn vend_success(provider: Provider) -> VendSuccess {
        VendSuccess {
            provider,
            transaction_reference: "MFY|REF|1".to_string(),
            vend_reference: "FICORE_AIRTIME_x".to_string(),
            product_name: Some("Mobile Top Up".to_string()),
            vend_amount: Some(Kobo(20_000)),
            commission: Some(Kobo(600)),
            raw: serde_json::json!({}),
        }
    }

    fn request() -> AirtimeRequest {
        AirtimeRequest {
            phone_number: "08031234567".to_string(),
            network: "mtn".to_string(),
            amount: Kobo(20_000),
        }
    }

    fn use_case(
        wallet: MockWalletStore,
        ledger: MockTransactionLedger,
        tasks: MockTaskQueue,
        monnify: MockBillsProvider,
        peyflex: MockVendProvider,
    ) -> BuyAirtimeUseCase {
        BuyAirtimeUseCase::new(
            Arc::new(wallet),
            Arc::new(ledger),
            Arc::new(tasks),
            Arc::new(monnify),
            Arc::new(peyflex),
        )
    }

    #[tokio::test]
    async fn test_happy_path_reserves_and_queues_settlement() {
        // Arrange
        let mut wallet = MockWalletStore::new();
        let mut ledger = MockTransactionLedger::new();
        let mut tasks = MockTaskQueue::new();
        let mut monnify = MockBillsProvider::new();
        let peyflex = MockVendProvider::new();

        let user = UserId::new();
        let reservation = ReservationId::new();

        ledger.expect_find_recent_success().returning(|_, _, _, _, _| Ok(None));
        ledger.expect_find_in_flight().returning(|_, _, _, _, _| Ok(None));
        // Saldo 500.00, sin reservas.
        wallet
            .expect_available_balance()
            .returning(|_| Ok(Kobo(50_000)));
        ledger
            .expect_create_in_progress()
            .withf(|tx: &VasTransaction| {
                tx.status == crate::domain::entities::VasTransactionStatus::FAILED
                    && tx.failure_reason.as_deref() == Some("in-progress")
                    && tx.total_amount == tx.amount
            })
            .times(1)
            .returning(|tx| Ok(tx.id));
        wallet
            .expect_reserve()
            .withf(move |_, amount, _| *amount == Kobo(20_000))
            .times(1)
            .returning(move |_, _, _| Ok(reservation));
        monnify
            .expect_vend_airtime()
            .times(1)
            .returning(|_, _, _, _| Ok(vend_success(Provider::Monnify)));
        tasks
            .expect_enqueue()
            .withf(|kind, _, payload| {
                *kind == TaskKind::SETTLE_VAS
                    && payload["amount_to_debit"] == serde_json::json!("200.00")
            })
            .times(1)
            .returning(|_, id, _| Ok(crate::domain::types::TaskId(id.0)));

        let uc = use_case(wallet, ledger, tasks, monnify, peyflex);

        // Act
        let receipt = uc.execute(user, request()).await.unwrap();

        // Assert: el débito no ocurrió aquí, solo quedó reservado.
        assert_eq!(receipt.processing_status, "QUEUED");
        assert_eq!(receipt.provider, Provider::Monnify);
        assert_eq!(receipt.total_amount, Kobo(20_000));
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_no_trace() {
        // Arrange: saldo 150.00 contra una compra de 200.00.
        let mut wallet = MockWalletStore::new();
        let mut ledger = MockTransactionLedger::new();
        let tasks = MockTaskQueue::new();
        let monnify = MockBillsProvider::new();
        let peyflex = MockVendProvider::new();

        ledger.expect_find_recent_success().returning(|_, _, _, _, _| Ok(None));
        ledger.expect_find_in_flight().returning(|_, _, _, _, _| Ok(None));
        wallet
            .expect_available_balance()
            .returning(|_| Ok(Kobo(15_000)));
        // Sin expectativas de create_in_progress ni reserve: no deben
        // llamarse.

        let uc = use_case(wallet, ledger, tasks, monnify, peyflex);

        // Act
        let result = uc.execute(UserId::new(), request()).await;

        // Assert
        match result.unwrap_err() {
            PurchaseError::Wallet(WalletError::InsufficientFunds { available, .. }) => {
                assert_eq!(available, Kobo(15_000));
            }
            other => panic!("Expected InsufficientFunds, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recent_duplicate_is_rejected_with_reference() {
        let wallet = MockWalletStore::new();
        let mut ledger = MockTransactionLedger::new();
        let tasks = MockTaskQueue::new();
        let monnify = MockBillsProvider::new();
        let peyflex = MockVendProvider::new();

        ledger.expect_find_recent_success().returning(|user, _, _, _, _| {
            let mut tx = VasTransaction::new_purchase(
                user,
                VasTransactionType::AIRTIME,
                "MTN".to_string(),
                "08031234567".to_string(),
                Kobo(20_000),
                "FICORE_AIRTIME_prev".to_string(),
            );
            tx.status = crate::domain::entities::VasTransactionStatus::SUCCESS;
            Ok(Some(tx))
        });

        let uc = use_case(wallet, ledger, tasks, monnify, peyflex);
        let result = uc.execute(UserId::new(), request()).await;

        match result.unwrap_err() {
            PurchaseError::RecentDuplicate { reference } => {
                assert_eq!(reference, "FICORE_AIRTIME_prev");
            }
            other => panic!("Expected RecentDuplicate, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_monnify_failure_falls_back_to_peyflex() {
        let mut wallet = MockWalletStore::new();
        let mut ledger = MockTransactionLedger::new();
        let mut tasks = MockTaskQueue::new();
        let mut monnify = MockBillsProvider::new();
        let mut peyflex = MockVendProvider::new();

        let reservation = ReservationId::new();

        ledger.expect_find_recent_success().returning(|_, _, _, _, _| Ok(None));
        ledger.expect_find_in_flight().returning(|_, _, _, _, _| Ok(None));
        wallet
            .expect_available_balance()
            .returning(|_| Ok(Kobo(50_000)));
        ledger.expect_create_in_progress().returning(|tx| Ok(tx.id));
        wallet
            .expect_reserve()
            .returning(move |_, _, _| Ok(reservation));
        monnify
            .expect_vend_airtime()
            .times(1)
            .returning(|_, _, _, _| Err(ProviderError::Unreachable("timeout".to_string())));
        peyflex
            .expect_vend_airtime()
            .withf(|network, _, _, _| network == "mtn")
            .times(1)
            .returning(|_, _, _, _| Ok(vend_success(Provider::Peyflex)));
        tasks
            .expect_enqueue()
            .times(1)
            .returning(|_, id, _| Ok(crate::domain::types::TaskId(id.0)));

        let uc = use_case(wallet, ledger, tasks, monnify, peyflex);
        let receipt = uc.execute(UserId::new(), request()).await.unwrap();

        assert_eq!(receipt.provider, Provider::Peyflex);
    }

    #[tokio::test]
    async fn test_both_providers_failing_releases_reservation() {
        let mut wallet = MockWalletStore::new();
        let mut ledger = MockTransactionLedger::new();
        let tasks = MockTaskQueue::new();
        let mut monnify = MockBillsProvider::new();
        let mut peyflex = MockVendProvider::new();

        let reservation = ReservationId::new();

        ledger.expect_find_recent_success().returning(|_, _, _, _, _| Ok(None));
        ledger.expect_find_in_flight().returning(|_, _, _, _, _| Ok(None));
        wallet
            .expect_available_balance()
            .returning(|_| Ok(Kobo(50_000)));
        ledger.expect_create_in_progress().returning(|tx| Ok(tx.id));
        wallet
            .expect_reserve()
            .returning(move |_, _, _| Ok(reservation));
        monnify
            .expect_vend_airtime()
            .returning(|_, _, _, _| Err(ProviderError::Api("down".to_string())));
        peyflex
            .expect_vend_airtime()
            .returning(|_, _, _, _| Err(ProviderError::Rejected("denied".to_string())));
        // La reserva DEBE liberarse y la fila quedar FAILED con la razón real.
        wallet
            .expect_release_reservation()
            .with(eq(reservation))
            .times(1)
            .returning(|_| Ok(()));
        ledger
            .expect_mark_failed()
            .withf(|_, reason| reason.contains("Both providers failed"))
            .times(1)
            .returning(|_, _| Ok(()));

        let uc = use_case(wallet, ledger, tasks, monnify, peyflex);
        let result = uc.execute(UserId::new(), request()).await;

        assert!(matches!(result, Err(PurchaseError::Provider(_))));
    }

    #[tokio::test]
    async fn test_invalid_amount_rejected_before_any_state() {
        let wallet = MockWalletStore::new();
        let ledger = MockTransactionLedger::new();
        let tasks = MockTaskQueue::new();
        let monnify = MockBillsProvider::new();
        let peyflex = MockVendProvider::new();

        let uc = use_case(wallet, ledger, tasks, monnify, peyflex);

        let mut req = request();
        req.amount = Kobo(5_000); // ₦50, bajo el mínimo
        let result = uc.execute(UserId::new(), req).await;

        assert!(matches!(result, Err(PurchaseError::Validation(_))));
    }
}
