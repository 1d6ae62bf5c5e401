use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::entities::{
    CorporateRevenueEntry, ExpenseEvent, Notification, PlanMismatchLog, ReferralPayout,
    SettlementPayload, TransactionTask, VasTransactionType,
};
use crate::domain::error::{SettlementError, TaskError};
use crate::domain::gateways::LedgerEventSink;
use crate::domain::product_match;
use crate::domain::pricing;
use crate::domain::repository::{
    MismatchLog, NotificationSender, ReferralStore, RevenueLedger, SuccessFields,
    TransactionLedger, UserStore, WalletStore,
};

/// Caso de uso: liquidación de una compra VAS ya aprobada por el proveedor.
///
/// El usuario ya recibió el servicio, así que el orden importa: primero el
/// débito (commit de la reserva), después todo lo demás. El commit es
/// idempotente, de modo que un reintento de la tarea nunca debita dos
/// veces; los pasos posteriores que fallen devuelven la tarea a la cola.
pub struct SettleTransactionUseCase {
    wallet_store: Arc<dyn WalletStore>,
    ledger: Arc<dyn TransactionLedger>,
    revenue: Arc<dyn RevenueLedger>,
    bookkeeping: Arc<dyn LedgerEventSink>,
    referrals: Arc<dyn ReferralStore>,
    users: Arc<dyn UserStore>,
    mismatches: Arc<dyn MismatchLog>,
    notifications: Arc<dyn NotificationSender>,
}

impl SettleTransactionUseCase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        wallet_store: Arc<dyn WalletStore>,
        ledger: Arc<dyn TransactionLedger>,
        revenue: Arc<dyn RevenueLedger>,
        bookkeeping: Arc<dyn LedgerEventSink>,
        referrals: Arc<dyn ReferralStore>,
        users: Arc<dyn UserStore>,
        mismatches: Arc<dyn MismatchLog>,
        notifications: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            wallet_store,
            ledger,
            revenue,
            bookkeeping,
            referrals,
            users,
            mismatches,
            notifications,
        }
    }

    #[tracing::instrument(name = "SettleTransactionUseCase::execute", skip(self, task))]
    pub async fn execute(&self, task: &TransactionTask) -> Result<(), SettlementError> {
        let payload: SettlementPayload = serde_json::from_value(task.payload.clone())
            .map_err(|e| SettlementError::InvalidPayload(TaskError::InvalidPayload(e.to_string())))?;

        // (a) Débito: commit de la reserva. Siempre primero y siempre
        // idempotente. Si esto falla no se toca nada más.
        self.wallet_store
            .commit_reservation(payload.reservation_id)
            .await
            .map_err(|e| SettlementError::Retryable(format!("commit failed: {}", e)))?;

        // (b) Promover la fila del ledger a SUCCESS.
        self.ledger
            .mark_success(
                payload.transaction_id,
                SuccessFields {
                    provider: payload.provider,
                    provider_reference: payload.provider_reference.clone(),
                    delivered_product_name: payload.delivered_product_name.clone(),
                    metadata: payload.provider_response.clone(),
                },
            )
            .await
            .map_err(|e| SettlementError::Retryable(format!("mark_success failed: {}", e)))?;

        // (c) Validar el producto entregado. Una divergencia no revierte el
        // SUCCESS: el proveedor entregó algo; decide un humano.
        if payload.tx_type == VasTransactionType::DATA {
            let check = product_match::check_delivery(
                payload.requested_plan_name.as_deref(),
                payload.face_value,
                payload.delivered_product_name.as_deref(),
                payload.delivered_amount,
            );

            if !check.matches {
                warn!(
                    "Plan mismatch on {}: requested '{}', delivered '{}'",
                    payload.transaction_id,
                    payload.requested_plan_name.as_deref().unwrap_or(""),
                    check.delivered_plan
                );

                self.ledger
                    .set_needs_reconciliation(payload.transaction_id)
                    .await
                    .map_err(|e| SettlementError::Retryable(e.to_string()))?;

                self.mismatches
                    .record(PlanMismatchLog {
                        id: Uuid::new_v4(),
                        user_id: payload.user_id,
                        transaction_id: payload.transaction_id,
                        provider: payload.provider,
                        requested_plan_id: payload.requested_plan_id.clone(),
                        requested_plan_name: payload.requested_plan_name.clone(),
                        requested_amount: payload.face_value,
                        delivered_plan: check.delivered_plan.clone(),
                        delivered_amount: payload.delivered_amount,
                        severity: "HIGH".to_string(),
                        refund_eligible: true,
                        user_notified: false,
                        created_at: Utc::now(),
                    })
                    .await
                    .map_err(|e| SettlementError::Retryable(e.to_string()))?;

                self.notifications
                    .notify(Notification {
                        id: Uuid::new_v4(),
                        user_id: None, // alerta a operadores
                        category: "plan_mismatch".to_string(),
                        title: "Plan mismatch requires review".to_string(),
                        body: format!(
                            "Transaction {} delivered '{}' instead of '{}'. Review and potentially refund difference.",
                            payload.transaction_id,
                            check.delivered_plan,
                            payload.requested_plan_name.as_deref().unwrap_or("")
                        ),
                        related_reference: Some(payload.provider_reference.clone()),
                        created_at: Utc::now(),
                    })
                    .await
                    .map_err(|e| SettlementError::Retryable(e.to_string()))?;
            }
        }

        // (d) Economía unitaria.
        let economics = pricing::commission_split(
            payload.provider,
            payload.tx_type,
            payload.face_value,
            payload.delivered_amount,
        )
        .map_err(|e| SettlementError::Retryable(e.to_string()))?;

        self.ledger
            .update_economics(payload.transaction_id, economics)
            .await
            .map_err(|e| SettlementError::Retryable(e.to_string()))?;

        // (e) Evento de gasto al módulo contable externo: el usuario gastó
        // el valor de cara en el servicio.
        self.bookkeeping
            .record_expense(ExpenseEvent {
                user_id: payload.user_id,
                amount: payload.face_value,
                description: payload.description.clone(),
                reference: payload.provider_reference.clone(),
                occurred_at: Utc::now(),
            })
            .await
            .map_err(|e| SettlementError::Retryable(e.to_string()))?;

        // (f) Ingreso corporativo por la comisión del vend.
        if economics.provider_commission.is_positive() {
            self.revenue
                .record(CorporateRevenueEntry::vas_commission(
                    payload.user_id,
                    payload.provider,
                    payload.tx_type,
                    economics.provider_commission,
                    economics.provider_commission_rate,
                    &payload.provider_reference,
                    &payload.network,
                ))
                .await
                .map_err(|e| SettlementError::Retryable(e.to_string()))?;
        }

        // (g) Gancho de referidos: 1% del valor de cara dentro de la
        // ventana de 90 días, retirable de inmediato.
        self.pay_referral_share(&payload).await?;

        // (h) Notificación al usuario.
        self.notifications
            .notify(Notification {
                id: Uuid::new_v4(),
                user_id: Some(payload.user_id),
                category: "vas".to_string(),
                title: "Purchase successful".to_string(),
                body: format!("{} completed successfully.", payload.description),
                related_reference: Some(payload.provider_reference.clone()),
                created_at: Utc::now(),
            })
            .await
            .map_err(|e| SettlementError::Retryable(e.to_string()))?;

        info!("Settlement completed for {}", payload.transaction_id);
        Ok(())
    }

    async fn pay_referral_share(&self, payload: &SettlementPayload) -> Result<(), SettlementError> {
        let referral = self
            .referrals
            .find_active_share(payload.user_id, Utc::now())
            .await
            .map_err(|e| SettlementError::Retryable(e.to_string()))?;

        let Some(referral) = referral else {
            return Ok(());
        };

        let share = pricing::vas_share(payload.face_value)
            .map_err(|e| SettlementError::Retryable(e.to_string()))?;
        if !share.is_positive() {
            return Ok(());
        }

        let payout = ReferralPayout::vas_share(
            &referral,
            share,
            payload.transaction_id,
            serde_json::json!({
                "vasAmount": payload.face_value,
                "shareRate": 0.01,
                "network": payload.network,
                "transactionType": payload.tx_type.as_str(),
            }),
        );

        self.referrals
            .record_payout(payout)
            .await
            .map_err(|e| SettlementError::Retryable(e.to_string()))?;

        self.users
            .increment_withdrawable(referral.referrer_id, share)
            .await
            .map_err(|e| SettlementError::Retryable(e.to_string()))?;

        self.revenue
            .record(CorporateRevenueEntry::referral_payout(
                referral.referrer_id,
                share,
                &payload.provider_reference,
            ))
            .await
            .map_err(|e| SettlementError::Retryable(e.to_string()))?;

        info!(
            "VAS share of {} paid to referrer {} for {}",
            share, referral.referrer_id, payload.transaction_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Provider, Referral, TaskKind, TaskStatus};
    use crate::domain::gateways::MockLedgerEventSink;
    use crate::domain::repository::{
        MockMismatchLog, MockNotificationSender, MockReferralStore, MockRevenueLedger,
        MockTransactionLedger, MockUserStore, MockWalletStore,
    };
    use crate::domain::types::{ReservationId, TaskId, TransactionId, UserId};
    use common::Kobo;
    use mockall::predicate::*;

    struct Mocks {
        wallet: MockWalletStore,
        ledger: MockTransactionLedger,
        revenue: MockRevenueLedger,
        bookkeeping: MockLedgerEventSink,
        referrals: MockReferralStore,
        users: MockUserStore,
        mismatches: MockMismatchLog,
        notifications: MockNotificationSender,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                wallet: MockWalletStore::new(),
                ledger: MockTransactionLedger::new(),
                revenue: MockRevenueLedger::new(),
                bookkeeping: MockLedgerEventSink::new(),
                referrals: MockReferralStore::new(),
                users: MockUserStore::new(),
                mismatches: MockMismatchLog::new(),
                notifications: MockNotificationSender::new(),
            }
        }

        fn build(self) -> SettleTransactionUseCase {
            SettleTransactionUseCase::new(
                Arc::new(self.wallet),
                Arc::new(self.ledger),
                Arc::new(self.revenue),
                Arc::new(self.bookkeeping),
                Arc::new(self.referrals),
                Arc::new(self.users),
                Arc::new(self.mismatches),
                Arc::new(self.notifications),
            )
        }
    }

    fn payload(tx_type: VasTransactionType, delivered: Option<&str>) -> SettlementPayload {
        SettlementPayload {
            transaction_id: TransactionId::new(),
            user_id: UserId::new(),
            reservation_id: ReservationId::new(),
            amount_to_debit: Kobo(20_000),
            face_value: Kobo(20_000),
            provider: Provider::Monnify,
            tx_type,
            network: "MTN".to_string(),
            description: "MTN Airtime - 08031234567".to_string(),
            requested_plan_id: None,
            requested_plan_name: None,
            delivered_product_name: delivered.map(str::to_string),
            delivered_amount: Some(Kobo(20_000)),
            provider_reference: "MFY|REF|1".to_string(),
            provider_response: serde_json::json!({}),
        }
    }

    fn task_for(payload: &SettlementPayload) -> TransactionTask {
        TransactionTask {
            id: TaskId::new(),
            kind: TaskKind::SETTLE_VAS,
            transaction_id: payload.transaction_id,
            payload: serde_json::to_value(payload).unwrap(),
            status: TaskStatus::PROCESSING,
            attempts: 0,
            last_error: None,
            lease_expires_at: None,
            next_run_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_settlement_commits_before_everything_else() {
        let mut mocks = Mocks::new();
        let payload = payload(VasTransactionType::AIRTIME, Some("Mobile Top Up"));
        let reservation_id = payload.reservation_id;

        mocks
            .wallet
            .expect_commit_reservation()
            .with(eq(reservation_id))
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .ledger
            .expect_mark_success()
            .times(1)
            .returning(|_, _| Ok(()));
        mocks
            .ledger
            .expect_update_economics()
            .withf(|_, econ| {
                // 3% de ₦200 → ₦6 de comisión, margen neto completo.
                econ.provider_commission == Kobo(600) && econ.net_margin == Kobo(600)
            })
            .times(1)
            .returning(|_, _| Ok(()));
        mocks
            .bookkeeping
            .expect_record_expense()
            .withf(|event| event.amount == Kobo(20_000))
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .revenue
            .expect_record()
            .withf(|entry| entry.entry_type == "VAS_COMMISSION" && entry.amount == Kobo(600))
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .referrals
            .expect_find_active_share()
            .returning(|_, _| Ok(None));
        mocks
            .notifications
            .expect_notify()
            .withf(|n| n.user_id.is_some())
            .times(1)
            .returning(|_| Ok(()));

        let uc = mocks.build();
        uc.execute(&task_for(&payload)).await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_failure_stops_the_settlement() {
        let mut mocks = Mocks::new();
        let payload = payload(VasTransactionType::AIRTIME, None);

        mocks
            .wallet
            .expect_commit_reservation()
            .returning(|_| Err(crate::domain::error::WalletError::Repository("db down".into())));
        // Nada más debe llamarse: sin débito no hay efectos.

        let uc = mocks.build();
        let result = uc.execute(&task_for(&payload)).await;

        assert!(matches!(result, Err(SettlementError::Retryable(_))));
    }

    #[tokio::test]
    async fn test_mismatch_keeps_success_and_flags_reconciliation() {
        let mut mocks = Mocks::new();
        let mut p = payload(VasTransactionType::DATA, Some("MTN 500MB 1 Day"));
        p.requested_plan_id = Some("1815".to_string());
        p.requested_plan_name = Some("MTN 2GB 30 Days".to_string());

        mocks
            .wallet
            .expect_commit_reservation()
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .ledger
            .expect_mark_success()
            .times(1)
            .returning(|_, _| Ok(()));
        // La divergencia marca conciliación pero nunca falla la transacción.
        mocks
            .ledger
            .expect_set_needs_reconciliation()
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .mismatches
            .expect_record()
            .withf(|log| log.severity == "HIGH" && log.refund_eligible)
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .notifications
            .expect_notify()
            .times(2) // alerta a operadores + notificación al usuario
            .returning(|_| Ok(()));
        mocks
            .ledger
            .expect_update_economics()
            .times(1)
            .returning(|_, _| Ok(()));
        mocks
            .bookkeeping
            .expect_record_expense()
            .times(1)
            .returning(|_| Ok(()));
        mocks.revenue.expect_record().times(1).returning(|_| Ok(()));
        mocks
            .referrals
            .expect_find_active_share()
            .returning(|_, _| Ok(None));

        let uc = mocks.build();
        uc.execute(&task_for(&p)).await.unwrap();
    }

    #[tokio::test]
    async fn test_referral_share_paid_inside_window() {
        let mut mocks = Mocks::new();
        let p = payload(VasTransactionType::AIRTIME, Some("Mobile Top Up"));
        let referrer = UserId::new();
        let referee = p.user_id;

        mocks
            .wallet
            .expect_commit_reservation()
            .returning(|_| Ok(()));
        mocks.ledger.expect_mark_success().returning(|_, _| Ok(()));
        mocks
            .ledger
            .expect_update_economics()
            .returning(|_, _| Ok(()));
        mocks
            .bookkeeping
            .expect_record_expense()
            .returning(|_| Ok(()));
        mocks
            .referrals
            .expect_find_active_share()
            .returning(move |_, _| {
                Ok(Some(Referral {
                    id: Uuid::new_v4(),
                    referrer_id: referrer,
                    referee_id: referee,
                    status: "active".to_string(),
                    deposit_bonus_granted: true,
                    vas_share_active: true,
                    vas_share_expires_at: Some(Utc::now() + chrono::Duration::days(30)),
                    first_deposit_at: Some(Utc::now()),
                    created_at: Utc::now(),
                }))
            });
        // 1% de ₦200 = ₦2.00, retirable de inmediato.
        mocks
            .referrals
            .expect_record_payout()
            .withf(|payout| {
                payout.amount == Kobo(200)
                    && payout.status == "WITHDRAWABLE"
                    && payout.payout_type == "VAS_SHARE"
            })
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .users
            .expect_increment_withdrawable()
            .with(eq(referrer), eq(Kobo(200)))
            .times(1)
            .returning(|_, _| Ok(()));
        // Dos filas de revenue: comisión y payout negativo.
        mocks
            .revenue
            .expect_record()
            .times(2)
            .returning(|_| Ok(()));
        mocks
            .notifications
            .expect_notify()
            .times(1)
            .returning(|_| Ok(()));

        let uc = mocks.build();
        uc.execute(&task_for(&p)).await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_not_retryable() {
        let mocks = Mocks::new();
        let uc = mocks.build();

        let task = TransactionTask {
            id: TaskId::new(),
            kind: TaskKind::SETTLE_VAS,
            transaction_id: TransactionId::new(),
            payload: serde_json::json!({"not": "a payload"}),
            status: TaskStatus::PROCESSING,
            attempts: 0,
            last_error: None,
            lease_expires_at: None,
            next_run_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let result = uc.execute(&task).await;
        assert!(matches!(result, Err(SettlementError::InvalidPayload(_))));
    }
}
