use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use common::{reference as refs, Kobo};

use crate::domain::entities::{
    CorporateRevenueEntry, Notification, UnmatchedFunding, VasTransaction, VasTransactionStatus,
};
use crate::domain::error::{WalletError, WebhookError};
use crate::domain::pricing;
use crate::domain::repository::{
    BalanceChange, FundingInsert, NotificationSender, ReferralStore, RevenueLedger,
    TransactionLedger, UserStore, WalletStore,
};
use crate::domain::types::UserId;
use crate::domain::webhook::{self, ParsedWebhook};
use crate::use_cases::CONFLICT_RETRIES;

type HmacSha512 = Hmac<Sha512>;

/// Días de vigencia de la participación VAS del referente tras el primer
/// depósito del referido.
const VAS_SHARE_DAYS: i64 = 90;
/// Créditos FiCore del bono de bienvenida por referido.
const REFERRAL_CREDITS: i64 = 5;

/// Resultado de procesar un webhook de fondeo. Todos los Acknowledged se
/// responden 200 para que el proveedor no reintente por siempre.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// Evento reconocido pero sin acción (actividad de cuenta, estados no
    /// finales, usuario no identificado).
    Acknowledged(&'static str),
    /// Confirmación de una compra VAS existente; nunca acredita saldo.
    VasConfirmed,
    /// Pago de verificación KYC aplicado a su fila pendiente.
    KycProcessed,
    /// Fondeo acreditado a la billetera.
    Credited {
        user_id: UserId,
        amount_credited: Kobo,
        new_balance: Kobo,
    },
    /// Referencia ya procesada: replay inofensivo.
    AlreadyProcessed,
}

/// Caso de uso: webhook de fondeo del proveedor de cuentas reservadas.
///
/// La firma HMAC-SHA-512 del cuerpo crudo y el índice único sobre la
/// referencia hacen que el mismo cuerpo firmado pueda llegar N veces sin
/// acreditar dos veces.
pub struct ProcessWebhookUseCase {
    secret_key: String,
    wallet_store: Arc<dyn WalletStore>,
    ledger: Arc<dyn TransactionLedger>,
    revenue: Arc<dyn RevenueLedger>,
    referrals: Arc<dyn ReferralStore>,
    users: Arc<dyn UserStore>,
    notifications: Arc<dyn NotificationSender>,
}

impl ProcessWebhookUseCase {
    pub fn new(
        secret_key: String,
        wallet_store: Arc<dyn WalletStore>,
        ledger: Arc<dyn TransactionLedger>,
        revenue: Arc<dyn RevenueLedger>,
        referrals: Arc<dyn ReferralStore>,
        users: Arc<dyn UserStore>,
        notifications: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            secret_key,
            wallet_store,
            ledger,
            revenue,
            referrals,
            users,
            notifications,
        }
    }

    /// Verifica la firma sobre el cuerpo crudo, antes de parsear nada.
    fn verify_signature(&self, raw_body: &[u8], signature: &str) -> Result<(), WebhookError> {
        let provided = hex::decode(signature.trim().to_lowercase())
            .map_err(|_| WebhookError::InvalidSignature)?;

        let mut mac = HmacSha512::new_from_slice(self.secret_key.as_bytes())
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(raw_body);
        mac.verify_slice(&provided)
            .map_err(|_| WebhookError::InvalidSignature)
    }

    #[tracing::instrument(name = "ProcessWebhookUseCase::execute", skip(self, raw_body, signature))]
    pub async fn execute(
        &self,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<WebhookOutcome, WebhookError> {
        self.verify_signature(raw_body, signature)?;

        let body: serde_json::Value = serde_json::from_slice(raw_body)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        let event = webhook::parse(&body)?;

        if event.is_account_activity() {
            return Ok(WebhookOutcome::Acknowledged("Account activity acknowledged"));
        }
        if !event.should_process() {
            info!(
                "Webhook received but not processed - status: {:?}, completed: {}",
                event.payment_status, event.completed
            );
            return Ok(WebhookOutcome::Acknowledged("Webhook received"));
        }

        // Un webhook sobre una compra AIRTIME/DATA existente es una
        // confirmación del proveedor, nunca un fondeo.
        if !event.transaction_reference.is_empty() {
            if let Some(existing) = self
                .ledger
                .confirm_provider_webhook(&event.transaction_reference, event.raw.clone())
                .await?
            {
                info!(
                    "VAS confirmation webhook for {} ({})",
                    event.transaction_reference, existing.id
                );
                return Ok(WebhookOutcome::VasConfirmed);
            }
        }

        if !event.amount_paid.is_positive() {
            warn!("Zero or negative webhook amount, ignoring");
            return Ok(WebhookOutcome::Acknowledged("Zero amount ignored"));
        }

        // Resolución de usuario, en orden de prioridad: referencia de
        // cuenta reservada, correo del cliente, fila KYC pendiente.
        if let Some(user_id) = self.resolve_user(&event).await? {
            return self.apply_funding(user_id, &event).await;
        }

        if event.amount_paid >= pricing::KYC_FEE {
            if let Some(pending) = self
                .ledger
                .find_pending_kyc(&event.transaction_reference)
                .await?
            {
                return self.apply_kyc_payment(pending, &event).await;
            }
        }

        // Nadie reclama el evento: se conserva para conciliación y se
        // responde 200 para no bloquear los reintentos del proveedor.
        warn!(
            "Could not identify user for webhook reference {}",
            event.transaction_reference
        );
        self.record_unmatched(&event).await?;
        Ok(WebhookOutcome::Acknowledged("Acknowledged but unprocessed"))
    }

    async fn resolve_user(&self, event: &ParsedWebhook) -> Result<Option<UserId>, WebhookError> {
        if let Some(account_ref) = event.account_reference.as_deref() {
            if let Some(user) = refs::parse_account_reference(account_ref) {
                return Ok(Some(UserId(user)));
            }
        }

        if let Some(email) = event.customer_email.as_deref() {
            if !email.is_empty() {
                if let Some(user) = self
                    .users
                    .find_by_email(email)
                    .await
                    .map_err(|e| WebhookError::Repository(e.to_string()))?
                {
                    info!("Webhook user resolved via customer email");
                    return Ok(Some(user.id));
                }
            }
        }

        Ok(None)
    }

    async fn apply_funding(
        &self,
        user_id: UserId,
        event: &ParsedWebhook,
    ) -> Result<WebhookOutcome, WebhookError> {
        let reference = event.transaction_reference.clone();

        // Idempotencia a nivel de fila: SUCCESS previo es un replay.
        let mut existing_row = None;
        if let Some(existing) = self.ledger.find_by_reference(&reference).await? {
            if existing.status == VasTransactionStatus::SUCCESS {
                info!("Duplicate SUCCESS webhook ignored: {}", reference);
                return Ok(WebhookOutcome::AlreadyProcessed);
            }
            existing_row = Some(existing);
        }

        let user = self
            .users
            .find(user_id)
            .await
            .map_err(|e| WebhookError::Repository(e.to_string()))?;
        let is_premium = user
            .as_ref()
            .map(|u| u.is_premium(Utc::now()))
            .unwrap_or(false);

        let split = pricing::funding_split(event.amount_paid, is_premium)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

        // Un depósito que no cubre la cuota se rechaza: acreditar ₦0 (o
        // negativo) sería mentirle al usuario.
        if !split.amount_to_credit.is_positive() {
            warn!(
                "Funding amount too small after fee: paid {}, fee {}",
                event.amount_paid.to_naira(),
                split.deposit_fee.to_naira()
            );
            return Err(WebhookError::AmountTooSmall);
        }

        match existing_row {
            Some(existing) => {
                // Fila previa no terminal (registro anticipado): se promueve
                // en lugar de insertar una segunda.
                self.ledger
                    .promote_funding(existing.id, event.amount_paid, event.raw.clone())
                    .await?;
            }
            None => {
                let tx = VasTransaction::new_funding(
                    user_id,
                    split.amount_to_credit,
                    event.amount_paid,
                    split.gateway_fee,
                    is_premium,
                    reference.clone(),
                    event.raw.clone(),
                );
                if let FundingInsert::AlreadyProcessed = self.ledger.insert_funding(tx).await? {
                    info!("Funding reference already recorded: {}", reference);
                    return Ok(WebhookOutcome::AlreadyProcessed);
                }
            }
        }

        let new_balance = match self
            .credit_with_retry(user_id, split.amount_to_credit, &reference)
            .await
        {
            Ok(balance) => balance,
            Err(WalletError::NotFound(_)) => {
                // El fondeo llegó antes de que la billetera replicara: se
                // conserva el evento y se reconoce sin acreditar.
                warn!("Wallet not found for funding webhook, keeping for reconciliation");
                self.record_unmatched(event).await?;
                return Ok(WebhookOutcome::Acknowledged("Acknowledged but unprocessed"));
            }
            Err(e) => return Err(e.into()),
        };

        // Contabilidad corporativa del depósito.
        if split.deposit_fee.is_positive() {
            self.revenue
                .record(CorporateRevenueEntry::deposit_fee(
                    user_id,
                    split.deposit_fee,
                    split.gateway_fee,
                    split.net_deposit_revenue,
                    &reference,
                ))
                .await
                .map_err(|e| WebhookError::Repository(e.to_string()))?;
        } else {
            self.revenue
                .record(CorporateRevenueEntry::gateway_cost(
                    user_id,
                    split.gateway_fee,
                    &reference,
                ))
                .await
                .map_err(|e| WebhookError::Repository(e.to_string()))?;
        }

        // Bono de primer depósito para usuarios referidos.
        let first_deposit = user
            .as_ref()
            .map(|u| !u.first_deposit_completed)
            .unwrap_or(false);
        if first_deposit {
            self.users
                .mark_first_deposit(user_id)
                .await
                .map_err(|e| WebhookError::Repository(e.to_string()))?;
            self.grant_first_deposit_bonus(user_id, split.deposit_fee, &reference)
                .await?;
        }

        let final_balance = self
            .notify_funded(user_id, split.amount_to_credit, new_balance, &reference)
            .await;

        info!(
            "Wallet funding applied: user={} paid={} fee={} credited={}",
            user_id,
            event.amount_paid.to_naira(),
            split.deposit_fee.to_naira(),
            split.amount_to_credit.to_naira()
        );

        Ok(WebhookOutcome::Credited {
            user_id,
            amount_credited: split.amount_to_credit,
            new_balance: final_balance,
        })
    }

    async fn credit_with_retry(
        &self,
        user_id: UserId,
        amount: Kobo,
        reference: &str,
    ) -> Result<Kobo, WalletError> {
        let mut last_error = WalletError::Conflict;
        for _ in 0..CONFLICT_RETRIES {
            match self
                .wallet_store
                .credit_balance(user_id, amount, reference, "Wallet funding")
                .await
            {
                Ok(BalanceChange::Applied { new_balance }) => return Ok(new_balance),
                Ok(BalanceChange::AlreadyApplied { balance }) => return Ok(balance),
                Err(WalletError::Conflict) => last_error = WalletError::Conflict,
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    async fn grant_first_deposit_bonus(
        &self,
        user_id: UserId,
        deposit_fee: Kobo,
        reference: &str,
    ) -> Result<(), WebhookError> {
        let referral = self
            .referrals
            .find_for_referee(user_id)
            .await
            .map_err(|e| WebhookError::Repository(e.to_string()))?;

        let Some(referral) = referral else {
            return Ok(());
        };
        if referral.deposit_bonus_granted {
            return Ok(());
        }

        info!(
            "First deposit by referred user {}, activating referral {}",
            user_id, referral.id
        );

        // Bono 1: devolver la cuota de depósito.
        if deposit_fee.is_positive() {
            let refund_reference = format!("{}-FEE-REFUND", reference);
            if let Err(e) = self
                .credit_with_retry(user_id, deposit_fee, &refund_reference)
                .await
            {
                return Err(WebhookError::Wallet(e));
            }
        }

        // Bono 2: créditos FiCore de bienvenida.
        self.users
            .grant_ficore_credits(
                user_id,
                rust_decimal::Decimal::from(REFERRAL_CREDITS),
                "Referral signup bonus - Welcome to FiCore!",
            )
            .await
            .map_err(|e| WebhookError::Repository(e.to_string()))?;

        // Activar la ventana de 90 días del referente.
        self.referrals
            .activate(referral.id, Utc::now() + Duration::days(VAS_SHARE_DAYS))
            .await
            .map_err(|e| WebhookError::Repository(e.to_string()))?;
        self.users
            .increment_referral_count(referral.referrer_id)
            .await
            .map_err(|e| WebhookError::Repository(e.to_string()))?;

        Ok(())
    }

    async fn notify_funded(
        &self,
        user_id: UserId,
        amount_credited: Kobo,
        new_balance: Kobo,
        reference: &str,
    ) -> Kobo {
        // El saldo pudo moverse por el reembolso de cuota; se relee solo
        // para el mensaje.
        let balance = self
            .wallet_store
            .get(user_id)
            .await
            .map(|w| w.balance)
            .unwrap_or(new_balance);

        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: Some(user_id),
            category: "wallet".to_string(),
            title: "Wallet Funded Successfully".to_string(),
            body: format!(
                "₦{} added to your wallet. New balance: ₦{}",
                amount_credited.to_naira(),
                balance.to_naira()
            ),
            related_reference: Some(reference.to_string()),
            created_at: Utc::now(),
        };

        if let Err(e) = self.notifications.notify(notification).await {
            warn!("Failed to create funding notification: {}", e);
        }
        balance
    }

    async fn apply_kyc_payment(
        &self,
        pending: VasTransaction,
        event: &ParsedWebhook,
    ) -> Result<WebhookOutcome, WebhookError> {
        self.ledger
            .promote_funding(pending.id, event.amount_paid, event.raw.clone())
            .await?;

        self.revenue
            .record(CorporateRevenueEntry::kyc_fee(
                pending.user_id,
                pricing::KYC_FEE,
                &event.transaction_reference,
            ))
            .await
            .map_err(|e| WebhookError::Repository(e.to_string()))?;

        info!(
            "KYC verification payment processed for user {}",
            pending.user_id
        );
        Ok(WebhookOutcome::KycProcessed)
    }

    async fn record_unmatched(&self, event: &ParsedWebhook) -> Result<(), WebhookError> {
        self.ledger
            .record_unmatched_funding(UnmatchedFunding {
                id: Uuid::new_v4(),
                transaction_reference: event.transaction_reference.clone(),
                amount_paid: event.amount_paid,
                payload: event.raw.clone(),
                created_at: Utc::now(),
            })
            .await?;

        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: None,
            category: "webhook".to_string(),
            title: "Unmatched funding webhook".to_string(),
            body: format!(
                "Funding of ₦{} with reference {} could not be mapped to a wallet.",
                event.amount_paid.to_naira(),
                event.transaction_reference
            ),
            related_reference: Some(event.transaction_reference.clone()),
            created_at: Utc::now(),
        };
        if let Err(e) = self.notifications.notify(notification).await {
            warn!("Failed to record unmatched-webhook alert: {}", e);
        }
        Ok(())
    }
}
