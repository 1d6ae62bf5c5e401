use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Kobo;
use rust_decimal::Decimal;
#[cfg(test)]
use mockall::automock;

use crate::domain::entities::{
    AdminAction, BankAccount, CorporateRevenueEntry, Notification, PlanMismatchLog, Provider,
    Referral, ReferralPayout, Reservation, TaskKind, TransactionTask, UnmatchedFunding, User,
    VasTransaction, VasTransactionStatus, VasTransactionType, Wallet,
};
use crate::domain::error::{LedgerError, TaskError, WalletError};
use crate::domain::types::{ReservationId, TaskId, TransactionId, UserId};

/// Resultado de un mutador idempotente de saldo: si la referencia ya estaba
/// aplicada se devuelve `AlreadyApplied` con el saldo vigente, sin tocar nada.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceChange {
    Applied { new_balance: Kobo },
    AlreadyApplied { balance: Kobo },
}

impl BalanceChange {
    pub fn balance(self) -> Kobo {
        match self {
            BalanceChange::Applied { new_balance } => new_balance,
            BalanceChange::AlreadyApplied { balance } => balance,
        }
    }
}

/// Campos que la liquidación estampa sobre la fila del ledger al promoverla
/// a SUCCESS.
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessFields {
    pub provider: Provider,
    pub provider_reference: String,
    pub delivered_product_name: Option<String>,
    pub metadata: serde_json::Value,
}

/// Economía unitaria calculada en la liquidación.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EconomicsFields {
    pub provider_cost: Kobo,
    pub provider_commission: Kobo,
    pub provider_commission_rate: Decimal,
    pub gateway_fee: Kobo,
    pub net_margin: Kobo,
    pub emergency_pricing: bool,
}

/// Puerto del Wallet Store: único mutador del estado monetario.
///
/// Contrato: cada mutador lleva una referencia de idempotencia; reintentar
/// con la misma referencia es un no-op. Cada mutador es atómico sobre
/// (billetera, reserva, línea de historial). La concurrencia es optimista:
/// en conflicto se devuelve `WalletError::Conflict` y el llamador reintenta
/// (acotado a 3).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn create(&self, wallet: Wallet) -> Result<Wallet, WalletError>;

    async fn find(&self, user_id: UserId) -> Result<Option<Wallet>, WalletError>;

    async fn get(&self, user_id: UserId) -> Result<Wallet, WalletError>;

    /// Acredita saldo. No-op si `reference` ya fue aplicada.
    async fn credit_balance(
        &self,
        user_id: UserId,
        amount: Kobo,
        reference: &str,
        description: &str,
    ) -> Result<BalanceChange, WalletError>;

    /// Debita saldo disponible directamente (ajustes administrativos).
    async fn debit_balance(
        &self,
        user_id: UserId,
        amount: Kobo,
        reference: &str,
        description: &str,
    ) -> Result<BalanceChange, WalletError>;

    /// Retiene fondos para una compra en vuelo.
    async fn reserve(
        &self,
        user_id: UserId,
        amount: Kobo,
        transaction_id: TransactionId,
    ) -> Result<ReservationId, WalletError>;

    /// HELD → COMMITTED: debita `balance`, libera `reserved_amount` y
    /// agrega la línea de historial, todo en un paso atómico. Repetir el
    /// commit de una reserva COMMITTED es un no-op; sobre una RELEASED es
    /// un error (el débito ya no está respaldado).
    async fn commit_reservation(&self, reservation_id: ReservationId) -> Result<(), WalletError>;

    /// HELD → RELEASED: libera la retención sin débito. Idempotente.
    async fn release_reservation(&self, reservation_id: ReservationId) -> Result<(), WalletError>;

    async fn find_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, WalletError>;

    /// `balance − Σ(reservas HELD)`.
    async fn available_balance(&self, user_id: UserId) -> Result<Kobo, WalletError>;

    async fn update_accounts(
        &self,
        user_id: UserId,
        account_reference: &str,
        accounts: &[BankAccount],
    ) -> Result<(), WalletError>;

    async fn set_pin(&self, user_id: UserId, hash: &str, salt: &str) -> Result<(), WalletError>;

    async fn record_pin_failure(
        &self,
        user_id: UserId,
        attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), WalletError>;

    async fn reset_pin_attempts(&self, user_id: UserId) -> Result<(), WalletError>;

    async fn clear_pin(&self, user_id: UserId) -> Result<(), WalletError>;

    /// Barrido: reservas HELD más viejas que el umbral pasan a RELEASED.
    /// Devuelve cuántas se liberaron.
    async fn release_stale_reservations(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<u64, WalletError>;
}

/// Resultado de insertar una fila de fondeo protegida por índice único.
#[derive(Debug, Clone, PartialEq)]
pub enum FundingInsert {
    Inserted(TransactionId),
    /// La referencia ya existía: el webhook es una repetición.
    AlreadyProcessed,
}

/// Puerto del Transaction Ledger: dueño exclusivo de `vas_transactions`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    /// Inserta la fila centinela FAILED/"in-progress" antes de llamar al
    /// proveedor.
    async fn create_in_progress(&self, tx: VasTransaction) -> Result<TransactionId, LedgerError>;

    /// Promueve la fila a SUCCESS. Solo permitido desde el centinela
    /// FAILED/"in-progress" o desde PENDING; los terminales se rechazan.
    async fn mark_success(
        &self,
        id: TransactionId,
        fields: SuccessFields,
    ) -> Result<(), LedgerError>;

    /// Registra el fallo real (reemplaza la razón centinela).
    async fn mark_failed(&self, id: TransactionId, reason: &str) -> Result<(), LedgerError>;

    async fn update_economics(
        &self,
        id: TransactionId,
        economics: EconomicsFields,
    ) -> Result<(), LedgerError>;

    async fn set_needs_reconciliation(&self, id: TransactionId) -> Result<(), LedgerError>;

    async fn set_settlement_failed(&self, id: TransactionId) -> Result<(), LedgerError>;

    /// Inserta una fila SUCCESS de fondeo; colisión de referencia única
    /// significa webhook repetido.
    async fn insert_funding(&self, tx: VasTransaction) -> Result<FundingInsert, LedgerError>;

    /// Marca confirmación del proveedor sobre una compra existente
    /// (webhook de actividad sobre AIRTIME/DATA). Si estaba PENDING la
    /// promueve a SUCCESS. Devuelve la fila si existía.
    async fn confirm_provider_webhook(
        &self,
        reference: &str,
        metadata: serde_json::Value,
    ) -> Result<Option<VasTransaction>, LedgerError>;

    async fn find_by_id(&self, id: TransactionId) -> Result<Option<VasTransaction>, LedgerError>;

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<VasTransaction>, LedgerError>;

    /// Guardia anti doble clic: éxito reciente con la misma forma.
    async fn find_recent_success(
        &self,
        user_id: UserId,
        tx_type: VasTransactionType,
        amount: Kobo,
        phone_number: &str,
        window_minutes: i64,
    ) -> Result<Option<VasTransaction>, LedgerError>;

    /// Compra en vuelo con la misma forma dentro de la ventana.
    async fn find_in_flight(
        &self,
        user_id: UserId,
        tx_type: VasTransactionType,
        amount: Kobo,
        phone_number: &str,
        window_minutes: i64,
    ) -> Result<Option<VasTransaction>, LedgerError>;

    /// Convierte una fila de fondeo no terminal a SUCCESS (webhook tardío
    /// sobre un registro previo).
    async fn promote_funding(
        &self,
        id: TransactionId,
        amount_paid: Kobo,
        metadata: serde_json::Value,
    ) -> Result<(), LedgerError>;

    /// Vista unificada paginada, más recientes primero.
    async fn list_for_user(
        &self,
        user_id: UserId,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<VasTransaction>, i64), LedgerError>;

    /// Estado autoritativo de un lote de referencias del cliente.
    async fn statuses_for_references(
        &self,
        user_id: UserId,
        references: Vec<String>,
    ) -> Result<Vec<(String, Option<VasTransactionStatus>)>, LedgerError>;

    /// Fila KYC pendiente unida por referencia (resolución de usuario del
    /// webhook, prioridad 3).
    async fn find_pending_kyc(
        &self,
        reference: &str,
    ) -> Result<Option<VasTransaction>, LedgerError>;

    async fn record_unmatched_funding(
        &self,
        event: UnmatchedFunding,
    ) -> Result<(), LedgerError>;
}

/// Puerto de la cola durable de liquidación.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(
        &self,
        kind: TaskKind,
        transaction_id: TransactionId,
        payload: serde_json::Value,
    ) -> Result<TaskId, TaskError>;

    /// Reclama la siguiente tarea lista, de forma que a lo sumo un worker
    /// la tome (PENDING → PROCESSING con lease).
    async fn claim_next(&self, lease_seconds: i64) -> Result<Option<TransactionTask>, TaskError>;

    async fn complete(&self, task_id: TaskId) -> Result<(), TaskError>;

    /// Devuelve la tarea a PENDING con backoff exponencial.
    async fn retry_later(
        &self,
        task_id: TaskId,
        attempts: i32,
        error: &str,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), TaskError>;

    async fn fail(&self, task_id: TaskId, error: &str) -> Result<(), TaskError>;

    /// Tareas PROCESSING cuyo lease venció vuelven a PENDING.
    async fn release_expired_leases(&self) -> Result<u64, TaskError>;

    async fn pending_for_user(&self, user_id: UserId) -> Result<Vec<TransactionTask>, TaskError>;
}

/// Contabilidad corporativa interna (una fila por evento económico).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RevenueLedger: Send + Sync {
    async fn record(&self, entry: CorporateRevenueEntry) -> Result<(), LedgerError>;
}

/// Registro de divergencias plan pedido vs entregado.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MismatchLog: Send + Sync {
    async fn record(&self, entry: PlanMismatchLog) -> Result<(), LedgerError>;
}

/// Puerto de referidos: el core solo toca estos ganchos.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReferralStore: Send + Sync {
    async fn find_for_referee(&self, referee: UserId) -> Result<Option<Referral>, LedgerError>;

    /// Relación con ventana de VAS share activa y vigente a `now`.
    async fn find_active_share(
        &self,
        referee: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<Referral>, LedgerError>;

    /// Activa la relación tras el primer depósito: bono otorgado y ventana
    /// de 90 días en marcha.
    async fn activate(
        &self,
        referral_id: uuid::Uuid,
        share_expires_at: DateTime<Utc>,
    ) -> Result<(), LedgerError>;

    async fn record_payout(&self, payout: ReferralPayout) -> Result<(), LedgerError>;
}

/// Usuarios: lectura para decisiones de precio y escritura de banderas.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find(&self, user_id: UserId) -> Result<Option<User>, LedgerError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, LedgerError>;

    async fn mark_first_deposit(&self, user_id: UserId) -> Result<(), LedgerError>;

    /// Acredita créditos FiCore y deja el asiento en `credit_transactions`.
    async fn grant_ficore_credits(
        &self,
        user_id: UserId,
        amount: Decimal,
        description: &str,
    ) -> Result<(), LedgerError>;

    /// Incrementa el saldo retirable del referente (payouts VAS share).
    async fn increment_withdrawable(
        &self,
        user_id: UserId,
        amount: Kobo,
    ) -> Result<(), LedgerError>;

    async fn increment_referral_count(&self, user_id: UserId) -> Result<(), LedgerError>;
}

/// Emisor de notificaciones (usuario u operadores).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), LedgerError>;
}

/// Auditoría de acciones administrativas.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AdminAuditLog: Send + Sync {
    async fn record(&self, action: AdminAction) -> Result<(), LedgerError>;
}
