use chrono::{DateTime, Utc};
use common::Kobo;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::types::{ReservationId, TaskId, TransactionId, UserId, WalletId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "wallet_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reservation_state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationState {
    HELD,
    COMMITTED,
    RELEASED,
}

impl ReservationState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReservationState::HELD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vas_transaction_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VasTransactionType {
    WALLET_FUNDING,
    AIRTIME,
    DATA,
    KYC_VERIFICATION,
    ADMIN_REFUND,
    ADMIN_DEDUCTION,
}

impl VasTransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            VasTransactionType::WALLET_FUNDING => "WALLET_FUNDING",
            VasTransactionType::AIRTIME => "AIRTIME",
            VasTransactionType::DATA => "DATA",
            VasTransactionType::KYC_VERIFICATION => "KYC_VERIFICATION",
            VasTransactionType::ADMIN_REFUND => "ADMIN_REFUND",
            VasTransactionType::ADMIN_DEDUCTION => "ADMIN_DEDUCTION",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vas_transaction_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VasTransactionStatus {
    FAILED,
    PENDING,
    SUCCESS,
    NEEDS_RECONCILIATION,
}

impl VasTransactionStatus {
    /// Una fila en estado terminal nunca vuelve a mutarse, con la única
    /// excepción del centinela FAILED/"in-progress" que marca una compra en
    /// vuelo.
    pub fn is_terminal(self) -> bool {
        !matches!(self, VasTransactionStatus::PENDING)
    }
}

/// Razón centinela con la que nace toda fila de compra: si el proceso muere
/// a mitad del flujo queda un registro honesto en vez de un PENDING mudo.
pub const IN_PROGRESS_REASON: &str = "in-progress";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vas_provider", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Monnify,
    Peyflex,
    Internal,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Monnify => "monnify",
            Provider::Peyflex => "peyflex",
            Provider::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    PENDING,
    PROCESSING,
    DONE,
    FAILED,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    SETTLE_VAS,
}

/// Cuenta bancaria reservada emitida por el proveedor de fondeo. Se guarda
/// tal cual en la billetera (columna JSONB).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    #[serde(rename = "bankName")]
    pub bank_name: String,
    #[serde(rename = "bankCode")]
    pub bank_code: String,
    #[serde(rename = "accountNumber")]
    pub account_number: String,
    #[serde(rename = "accountName")]
    pub account_name: String,
}

/// Modelo de Entidad: Wallet.
///
/// La billetera es el saldo de registro del usuario: `balance` es el total
/// depositado, `reserved_amount` la suma de reservas vivas, y el disponible
/// es la diferencia. Solo el Wallet Store muta estos campos, siempre con
/// bloqueo optimista sobre `version`.
///
/// Invariante: `balance ≥ reserved_amount ≥ 0` en reposo y en cada frontera
/// de commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Kobo,
    pub reserved_amount: Kobo,
    pub account_reference: Option<String>,
    pub accounts: Vec<BankAccount>,
    pub status: WalletStatus,
    // El material del PIN jamás sale en respuestas de la API.
    #[serde(skip_serializing, default)]
    pub pin_hash: Option<String>,
    #[serde(skip_serializing, default)]
    pub pin_salt: Option<String>,
    pub pin_attempts: i32,
    pub pin_locked_until: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Crea una billetera nueva, vacía y activa, para un usuario.
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: WalletId::new(),
            user_id,
            balance: Kobo::ZERO,
            reserved_amount: Kobo::ZERO,
            account_reference: None,
            accounts: Vec::new(),
            status: WalletStatus::Active,
            pin_hash: None,
            pin_salt: None,
            pin_attempts: 0,
            pin_locked_until: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Saldo gastable: total menos lo retenido por reservas HELD.
    pub fn available_balance(&self) -> Kobo {
        self.balance - self.reserved_amount
    }

    pub fn has_pin(&self) -> bool {
        self.pin_hash.is_some() && self.pin_salt.is_some()
    }

    pub fn is_pin_locked(&self, now: DateTime<Utc>) -> bool {
        self.pin_locked_until.map(|until| until > now).unwrap_or(false)
    }
}

/// Reserva de fondos mientras una llamada al proveedor está en vuelo.
///
/// Ciclo de vida: HELD → COMMITTED (débito aplicado) o HELD → RELEASED
/// (fallo del proveedor, sin débito). Los estados terminales son inmutables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub user_id: UserId,
    pub amount: Kobo,
    pub transaction_id: TransactionId,
    pub state: ReservationState,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Fila append-only del ledger de transacciones VAS.
///
/// `request_id` y `transaction_reference` llevan el mismo valor para las
/// compras: es la llave de idempotencia de toda la intención (proveedor,
/// webhook y cola de tareas incluidos).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VasTransaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub tx_type: VasTransactionType,
    pub subtype: Option<String>,
    pub network: Option<String>,
    pub phone_number: Option<String>,
    pub data_plan_id: Option<String>,
    pub data_plan_name: Option<String>,
    /// Valor de cara del servicio (lo que el usuario ve).
    pub amount: Kobo,
    /// Precio de venta. Política de valor de cara: igual a `amount`.
    pub selling_price: Kobo,
    /// Total debitado de la billetera.
    pub total_amount: Kobo,
    pub status: VasTransactionStatus,
    pub failure_reason: Option<String>,
    pub provider: Option<Provider>,
    pub request_id: String,
    pub transaction_reference: String,
    // Economía unitaria, se completa en la liquidación.
    pub provider_cost: Option<Kobo>,
    pub provider_commission: Option<Kobo>,
    pub provider_commission_rate: Option<Decimal>,
    pub gateway_fee: Kobo,
    pub net_margin: Option<Kobo>,
    pub is_premium_user: bool,
    pub needs_reconciliation: bool,
    pub settlement_failed: bool,
    pub emergency_pricing: bool,
    pub provider_confirmed: bool,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Vencimiento de intenciones que esperan un pago externo (p. ej. KYC).
    pub expires_at: Option<DateTime<Utc>>,
}

impl VasTransaction {
    /// Fila de compra recién autorizada, en el estado centinela
    /// FAILED/"in-progress" (se crea antes de tocar al proveedor).
    pub fn new_purchase(
        user_id: UserId,
        tx_type: VasTransactionType,
        network: String,
        phone_number: String,
        amount: Kobo,
        request_id: String,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            user_id,
            tx_type,
            subtype: None,
            network: Some(network),
            phone_number: Some(phone_number),
            data_plan_id: None,
            data_plan_name: None,
            amount,
            selling_price: amount,
            total_amount: amount,
            status: VasTransactionStatus::FAILED,
            failure_reason: Some(IN_PROGRESS_REASON.to_string()),
            provider: None,
            transaction_reference: request_id.clone(),
            request_id,
            provider_cost: None,
            provider_commission: None,
            provider_commission_rate: None,
            gateway_fee: Kobo::ZERO,
            net_margin: None,
            is_premium_user: false,
            needs_reconciliation: false,
            settlement_failed: false,
            emergency_pricing: false,
            provider_confirmed: false,
            metadata: None,
            created_at: Utc::now(),
            completed_at: None,
            expires_at: None,
        }
    }

    /// Fila de fondeo exitosa, lista para insertarse tras verificar el
    /// webhook. `amount` es lo acreditado (ya neto de la cuota de depósito).
    #[allow(clippy::too_many_arguments)]
    pub fn new_funding(
        user_id: UserId,
        amount_credited: Kobo,
        amount_paid: Kobo,
        gateway_fee: Kobo,
        is_premium: bool,
        reference: String,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            user_id,
            tx_type: VasTransactionType::WALLET_FUNDING,
            subtype: None,
            network: None,
            phone_number: None,
            data_plan_id: None,
            data_plan_name: None,
            amount: amount_credited,
            selling_price: amount_credited,
            total_amount: amount_paid,
            status: VasTransactionStatus::SUCCESS,
            failure_reason: None,
            provider: Some(Provider::Monnify),
            request_id: reference.clone(),
            transaction_reference: reference,
            provider_cost: None,
            provider_commission: None,
            provider_commission_rate: None,
            gateway_fee,
            net_margin: None,
            is_premium_user: is_premium,
            needs_reconciliation: false,
            settlement_failed: false,
            emergency_pricing: false,
            provider_confirmed: true,
            metadata: Some(metadata),
            created_at: now,
            completed_at: Some(now),
            expires_at: None,
        }
    }

    /// Ajuste administrativo (reembolso o deducción) aplicado como movimiento
    /// interno de billetera, idempotente sobre la referencia del llamador.
    pub fn new_admin_adjustment(
        user_id: UserId,
        tx_type: VasTransactionType,
        amount: Kobo,
        reference: String,
        reason: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            user_id,
            tx_type,
            subtype: Some(reason),
            network: None,
            phone_number: None,
            data_plan_id: None,
            data_plan_name: None,
            amount,
            selling_price: amount,
            total_amount: amount,
            status: VasTransactionStatus::SUCCESS,
            failure_reason: None,
            provider: Some(Provider::Internal),
            request_id: reference.clone(),
            transaction_reference: reference,
            provider_cost: None,
            provider_commission: None,
            provider_commission_rate: None,
            gateway_fee: Kobo::ZERO,
            net_margin: None,
            is_premium_user: false,
            needs_reconciliation: false,
            settlement_failed: false,
            emergency_pricing: false,
            provider_confirmed: false,
            metadata: None,
            created_at: now,
            completed_at: Some(now),
            expires_at: None,
        }
    }
}

/// Tarea durable de trabajo post-proveedor. Si el proceso cae después de un
/// vend exitoso, la tarea garantiza que el débito y los efectos visibles se
/// completen igual.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionTask {
    pub id: TaskId,
    pub kind: TaskKind,
    pub transaction_id: TransactionId,
    pub payload: serde_json::Value,
    pub status: TaskStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub next_run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Carga de una tarea SETTLE_VAS: todo lo que el worker necesita para
/// liquidar sin releer el contexto de la petición original.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementPayload {
    pub transaction_id: TransactionId,
    pub user_id: UserId,
    pub reservation_id: ReservationId,
    pub amount_to_debit: Kobo,
    pub face_value: Kobo,
    pub provider: Provider,
    pub tx_type: VasTransactionType,
    pub network: String,
    pub description: String,
    pub requested_plan_id: Option<String>,
    pub requested_plan_name: Option<String>,
    pub delivered_product_name: Option<String>,
    pub delivered_amount: Option<Kobo>,
    pub provider_reference: String,
    pub provider_response: serde_json::Value,
}

/// Una fila por evento económico que el negocio gana o incurre.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorporateRevenueEntry {
    pub id: Uuid,
    pub entry_type: String,
    pub category: String,
    /// Puede ser negativo (p. ej. payouts de referidos, costo de pasarela
    /// en depósitos premium).
    pub amount: Kobo,
    pub user_id: Option<UserId>,
    pub related_transaction: String,
    pub description: String,
    pub gateway_fee: Option<Kobo>,
    pub net_revenue: Option<Kobo>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl CorporateRevenueEntry {
    pub fn vas_commission(
        user_id: UserId,
        provider: Provider,
        tx_type: VasTransactionType,
        commission: Kobo,
        rate: Decimal,
        reference: &str,
        network: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entry_type: "VAS_COMMISSION".to_string(),
            category: format!("{}_{}", provider.as_str().to_uppercase(), tx_type.as_str()),
            amount: commission,
            user_id: Some(user_id),
            related_transaction: reference.to_string(),
            description: format!(
                "{} {}% commission on {} sale",
                provider.as_str(),
                rate * Decimal::from(100),
                tx_type.as_str().to_lowercase()
            ),
            gateway_fee: None,
            net_revenue: None,
            metadata: Some(serde_json::json!({ "network": network })),
            created_at: Utc::now(),
        }
    }

    pub fn deposit_fee(
        user_id: UserId,
        fee: Kobo,
        gateway_fee: Kobo,
        net_revenue: Kobo,
        reference: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entry_type: "SERVICE_FEE".to_string(),
            category: "DEPOSIT_FEE".to_string(),
            amount: fee,
            user_id: Some(user_id),
            related_transaction: reference.to_string(),
            description: format!("Deposit fee from user {}", user_id),
            gateway_fee: Some(gateway_fee),
            net_revenue: Some(net_revenue),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn gateway_cost(user_id: UserId, gateway_fee: Kobo, reference: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            entry_type: "GATEWAY_COST".to_string(),
            category: "DEPOSIT_GATEWAY_FEE".to_string(),
            amount: -gateway_fee,
            user_id: Some(user_id),
            related_transaction: reference.to_string(),
            description: format!("Gateway cost on premium deposit, user {}", user_id),
            gateway_fee: Some(gateway_fee),
            net_revenue: Some(-gateway_fee),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn kyc_fee(user_id: UserId, fee: Kobo, reference: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            entry_type: "SERVICE_FEE".to_string(),
            category: "KYC_VERIFICATION".to_string(),
            amount: fee,
            user_id: Some(user_id),
            related_transaction: reference.to_string(),
            description: format!("KYC verification fee from user {}", user_id),
            gateway_fee: None,
            net_revenue: Some(fee),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn referral_payout(referrer_id: UserId, amount: Kobo, reference: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            entry_type: "REFERRAL_PAYOUT".to_string(),
            category: "VAS_SHARE".to_string(),
            amount: -amount,
            user_id: Some(referrer_id),
            related_transaction: reference.to_string(),
            description: format!("VAS share payout to referrer {}", referrer_id),
            gateway_fee: None,
            net_revenue: Some(-amount),
            metadata: None,
            created_at: Utc::now(),
        }
    }
}

/// Evento de gasto emitido al módulo contable externo (ingresos/egresos del
/// usuario). El core crea eventos; nunca muta asientos ajenos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseEvent {
    pub user_id: UserId,
    pub amount: Kobo,
    pub description: String,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Registro de divergencia entre plan pedido y plan entregado. El proveedor
/// entregó algo, así que la transacción sigue SUCCESS; decide un humano.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanMismatchLog {
    pub id: Uuid,
    pub user_id: UserId,
    pub transaction_id: TransactionId,
    pub provider: Provider,
    pub requested_plan_id: Option<String>,
    pub requested_plan_name: Option<String>,
    pub requested_amount: Kobo,
    pub delivered_plan: String,
    pub delivered_amount: Option<Kobo>,
    pub severity: String,
    pub refund_eligible: bool,
    pub user_notified: bool,
    pub created_at: DateTime<Utc>,
}

/// Relación de referido, tocada por el core solo en sus ganchos: bono de
/// primer depósito y ventana de 90 días de participación en VAS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    pub id: Uuid,
    pub referrer_id: UserId,
    pub referee_id: UserId,
    pub status: String,
    pub deposit_bonus_granted: bool,
    pub vas_share_active: bool,
    pub vas_share_expires_at: Option<DateTime<Utc>>,
    pub first_deposit_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Payout a un referente. Los VAS share son WITHDRAWABLE de inmediato.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralPayout {
    pub id: Uuid,
    pub referrer_id: UserId,
    pub referee_id: UserId,
    pub referral_id: Uuid,
    pub payout_type: String,
    pub amount: Kobo,
    pub status: String,
    pub source_transaction: TransactionId,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl ReferralPayout {
    pub fn vas_share(
        referral: &Referral,
        amount: Kobo,
        source_transaction: TransactionId,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            referrer_id: referral.referrer_id,
            referee_id: referral.referee_id,
            referral_id: referral.id,
            payout_type: "VAS_SHARE".to_string(),
            amount,
            status: "WITHDRAWABLE".to_string(),
            source_transaction,
            metadata: Some(metadata),
            created_at: Utc::now(),
        }
    }
}

/// Usuario, de solo lectura para el core salvo banderas puntuales
/// (primer depósito, créditos FiCore, saldo retirable de referidos).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub full_name: String,
    pub is_admin: bool,
    pub is_subscribed: bool,
    pub subscription_plan: Option<String>,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub ficore_credit_balance: Decimal,
    pub withdrawable_balance: Kobo,
    pub first_deposit_completed: bool,
    pub referral_count: i32,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Premium = suscripción activa, o vigente por fechas, o admin. Los
    /// premium no pagan cuota de depósito.
    pub fn is_premium(&self, now: DateTime<Utc>) -> bool {
        if self.is_subscribed || self.is_admin {
            return true;
        }
        self.subscription_end_date
            .map(|end| end > now)
            .unwrap_or(false)
    }
}

/// Línea del historial de movimientos de la billetera. La referencia única
/// es lo que hace idempotentes los créditos y débitos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletHistoryEntry {
    pub id: Uuid,
    pub wallet_id: WalletId,
    pub user_id: UserId,
    pub direction: HistoryDirection,
    pub amount: Kobo,
    pub balance_after: Kobo,
    pub reference: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "history_direction", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryDirection {
    CREDIT,
    DEBIT,
}

/// Notificación persistida. `user_id = None` significa alerta a operadores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Option<UserId>,
    pub category: String,
    pub title: String,
    pub body: String,
    pub related_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Registro de auditoría de acciones administrativas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminAction {
    pub id: Uuid,
    pub admin_id: UserId,
    pub action: String,
    pub target_user: UserId,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Webhook de fondeo que no pudo mapearse a un usuario. Se conserva para
/// conciliación manual; nunca se acredita ni se descarta en silencio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmatchedFunding {
    pub id: Uuid,
    pub transaction_reference: String,
    pub amount_paid: Kobo,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Plan de datos tal como lo expone el catálogo de un proveedor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPlan {
    pub plan_id: String,
    pub name: String,
    pub amount: Kobo,
    pub validity: Option<String>,
    pub provider: Provider,
}

/// Opción de familia de planes que el usuario elige antes de comprar datos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanTypeOption {
    pub id: String,
    pub provider: Provider,
    pub network_code: String,
    pub label: String,
    pub description: String,
}

/// Red telefónica disponible para un servicio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub id: String,
    pub name: String,
    pub available: bool,
}
