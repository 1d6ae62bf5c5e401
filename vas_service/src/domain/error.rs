use common::Kobo;
use thiserror::Error;

use crate::domain::types::{ReservationId, TransactionId, UserId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    #[error("Wallet not found for user: {0}")]
    NotFound(UserId),

    #[error("Wallet already exists for user: {0}")]
    AlreadyExists(UserId),

    #[error("Insufficient wallet balance. Required: ₦{required}, Available: ₦{available}", required = .required.to_naira(), available = .available.to_naira())]
    InsufficientFunds { required: Kobo, available: Kobo },

    #[error("Concurrent wallet update detected, please retry")]
    Conflict,

    #[error("Wallet is suspended for user: {0}")]
    Suspended(UserId),

    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Repository error: {0}")]
    Repository(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Transaction not found: {0}")]
    NotFound(TransactionId),

    #[error("Duplicate transaction reference: {0}")]
    DuplicateReference(String),

    #[error("Transaction {0} is in a terminal state and cannot be modified")]
    TerminalState(TransactionId),

    #[error("Repository error: {0}")]
    Repository(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Error de conexión o timeout: no sabemos si el proveedor recibió la
    /// orden. Nunca se reintenta con otra referencia.
    #[error("Provider unreachable: {0}")]
    Unreachable(String),

    /// 4xx con razón legible: entrada inválida, plan inexistente, etc.
    #[error("Provider rejected the request: {0}")]
    Rejected(String),

    /// 5xx o respuesta inconsistente del lado del proveedor.
    #[error("Provider error: {0}")]
    Api(String),

    #[error("Provider authentication failed: {0}")]
    Auth(String),

    #[error("Unknown data plan code: {0}")]
    UnknownPlanCode(String),

    #[error("Unparseable provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PurchaseError {
    #[error("{0}")]
    Validation(String),

    #[error("You recently completed a similar transaction. Please check your transaction history.")]
    RecentDuplicate { reference: String },

    #[error("A similar transaction is already being processed. Please wait.")]
    DuplicateInFlight,

    #[error("Unknown plan type: {0}")]
    UnknownPlanType(String),

    /// El proveedor elegido por el usuario falló y para datos no hay
    /// fallback implícito: se devuelven las alternativas de la red.
    #[error("Unable to complete purchase with selected plan type. {alternatives}")]
    ProviderUnavailable {
        reason: String,
        alternatives: String,
    },

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Repository error: {0}")]
    Repository(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WebhookError {
    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("Amount too small to process after fees")]
    AmountTooSmall,

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Repository error: {0}")]
    Repository(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PinError {
    #[error("PIN must be exactly 4 digits")]
    InvalidFormat,

    #[error("This PIN is too common. Please choose a different one.")]
    WeakPin,

    #[error("PIN already exists. Use change PIN instead.")]
    AlreadySet,

    #[error("PIN not set up. Please set up your transaction PIN first.")]
    NotSet,

    #[error("Too many failed attempts. Try again in {minutes_remaining} minutes.")]
    Locked { minutes_remaining: i64 },

    #[error("Incorrect PIN. {attempts_remaining} attempts remaining.")]
    Incorrect { attempts_remaining: i32 },

    #[error(transparent)]
    Wallet(#[from] WalletError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("Task payload could not be decoded: {0}")]
    InvalidPayload(String),

    #[error("Repository error: {0}")]
    Repository(String),
}

/// Error de un intento de liquidación. `Retryable` devuelve la tarea a la
/// cola con backoff; lo demás la marca FAILED de inmediato.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettlementError {
    #[error("Retryable settlement step failed: {0}")]
    Retryable(String),

    #[error(transparent)]
    InvalidPayload(#[from] TaskError),
}
