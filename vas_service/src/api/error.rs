use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::error::{
    LedgerError, PinError, ProviderError, PurchaseError, TaskError, WalletError, WebhookError,
};

// Error unificado de la API del servicio VAS.
#[derive(Debug)]
pub enum ApiError {
    Wallet(WalletError),
    Purchase(PurchaseError),
    Webhook(WebhookError),
    Pin(PinError),
    Ledger(LedgerError),
    Task(TaskError),
    Validation(String),
    Forbidden(String),
}

impl From<WalletError> for ApiError {
    fn from(err: WalletError) -> Self {
        ApiError::Wallet(err)
    }
}

impl From<PurchaseError> for ApiError {
    fn from(err: PurchaseError) -> Self {
        ApiError::Purchase(err)
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        ApiError::Webhook(err)
    }
}

impl From<PinError> for ApiError {
    fn from(err: PinError) -> Self {
        ApiError::Pin(err)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        ApiError::Task(err)
    }
}

fn wallet_status(err: &WalletError) -> StatusCode {
    match err {
        WalletError::NotFound(_) => StatusCode::NOT_FOUND,
        WalletError::AlreadyExists(_) => StatusCode::CONFLICT,
        WalletError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
        WalletError::Conflict => StatusCode::CONFLICT,
        WalletError::Suspended(_) => StatusCode::FORBIDDEN,
        WalletError::ReservationNotFound(_) => StatusCode::NOT_FOUND,
        WalletError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        WalletError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn provider_status(err: &ProviderError) -> StatusCode {
    match err {
        // Accionables por el cliente: reintentar o elegir otra familia.
        ProviderError::Unreachable(_)
        | ProviderError::Rejected(_)
        | ProviderError::Api(_)
        | ProviderError::UnknownPlanCode(_) => StatusCode::BAD_REQUEST,
        ProviderError::Auth(_) | ProviderError::InvalidResponse(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, errors) = match &self {
            ApiError::Wallet(e) => (wallet_status(e), e.to_string(), json!(null)),
            ApiError::Purchase(e) => match e {
                PurchaseError::Validation(_) | PurchaseError::UnknownPlanType(_) => {
                    (StatusCode::BAD_REQUEST, e.to_string(), json!(null))
                }
                PurchaseError::RecentDuplicate { reference } => (
                    StatusCode::CONFLICT,
                    e.to_string(),
                    json!({ "reference": reference }),
                ),
                PurchaseError::DuplicateInFlight => {
                    (StatusCode::CONFLICT, e.to_string(), json!(null))
                }
                PurchaseError::ProviderUnavailable {
                    reason,
                    alternatives,
                } => (
                    StatusCode::BAD_REQUEST,
                    e.to_string(),
                    json!({ "reason": reason, "alternatives": alternatives }),
                ),
                PurchaseError::Wallet(inner) => {
                    (wallet_status(inner), inner.to_string(), json!(null))
                }
                PurchaseError::Provider(inner) => {
                    (provider_status(inner), inner.to_string(), json!(null))
                }
                PurchaseError::Ledger(inner) => match inner {
                    LedgerError::DuplicateReference(r) => (
                        StatusCode::CONFLICT,
                        inner.to_string(),
                        json!({ "reference": r }),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                        json!(null),
                    ),
                },
                PurchaseError::Repository(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    json!(null),
                ),
            },
            ApiError::Webhook(e) => match e {
                WebhookError::InvalidSignature => {
                    (StatusCode::UNAUTHORIZED, e.to_string(), json!(null))
                }
                WebhookError::MalformedPayload(_) | WebhookError::AmountTooSmall => {
                    (StatusCode::BAD_REQUEST, e.to_string(), json!(null))
                }
                WebhookError::Wallet(inner) => {
                    (wallet_status(inner), inner.to_string(), json!(null))
                }
                WebhookError::Ledger(_) | WebhookError::Repository(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Webhook processing failed".to_string(),
                    json!(null),
                ),
            },
            ApiError::Pin(e) => match e {
                PinError::Locked { minutes_remaining } => (
                    StatusCode::LOCKED,
                    e.to_string(),
                    json!({ "lockoutMinutes": minutes_remaining }),
                ),
                PinError::Incorrect { attempts_remaining } => (
                    StatusCode::BAD_REQUEST,
                    e.to_string(),
                    json!({ "attemptsRemaining": attempts_remaining }),
                ),
                PinError::InvalidFormat | PinError::WeakPin | PinError::AlreadySet
                | PinError::NotSet => (StatusCode::BAD_REQUEST, e.to_string(), json!(null)),
                PinError::Wallet(inner) => (wallet_status(inner), inner.to_string(), json!(null)),
            },
            ApiError::Ledger(e) => match e {
                LedgerError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string(), json!(null)),
                LedgerError::DuplicateReference(r) => (
                    StatusCode::CONFLICT,
                    e.to_string(),
                    json!({ "reference": r }),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    json!(null),
                ),
            },
            ApiError::Task(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                json!(null),
            ),
            ApiError::Validation(message) => {
                (StatusCode::BAD_REQUEST, message.clone(), json!(null))
            }
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message.clone(), json!(null)),
        };

        let body = Json(json!({
            "success": false,
            "message": message,
            "errors": errors,
        }));

        (status, body).into_response()
    }
}
