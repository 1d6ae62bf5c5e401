pub mod error;
pub mod purchase_routes;
pub mod response;
pub mod wallet_routes;

use axum::http::HeaderMap;

use crate::api::error::ApiError;
use crate::domain::types::UserId;
use crate::use_cases::{
    admin_adjust::AdminAdjustUseCase, buy_airtime::BuyAirtimeUseCase, buy_data::BuyDataUseCase,
    catalog::CatalogUseCase, create_wallet::CreateWalletUseCase, get_balance::GetBalanceUseCase,
    list_transactions::ListTransactionsUseCase, manage_pin::ManagePinUseCase,
    pending_tasks::PendingTasksUseCase, process_webhook::ProcessWebhookUseCase,
};

// Estado compartido de la aplicación: un caso de uso por operación.
pub struct AppState {
    pub create_wallet: CreateWalletUseCase,
    pub get_balance: GetBalanceUseCase,
    pub buy_airtime: BuyAirtimeUseCase,
    pub buy_data: BuyDataUseCase,
    pub catalog: CatalogUseCase,
    pub webhook: ProcessWebhookUseCase,
    pub pin: ManagePinUseCase,
    pub transactions: ListTransactionsUseCase,
    pub pending_tasks: PendingTasksUseCase,
    pub admin_adjust: AdminAdjustUseCase,
}

// La autenticación es un colaborador externo: aquí solo se lee la
// identidad que el gateway ya verificó.
// Header: x-user-id requerido
pub fn user_from_headers(headers: &HeaderMap) -> Result<UserId, ApiError> {
    let raw = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Validation("Missing x-user-id header".to_string()))?;

    raw.parse::<uuid::Uuid>()
        .map(UserId)
        .map_err(|_| ApiError::Validation("Invalid x-user-id header".to_string()))
}

// Header: x-admin-id requerido para operaciones administrativas
pub fn admin_from_headers(headers: &HeaderMap) -> Result<UserId, ApiError> {
    let raw = headers
        .get("x-admin-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Forbidden("Missing x-admin-id header".to_string()))?;

    raw.parse::<uuid::Uuid>()
        .map(UserId)
        .map_err(|_| ApiError::Forbidden("Invalid x-admin-id header".to_string()))
}
