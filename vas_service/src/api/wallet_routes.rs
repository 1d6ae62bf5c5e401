use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use common::Kobo;

use crate::api::error::ApiError;
use crate::api::response::ApiResponse;
use crate::api::{admin_from_headers, user_from_headers, AppState};
use crate::domain::types::UserId;
use crate::use_cases::process_webhook::WebhookOutcome;

// Definicion de rutas de billetera
pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/wallet/create", post(create_wallet))
        .route("/wallet/balance", get(wallet_balance))
        .route("/wallet/balance/current", get(current_balance))
        .route("/wallet/webhook", post(funding_webhook))
        .route("/wallet/pin/setup", post(pin_setup))
        .route("/wallet/pin/validate", post(pin_validate))
        .route("/wallet/pin/change", post(pin_change))
        .route("/wallet/pin/status", get(pin_status))
        .route("/wallet/pin/admin-reset", post(pin_admin_reset))
        .route("/wallet/transactions/all", get(all_transactions))
        .route("/wallet/transactions/sync", post(sync_transactions))
        .route("/wallet/pending-tasks", get(pending_tasks))
        .route("/wallet/admin/refund", post(admin_refund))
        .route("/wallet/admin/deduct", post(admin_deduct))
        .with_state(state)
}

// Handler: Crear billetera y cuenta bancaria reservada
// POST /wallet/create
#[utoipa::path(
    post,
    path = "/wallet/create",
    responses((status = 201, description = "Wallet with reserved bank accounts"))
)]
pub async fn create_wallet(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user_id = user_from_headers(&headers)?;
    let wallet = state.create_wallet.execute(user_id).await?;

    Ok(Json(ApiResponse::success_with_message(
        serde_json::to_value(&wallet).unwrap_or_default(),
        "Wallet ready",
    )))
}

// Handler: Saldos completos (total, reservado, disponible, cuentas)
// GET /wallet/balance
#[utoipa::path(
    get,
    path = "/wallet/balance",
    responses((status = 200, description = "Total, reserved and available balances"))
)]
pub async fn wallet_balance(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user_id = user_from_headers(&headers)?;
    let view = state.get_balance.execute(user_id).await?;

    Ok(Json(ApiResponse::success(
        serde_json::to_value(&view).unwrap_or_default(),
    )))
}

// Handler: Saldo liviano para polling (cadencia de 3 s del cliente)
// GET /wallet/balance/current
#[utoipa::path(
    get,
    path = "/wallet/balance/current",
    responses((status = 200, description = "Lightweight balance snapshot"))
)]
pub async fn current_balance(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user_id = user_from_headers(&headers)?;
    let view = state.get_balance.current(user_id).await?;

    Ok(Json(ApiResponse::success(
        serde_json::to_value(&view).unwrap_or_default(),
    )))
}

// Handler: Webhook de fondeo del proveedor, verificado por HMAC
// POST /wallet/webhook
#[utoipa::path(
    post,
    path = "/wallet/webhook",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Event processed or acknowledged"),
        (status = 401, description = "Invalid signature")
    )
)]
pub async fn funding_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let signature = headers
        .get("monnify-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let outcome = state.webhook.execute(&body, signature).await?;

    let message = match outcome {
        WebhookOutcome::Acknowledged(message) => message.to_string(),
        WebhookOutcome::VasConfirmed => "VAS confirmation processed".to_string(),
        WebhookOutcome::KycProcessed => "KYC verification payment processed".to_string(),
        WebhookOutcome::Credited { .. } => "Wallet funded successfully".to_string(),
        WebhookOutcome::AlreadyProcessed => "Already processed".to_string(),
    };

    Ok(Json(ApiResponse::message(message)))
}

#[derive(Deserialize, ToSchema)]
pub struct PinSetupRequest {
    pub pin: String,
}

// Handler: Alta del PIN de gasto
// POST /wallet/pin/setup
#[utoipa::path(
    post,
    path = "/wallet/pin/setup",
    request_body = PinSetupRequest,
    responses((status = 201, description = "PIN configured"))
)]
pub async fn pin_setup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<PinSetupRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user_id = user_from_headers(&headers)?;
    state.pin.setup(user_id, payload.pin.trim()).await?;

    Ok(Json(ApiResponse::message("PIN setup completed successfully")))
}

#[derive(Deserialize, ToSchema)]
pub struct PinValidateRequest {
    pub pin: String,
}

// Handler: Validación del PIN (autorización de gasto)
// POST /wallet/pin/validate
#[utoipa::path(
    post,
    path = "/wallet/pin/validate",
    request_body = PinValidateRequest,
    responses(
        (status = 200, description = "PIN valid"),
        (status = 423, description = "Wallet locked after repeated failures")
    )
)]
pub async fn pin_validate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<PinValidateRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user_id = user_from_headers(&headers)?;
    state.pin.validate(user_id, payload.pin.trim()).await?;

    Ok(Json(ApiResponse::message("PIN validated successfully")))
}

#[derive(Deserialize, ToSchema)]
pub struct PinChangeRequest {
    #[serde(rename = "oldPin")]
    pub old_pin: String,
    #[serde(rename = "newPin")]
    pub new_pin: String,
}

// Handler: Cambio de PIN con PIN anterior
// POST /wallet/pin/change
#[utoipa::path(
    post,
    path = "/wallet/pin/change",
    request_body = PinChangeRequest,
    responses((status = 200, description = "PIN changed"))
)]
pub async fn pin_change(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<PinChangeRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user_id = user_from_headers(&headers)?;
    state
        .pin
        .change(user_id, payload.old_pin.trim(), payload.new_pin.trim())
        .await?;

    Ok(Json(ApiResponse::message("PIN changed successfully")))
}

// Handler: Estado del PIN
// GET /wallet/pin/status
#[utoipa::path(
    get,
    path = "/wallet/pin/status",
    responses((status = 200, description = "PIN state for the client"))
)]
pub async fn pin_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user_id = user_from_headers(&headers)?;
    let status = state.pin.status(user_id).await?;

    Ok(Json(ApiResponse::success(
        serde_json::to_value(&status).unwrap_or_default(),
    )))
}

#[derive(Deserialize, ToSchema)]
pub struct PinAdminResetRequest {
    #[serde(rename = "userId")]
    pub user_id: uuid::Uuid,
}

// Handler: Reseteo administrativo del PIN (auditado)
// POST /wallet/pin/admin-reset
#[utoipa::path(
    post,
    path = "/wallet/pin/admin-reset",
    request_body = PinAdminResetRequest,
    responses((status = 200, description = "PIN cleared and audit row written"))
)]
pub async fn pin_admin_reset(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<PinAdminResetRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let admin_id = admin_from_headers(&headers)?;
    state
        .pin
        .admin_reset(admin_id, UserId(payload.user_id))
        .await?;

    Ok(Json(ApiResponse::message("PIN reset completed")))
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// Handler: Vista unificada paginada de transacciones
// GET /wallet/transactions/all
#[utoipa::path(
    get,
    path = "/wallet/transactions/all",
    responses((status = 200, description = "Unified paginated transaction view"))
)]
pub async fn all_transactions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user_id = user_from_headers(&headers)?;
    let page = state
        .transactions
        .list(user_id, query.page.unwrap_or(1), query.limit.unwrap_or(20))
        .await?;

    Ok(Json(ApiResponse::success(
        serde_json::to_value(&page).unwrap_or_default(),
    )))
}

#[derive(Deserialize, ToSchema)]
pub struct SyncRequest {
    pub references: Vec<String>,
}

// Handler: Conciliación cliente-backend de referencias conocidas
// POST /wallet/transactions/sync
#[utoipa::path(
    post,
    path = "/wallet/transactions/sync",
    request_body = SyncRequest,
    responses((status = 200, description = "Authoritative status per reference"))
)]
pub async fn sync_transactions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SyncRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user_id = user_from_headers(&headers)?;
    let results = state.transactions.sync(user_id, payload.references).await?;

    Ok(Json(ApiResponse::success(
        serde_json::to_value(&results).unwrap_or_default(),
    )))
}

// Handler: Tareas de liquidación pendientes del usuario
// GET /wallet/pending-tasks
#[utoipa::path(
    get,
    path = "/wallet/pending-tasks",
    responses((status = 200, description = "Settlement work still in flight"))
)]
pub async fn pending_tasks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user_id = user_from_headers(&headers)?;
    let tasks = state.pending_tasks.execute(user_id).await?;

    Ok(Json(ApiResponse::success(
        serde_json::to_value(&tasks).unwrap_or_default(),
    )))
}

#[derive(Deserialize, ToSchema)]
pub struct AdminAdjustmentRequest {
    #[serde(rename = "userId")]
    pub user_id: uuid::Uuid,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub reference: String,
    pub reason: String,
}

// Handler: Reembolso administrativo, idempotente sobre la referencia
// POST /wallet/admin/refund
#[utoipa::path(
    post,
    path = "/wallet/admin/refund",
    request_body = AdminAdjustmentRequest,
    responses((status = 200, description = "Refund applied (or replayed as no-op)"))
)]
pub async fn admin_refund(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<AdminAdjustmentRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let admin_id = admin_from_headers(&headers)?;
    let amount = Kobo::from_naira(payload.amount.round_dp(2))
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let result = state
        .admin_adjust
        .refund(
            admin_id,
            UserId(payload.user_id),
            amount,
            payload.reference,
            payload.reason,
        )
        .await?;

    Ok(Json(ApiResponse::success(
        serde_json::to_value(&result).unwrap_or_default(),
    )))
}

// Handler: Deducción administrativa
// POST /wallet/admin/deduct
#[utoipa::path(
    post,
    path = "/wallet/admin/deduct",
    request_body = AdminAdjustmentRequest,
    responses((status = 200, description = "Deduction applied (or replayed as no-op)"))
)]
pub async fn admin_deduct(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<AdminAdjustmentRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let admin_id = admin_from_headers(&headers)?;
    let amount = Kobo::from_naira(payload.amount.round_dp(2))
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let result = state
        .admin_adjust
        .deduct(
            admin_id,
            UserId(payload.user_id),
            amount,
            payload.reference,
            payload.reason,
        )
        .await?;

    Ok(Json(ApiResponse::success(
        serde_json::to_value(&result).unwrap_or_default(),
    )))
}
