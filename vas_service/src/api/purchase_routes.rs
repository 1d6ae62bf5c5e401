use axum::{
    extract::{Path, State},
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
use crate::api::{user_from_headers, AppState};
use crate::domain::error::PurchaseError;
use crate::use_cases::buy_airtime::AirtimeRequest;
use crate::use_cases::buy_data::DataRequest;

// Definicion de rutas de compra VAS
pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/purchase/buy-airtime", post(buy_airtime))
        .route("/purchase/buy-data", post(buy_data))
        .route("/purchase/networks/{service}", get(networks))
        .route("/purchase/data-plans/{network}", get(data_plans))
        .route("/purchase/data-plan-types/{network}", get(data_plan_types))
        .with_state(state)
}

#[derive(Deserialize, ToSchema)]
pub struct BuyAirtimeRequest {
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
    pub network: String,
    #[schema(value_type = String)]
    pub amount: Decimal,
}

// Handler: Compra de airtime
// POST /purchase/buy-airtime
#[utoipa::path(
    post,
    path = "/purchase/buy-airtime",
    request_body = BuyAirtimeRequest,
    responses(
        (status = 200, description = "Purchase queued for settlement"),
        (status = 400, description = "Validation or provider failure"),
        (status = 409, description = "Duplicate within the guard window")
    )
)]
pub async fn buy_airtime(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<BuyAirtimeRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user_id = user_from_headers(&headers)?;
    let amount = Kobo::from_naira(payload.amount.round_dp(2))
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let request = AirtimeRequest {
        phone_number: payload.phone_number,
        network: payload.network,
        amount,
    };

    // La compra corre en una tarea propia: si el cliente corta la conexión
    // el flujo igual llega a un estado terminal. El status HTTP es
    // informativo, no parte del protocolo.
    let state_for_task = state.clone();
    let receipt = tokio::spawn(async move {
        state_for_task.buy_airtime.execute(user_id, request).await
    })
    .await
    .map_err(|e| ApiError::Purchase(PurchaseError::Repository(e.to_string())))??;

    Ok(Json(ApiResponse::success_with_message(
        serde_json::to_value(&receipt).unwrap_or_default(),
        "Purchase is being processed",
    )))
}

#[derive(Deserialize, ToSchema)]
pub struct BuyDataRequest {
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
    pub network: String,
    #[serde(rename = "dataPlanId")]
    pub data_plan_id: String,
    #[serde(rename = "dataPlanName", default)]
    pub data_plan_name: String,
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[serde(rename = "planType", default = "default_plan_type")]
    pub plan_type: String,
}

fn default_plan_type() -> String {
    "auto".to_string()
}

// Handler: Compra de datos con elección explícita de familia de planes
// POST /purchase/buy-data
#[utoipa::path(
    post,
    path = "/purchase/buy-data",
    request_body = BuyDataRequest,
    responses(
        (status = 200, description = "Purchase queued for settlement"),
        (status = 400, description = "Provider failed; alternatives included"),
        (status = 409, description = "Duplicate within the guard window")
    )
)]
pub async fn buy_data(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<BuyDataRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user_id = user_from_headers(&headers)?;
    let amount = Kobo::from_naira(payload.amount.round_dp(2))
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let request = DataRequest {
        phone_number: payload.phone_number,
        network: payload.network,
        data_plan_id: payload.data_plan_id,
        data_plan_name: payload.data_plan_name,
        amount,
        plan_type: payload.plan_type,
    };

    // Misma política que airtime: el corte del cliente no aborta el flujo.
    let state_for_task = state.clone();
    let receipt = tokio::spawn(async move {
        state_for_task.buy_data.execute(user_id, request).await
    })
    .await
    .map_err(|e| ApiError::Purchase(PurchaseError::Repository(e.to_string())))??;

    Ok(Json(ApiResponse::success_with_message(
        serde_json::to_value(&receipt).unwrap_or_default(),
        "Purchase is being processed",
    )))
}

// Handler: Redes disponibles por servicio, con fallback estático
// GET /purchase/networks/{airtime|data}
#[utoipa::path(
    get,
    path = "/purchase/networks/{service}",
    responses((status = 200, description = "Provider-derived network list"))
)]
pub async fn networks(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let networks = match service.to_lowercase().as_str() {
        "airtime" => state.catalog.airtime_networks().await,
        "data" => state.catalog.data_networks().await,
        other => {
            return Err(ApiError::Validation(format!(
                "Unknown service: {} (expected airtime or data)",
                other
            )))
        }
    };

    Ok(Json(ApiResponse::success(
        serde_json::to_value(&networks).unwrap_or_default(),
    )))
}

// Handler: Planes de datos de una red (primario con fallback)
// GET /purchase/data-plans/{network}
#[utoipa::path(
    get,
    path = "/purchase/data-plans/{network}",
    responses((status = 200, description = "Plan list sold at face value"))
)]
pub async fn data_plans(
    State(state): State<Arc<AppState>>,
    Path(network): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let plans = state
        .catalog
        .data_plans(&network)
        .await
        .map_err(|e| ApiError::Purchase(PurchaseError::Provider(e)))?;

    Ok(Json(ApiResponse::success(
        serde_json::to_value(&plans).unwrap_or_default(),
    )))
}

// Handler: Familias de planes de una red
// GET /purchase/data-plan-types/{network}
#[utoipa::path(
    get,
    path = "/purchase/data-plan-types/{network}",
    responses((status = 200, description = "Plan family labels per network"))
)]
pub async fn data_plan_types(
    State(state): State<Arc<AppState>>,
    Path(network): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let options = state.catalog.plan_types(&network);
    if options.is_empty() {
        return Err(ApiError::Validation(format!(
            "Unknown network: {}",
            network
        )));
    }

    Ok(Json(ApiResponse::success(
        serde_json::to_value(&options).unwrap_or_default(),
    )))
}
