use async_trait::async_trait;
use common::Kobo;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::domain::entities::{BankAccount, DataPlan, NetworkInfo, Provider};
use crate::domain::error::ProviderError;
use crate::domain::gateways::{
    BankAccountProvider, BillerCategory, BillsProvider, ReservedAccountDetails, VendSuccess,
};

/// Timeout duro de los vends: pasado este plazo la llamada se trata como
/// `ProviderUnreachable` y la reserva se libera.
const VEND_TIMEOUT: Duration = Duration::from_secs(12);
/// Auth y catálogo toleran más espera: no retienen reservas.
const CATALOG_TIMEOUT: Duration = Duration::from_secs(30);
/// Espera antes del requery cuando el vend queda IN_PROGRESS.
const REQUERY_DELAY: Duration = Duration::from_secs(3);

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Cliente del proveedor primario de bill-pay (Monnify).
///
/// El token bearer es cache de proceso bajo un lock propio; nunca estado
/// ambiente. El TTL viene de la respuesta de auth con un margen de 60 s.
pub struct MonnifyGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    contract_code: String,
    token_cache: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    #[serde(default)]
    request_successful: bool,
    response_message: Option<String>,
    response_body: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthBody {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct PagedContent<T> {
    #[serde(default = "Vec::new")]
    content: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Biller {
    name: String,
    code: String,
}

#[derive(Debug, Deserialize)]
struct BillerProduct {
    code: String,
    name: String,
    price: Option<Decimal>,
    #[serde(rename = "validityPeriod")]
    validity_period: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VendInstruction {
    #[serde(default)]
    require_validation_ref: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateBody {
    validation_reference: Option<String>,
    vend_instruction: Option<VendInstruction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VendBody {
    vend_status: Option<String>,
    transaction_reference: Option<String>,
    vend_reference: Option<String>,
    product_name: Option<String>,
    vend_amount: Option<Decimal>,
    commission: Option<Decimal>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReservedAccountBody {
    account_reference: Option<String>,
    account_name: Option<String>,
    #[serde(default = "Vec::new")]
    accounts: Vec<ReservedBankAccount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReservedBankAccount {
    bank_name: String,
    bank_code: String,
    account_number: String,
    account_name: String,
}

impl MonnifyGateway {
    pub fn new(base_url: String, api_key: String, secret_key: String, contract_code: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            secret_key,
            contract_code,
            token_cache: Mutex::new(None),
        }
    }

    fn bills_url(&self, path: &str) -> String {
        format!("{}/api/v1/vas/bills-payment/{}", self.base_url, path)
    }

    /// Token bearer con cache. Se renueva solo cuando expiró (o está por
    /// expirar), con el lock tomado para que un solo request re-autentique.
    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut cache = self.token_cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.token.clone());
            }
        }

        let response = self
            .http
            .post(format!("{}/api/v1/auth/login", self.base_url))
            .basic_auth(&self.api_key, Some(&self.secret_key))
            .header("Content-Type", "application/json")
            .timeout(CATALOG_TIMEOUT)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Auth(format!("auth failed: {}", body)));
        }

        let envelope: Envelope<AuthBody> = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let body = envelope
            .response_body
            .ok_or_else(|| ProviderError::Auth("auth response missing body".to_string()))?;

        // TTL del proveedor con margen para no usar tokens al filo.
        let ttl = body.expires_in.max(120) as u64;
        let token = body.access_token.clone();
        *cache = Some(CachedToken {
            token: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(ttl.saturating_sub(60)),
        });

        Ok(token)
    }

    async fn get_bills<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
        timeout: Duration,
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .get(self.bills_url(path))
            .bearer_auth(token)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_transport_error)?;

        decode_envelope(response).await
    }

    async fn post_bills<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
        payload: &serde_json::Value,
        timeout: Duration,
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .post(self.bills_url(path))
            .bearer_auth(token)
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_transport_error)?;

        decode_envelope(response).await
    }

    async fn find_biller(
        &self,
        token: &str,
        category: BillerCategory,
        network: &str,
    ) -> Result<Biller, ProviderError> {
        let billers: PagedContent<Biller> = self
            .get_bills(
                &format!("billers?category_code={}&size=100", category.code()),
                token,
                CATALOG_TIMEOUT,
            )
            .await?;

        billers
            .content
            .into_iter()
            .find(|b| b.name.to_uppercase() == network.to_uppercase())
            .ok_or_else(|| {
                ProviderError::Rejected(format!("biller not found for network {}", network))
            })
    }

    async fn list_products(
        &self,
        token: &str,
        biller_code: &str,
    ) -> Result<Vec<BillerProduct>, ProviderError> {
        let products: PagedContent<BillerProduct> = self
            .get_bills(
                &format!("biller-products?biller_code={}&size=100", biller_code),
                token,
                CATALOG_TIMEOUT,
            )
            .await?;
        Ok(products.content)
    }

    /// Validate → vend → (requery si IN_PROGRESS). El `vendReference` es
    /// nuestra referencia de idempotencia: reintentar el mismo id es
    /// seguro, cualquier otro reintento no lo es.
    async fn validate_and_vend(
        &self,
        token: &str,
        product_code: &str,
        customer_id: &str,
        amount: Kobo,
        request_id: &str,
    ) -> Result<VendBody, ProviderError> {
        let validation: ValidateBody = self
            .post_bills(
                "validate-customer",
                token,
                &serde_json::json!({
                    "productCode": product_code,
                    "customerId": customer_id,
                }),
                VEND_TIMEOUT,
            )
            .await?;

        let mut vend_payload = serde_json::json!({
            "productCode": product_code,
            "customerId": customer_id,
            "amount": amount.0 / 100,
            "vendReference": request_id,
        });

        let requires_ref = validation
            .vend_instruction
            .map(|i| i.require_validation_ref)
            .unwrap_or(false);
        if requires_ref {
            if let Some(reference) = validation.validation_reference {
                vend_payload["validationReference"] = serde_json::Value::String(reference);
            }
        }

        let vend: VendBody = self
            .post_bills("vend", token, &vend_payload, VEND_TIMEOUT)
            .await?;

        match vend.vend_status.as_deref() {
            Some("SUCCESS") => Ok(vend),
            Some("IN_PROGRESS") => {
                // Un solo requery tras una pausa corta; si sigue sin
                // resolverse el error sube y la conciliación decide.
                info!("Monnify vend in progress, requerying: {}", request_id);
                tokio::time::sleep(REQUERY_DELAY).await;

                let requeried: VendBody = self
                    .get_bills(
                        &format!("requery?reference={}", request_id),
                        token,
                        VEND_TIMEOUT,
                    )
                    .await?;

                if requeried.vend_status.as_deref() == Some("SUCCESS") {
                    Ok(requeried)
                } else {
                    Err(ProviderError::Api(format!(
                        "vend failed after requery: {}",
                        requeried
                            .description
                            .unwrap_or_else(|| "unknown error".to_string())
                    )))
                }
            }
            _ => Err(ProviderError::Api(format!(
                "vend failed: {}",
                vend.description.unwrap_or_else(|| "unknown error".to_string())
            ))),
        }
    }

    fn vend_success(&self, vend: VendBody, request_id: &str, raw_label: &str) -> VendSuccess {
        let vend_amount = vend
            .vend_amount
            .and_then(|d| Kobo::from_naira(d.round_dp(2)).ok());
        let commission = vend
            .commission
            .and_then(|d| Kobo::from_naira(d.round_dp(2)).ok());

        VendSuccess {
            provider: Provider::Monnify,
            transaction_reference: vend
                .transaction_reference
                .unwrap_or_else(|| request_id.to_string()),
            vend_reference: vend.vend_reference.unwrap_or_else(|| request_id.to_string()),
            product_name: vend.product_name,
            vend_amount,
            commission,
            raw: serde_json::json!({
                "provider": "monnify",
                "operation": raw_label,
                "description": vend.description,
            }),
        }
    }
}

// Los productos de airtime se reconocen por nombre, siguiendo los patrones
// del catálogo del proveedor: "Mobile Top Up", "Airtime", "VTU", "Recharge".
fn is_airtime_product(name: &str) -> bool {
    let name = name.to_lowercase();
    (name.contains("airtime") && name.contains("top up"))
        || (name.contains("mobile") && name.contains("top up"))
        || name.contains("vtu")
        || (name.contains("recharge") && name.contains("airtime"))
}

async fn decode_envelope<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    if status.is_client_error() {
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("responseMessage")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| body.clone());
        return Err(ProviderError::Rejected(message));
    }
    if status.is_server_error() {
        return Err(ProviderError::Api(format!("status {}: {}", status, body)));
    }

    let envelope: Envelope<T> = serde_json::from_str(&body)
        .map_err(|e| ProviderError::InvalidResponse(format!("{}: {}", e, body)))?;

    if !envelope.request_successful {
        return Err(ProviderError::Api(
            envelope
                .response_message
                .unwrap_or_else(|| "request not successful".to_string()),
        ));
    }

    envelope
        .response_body
        .ok_or_else(|| ProviderError::InvalidResponse("missing responseBody".to_string()))
}

fn map_transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() || error.is_connect() {
        ProviderError::Unreachable(error.to_string())
    } else {
        ProviderError::Api(error.to_string())
    }
}

#[async_trait]
impl BillsProvider for MonnifyGateway {
    async fn vend_airtime(
        &self,
        network: &str,
        amount: Kobo,
        phone_number: &str,
        request_id: &str,
    ) -> Result<VendSuccess, ProviderError> {
        let token = self.access_token().await?;

        let biller = self
            .find_biller(&token, BillerCategory::Airtime, network)
            .await?;
        let products = self.list_products(&token, &biller.code).await?;

        let product = products
            .into_iter()
            .find(|p| is_airtime_product(&p.name))
            .ok_or_else(|| {
                ProviderError::Rejected(format!(
                    "no valid airtime product found for {}",
                    network
                ))
            })?;

        info!(
            "Monnify airtime vend: network={} product={} request={}",
            network, product.code, request_id
        );

        let vend = self
            .validate_and_vend(&token, &product.code, phone_number, amount, request_id)
            .await?;

        Ok(self.vend_success(vend, request_id, "airtime"))
    }

    async fn vend_data(
        &self,
        network: &str,
        plan_code: &str,
        phone_number: &str,
        request_id: &str,
    ) -> Result<VendSuccess, ProviderError> {
        let token = self.access_token().await?;

        let biller = self
            .find_biller(&token, BillerCategory::DataBundle, network)
            .await?;
        let products = self.list_products(&token, &biller.code).await?;

        // Para datos el código del plan es el código del producto: sin
        // coincidencia exacta se rechaza, nunca se adivina otro plan.
        let product = products
            .into_iter()
            .find(|p| p.code == plan_code)
            .ok_or_else(|| {
                ProviderError::Rejected(format!(
                    "data plan {} not available for {}",
                    plan_code, network
                ))
            })?;

        let amount = product
            .price
            .and_then(|d| Kobo::from_naira(d.round_dp(2)).ok())
            .unwrap_or(Kobo::ZERO);

        info!(
            "Monnify data vend: network={} plan={} request={}",
            network, plan_code, request_id
        );

        let vend = self
            .validate_and_vend(&token, &product.code, phone_number, amount, request_id)
            .await?;

        Ok(self.vend_success(vend, request_id, "data"))
    }

    async fn list_networks(
        &self,
        category: BillerCategory,
    ) -> Result<Vec<NetworkInfo>, ProviderError> {
        let token = self.access_token().await?;
        let billers: PagedContent<Biller> = self
            .get_bills(
                &format!("billers?category_code={}&size=100", category.code()),
                &token,
                CATALOG_TIMEOUT,
            )
            .await?;

        Ok(billers
            .content
            .into_iter()
            .map(|b| NetworkInfo {
                id: b.name.to_lowercase(),
                name: b.name,
                available: true,
            })
            .collect())
    }

    async fn list_data_plans(&self, network: &str) -> Result<Vec<DataPlan>, ProviderError> {
        let token = self.access_token().await?;
        let biller = self
            .find_biller(&token, BillerCategory::DataBundle, network)
            .await?;
        let products = self.list_products(&token, &biller.code).await?;

        let mut plans = Vec::with_capacity(products.len());
        for product in products {
            let Some(price) = product.price else {
                warn!("Monnify product {} has no price, skipping", product.code);
                continue;
            };
            let Ok(amount) = Kobo::from_naira(price.round_dp(2)) else {
                continue;
            };
            plans.push(DataPlan {
                plan_id: product.code,
                name: product.name,
                amount,
                validity: product.validity_period,
                provider: Provider::Monnify,
            });
        }
        Ok(plans)
    }
}

#[async_trait]
impl BankAccountProvider for MonnifyGateway {
    async fn create_reserved_account(
        &self,
        account_reference: &str,
        account_name: &str,
        customer_email: &str,
    ) -> Result<ReservedAccountDetails, ProviderError> {
        let token = self.access_token().await?;

        let response = self
            .http
            .post(format!(
                "{}/api/v2/bank-transfer/reserved-accounts",
                self.base_url
            ))
            .bearer_auth(&token)
            .json(&serde_json::json!({
                "accountReference": account_reference,
                "accountName": account_name,
                "currencyCode": "NGN",
                "contractCode": self.contract_code,
                "customerEmail": customer_email,
                "customerName": account_name,
                "getAllAvailableBanks": true,
            }))
            .timeout(CATALOG_TIMEOUT)
            .send()
            .await
            .map_err(map_transport_error)?;

        let body: ReservedAccountBody = decode_envelope(response).await?;
        Ok(to_account_details(body, account_reference))
    }

    async fn fetch_reserved_account(
        &self,
        account_reference: &str,
    ) -> Result<ReservedAccountDetails, ProviderError> {
        let token = self.access_token().await?;

        let response = self
            .http
            .get(format!(
                "{}/api/v2/bank-transfer/reserved-accounts/{}",
                self.base_url, account_reference
            ))
            .bearer_auth(&token)
            .timeout(CATALOG_TIMEOUT)
            .send()
            .await
            .map_err(map_transport_error)?;

        let body: ReservedAccountBody = decode_envelope(response).await?;
        Ok(to_account_details(body, account_reference))
    }
}

fn to_account_details(body: ReservedAccountBody, fallback_reference: &str) -> ReservedAccountDetails {
    ReservedAccountDetails {
        account_reference: body
            .account_reference
            .unwrap_or_else(|| fallback_reference.to_string()),
        account_name: body.account_name.unwrap_or_default(),
        accounts: body
            .accounts
            .into_iter()
            .map(|a| BankAccount {
                bank_name: a.bank_name,
                bank_code: a.bank_code,
                account_number: a.account_number,
                account_name: a.account_name,
            })
            .collect(),
    }
}
