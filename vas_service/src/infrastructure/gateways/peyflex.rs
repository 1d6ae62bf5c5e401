use async_trait::async_trait;
use common::Kobo;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::entities::{DataPlan, Provider};
use crate::domain::error::ProviderError;
use crate::domain::gateways::{VendProvider, VendSuccess};

const VEND_TIMEOUT: Duration = Duration::from_secs(12);

// Palabras que señalan éxito en el cuerpo, sin importar el status HTTP.
const SUCCESS_KEYWORDS: [&str; 4] = ["success", "credited", "completed", "approved"];

/// Cliente del proveedor alterno de vend directo (Peyflex).
///
/// Particularidad observada en producción: a veces responde 403 con un
/// cuerpo que describe una operación exitosa. Por eso el veredicto sale de
/// los indicadores del cuerpo y no solo del status; un 403 sin indicadores
/// sí es fallo duro.
pub struct PeyflexGateway {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct PeyflexPlan {
    #[serde(alias = "plan_code", alias = "code")]
    plan_code: String,
    #[serde(alias = "plan_name", alias = "name")]
    name: String,
    #[serde(alias = "plan_amount", alias = "amount")]
    amount: Decimal,
    validity: Option<String>,
}

impl PeyflexGateway {
    pub fn new(base_url: String, api_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_token,
        }
    }

    async fn post_vend(
        &self,
        path: &str,
        payload: serde_json::Value,
        reference: &str,
    ) -> Result<serde_json::Value, ProviderError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Token {}", self.api_token))
            .header("Content-Type", "application/json")
            .header("User-Agent", "FiCore-Backend/1.0")
            .json(&payload)
            .timeout(VEND_TIMEOUT)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        info!(
            "Peyflex response for {}: status={} body_len={}",
            reference,
            status,
            text.len()
        );

        adjudicate(status.as_u16(), &text)
    }

    fn vend_success(&self, raw: serde_json::Value, reference: &str) -> VendSuccess {
        let product_name = raw
            .get("plan_name")
            .or_else(|| raw.get("product_name"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let transaction_reference = raw
            .get("reference")
            .or_else(|| raw.get("transaction_id"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| reference.to_string());

        VendSuccess {
            provider: Provider::Peyflex,
            transaction_reference,
            vend_reference: reference.to_string(),
            product_name,
            vend_amount: None,
            commission: None,
            raw,
        }
    }
}

/// Veredicto de una respuesta Peyflex a partir de status + cuerpo.
///
/// 200 parseable → éxito. 200/403 con palabras de éxito (en JSON o en el
/// texto crudo) → éxito. 403 sin indicadores → rechazo duro. 400 → rechazo
/// con la razón parseada. Lo demás → error del proveedor.
fn adjudicate(status: u16, body: &str) -> Result<serde_json::Value, ProviderError> {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();

    match status {
        200 | 403 => {
            if let Some(json) = &parsed {
                let status_field = json
                    .get("status")
                    .map(|v| v.to_string().to_lowercase())
                    .unwrap_or_default();
                let message_field = json
                    .get("message")
                    .map(|v| v.to_string().to_lowercase())
                    .unwrap_or_default();

                let keyword_hit = SUCCESS_KEYWORDS
                    .iter()
                    .any(|k| status_field.contains(k) || message_field.contains(k));

                if keyword_hit {
                    return Ok(json.clone());
                }
                if status == 200 {
                    // 200 parseable sin palabras clave cuenta como éxito.
                    return Ok(json.clone());
                }
            }

            // Sin JSON (o 403 sin indicadores en JSON): revisar texto crudo.
            let text_lower = body.to_lowercase();
            if SUCCESS_KEYWORDS.iter().any(|k| text_lower.contains(k)) {
                warn!("Peyflex success detected only in raw response text");
                return Ok(serde_json::json!({
                    "success": true,
                    "message": "Success detected in response text",
                    "raw_response": body,
                    "status_code": status,
                }));
            }

            if status == 403 {
                return Err(ProviderError::Rejected(
                    "service access denied - check API credentials and account status"
                        .to_string(),
                ));
            }

            Err(ProviderError::InvalidResponse(format!(
                "unparseable 200 response: {}",
                body
            )))
        }
        400 => {
            let message = parsed
                .as_ref()
                .and_then(|j| j.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string());
            Err(ProviderError::Rejected(message))
        }
        404 => Err(ProviderError::Rejected(
            "endpoint not found - check API URL".to_string(),
        )),
        s if s >= 500 => Err(ProviderError::Api(format!("status {}: {}", s, body))),
        s => Err(ProviderError::Api(format!("status {}: {}", s, body))),
    }
}

fn map_transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() || error.is_connect() {
        ProviderError::Unreachable(error.to_string())
    } else {
        ProviderError::Api(error.to_string())
    }
}

#[async_trait]
impl VendProvider for PeyflexGateway {
    async fn vend_airtime(
        &self,
        network: &str,
        amount: Kobo,
        phone_number: &str,
        request_id: &str,
    ) -> Result<VendSuccess, ProviderError> {
        // La API no acepta referencia propia: el payload es exactamente el
        // de la documentación y el request_id queda como referencia local.
        let payload = serde_json::json!({
            "network": network.to_lowercase(),
            "amount": amount.0 / 100,
            "mobile_number": phone_number,
        });

        let raw = self
            .post_vend("/api/airtime/topup/", payload, request_id)
            .await?;
        Ok(self.vend_success(raw, request_id))
    }

    async fn vend_data(
        &self,
        network: &str,
        plan_code: &str,
        phone_number: &str,
        request_id: &str,
    ) -> Result<VendSuccess, ProviderError> {
        let payload = serde_json::json!({
            "network": network,
            "plan_code": plan_code,
            "mobile_number": phone_number,
        });

        let raw = self
            .post_vend("/api/data/purchase/", payload, request_id)
            .await?;
        Ok(self.vend_success(raw, request_id))
    }

    async fn list_data_plans(&self, network: &str) -> Result<Vec<DataPlan>, ProviderError> {
        let response = self
            .http
            .get(format!("{}/api/data/plans/", self.base_url))
            .query(&[("network", network)])
            .header("Authorization", format!("Token {}", self.api_token))
            .timeout(VEND_TIMEOUT)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api(format!("plan list failed: {}", status)));
        }

        let plans: Vec<PeyflexPlan> = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let mut result = Vec::with_capacity(plans.len());
        for plan in plans {
            let Ok(amount) = Kobo::from_naira(plan.amount.round_dp(2)) else {
                continue;
            };
            result.push(DataPlan {
                plan_id: plan.plan_code,
                name: plan.name,
                amount,
                validity: plan.validity,
                provider: Provider::Peyflex,
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_clean_200_is_success() {
        let result = adjudicate(200, r#"{"status": "ok", "reference": "PX-1"}"#);
        assert!(result.is_ok());
    }

    #[rstest]
    #[case(200, r#"{"status": "success", "message": "done"}"#)]
    #[case(403, r#"{"status": "pending", "message": "Airtime credited successfully"}"#)]
    #[case(403, r#"{"message": "Transaction completed"}"#)]
    #[case(403, "plain text: request approved")]
    fn test_keyword_success_tolerated(#[case] status: u16, #[case] body: &str) {
        // La particularidad observada: 403 con cuerpo exitoso se acepta.
        assert!(adjudicate(status, body).is_ok());
    }

    #[test]
    fn test_bare_403_is_hard_failure() {
        let result = adjudicate(403, r#"{"detail": "Invalid token."}"#);
        assert!(matches!(result, Err(ProviderError::Rejected(_))));
    }

    #[test]
    fn test_400_surfaces_parsed_reason() {
        let result = adjudicate(400, r#"{"message": "Network not active"}"#);
        match result {
            Err(ProviderError::Rejected(reason)) => assert_eq!(reason, "Network not active"),
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }

    #[test]
    fn test_500_is_provider_error() {
        let result = adjudicate(500, "internal server error");
        assert!(matches!(result, Err(ProviderError::Api(_))));
    }

    #[test]
    fn test_unparseable_200_without_keywords_is_invalid() {
        let result = adjudicate(200, "<html>gateway timeout</html>");
        assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
    }
}
