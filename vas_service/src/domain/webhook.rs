//! Parsing del webhook de fondeo.
//!
//! El proveedor envía dos formas del mismo evento: la clásica envuelta en
//! `eventData` y una plana más nueva. Ambas deben aceptarse. La firma va
//! aparte (header) y se verifica sobre el cuerpo crudo antes de parsear.

use common::Kobo;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::domain::error::WebhookError;

/// Evento de webhook ya normalizado, independiente de la forma de origen.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedWebhook {
    pub event_type: Option<String>,
    pub payment_status: Option<String>,
    pub completed: bool,
    pub amount_paid: Kobo,
    pub transaction_reference: String,
    pub payment_reference: String,
    pub account_reference: Option<String>,
    pub customer_email: Option<String>,
    pub raw: Value,
}

impl ParsedWebhook {
    /// Notificación de actividad de cuenta (saldos, comisiones): se
    /// reconoce y se ignora, nunca acredita.
    pub fn is_account_activity(&self) -> bool {
        self.event_type.as_deref() == Some("ACCOUNT_ACTIVITY")
    }

    /// ¿El evento amerita procesamiento? Transacción exitosa en cualquiera
    /// de las dos formas.
    pub fn should_process(&self) -> bool {
        if self.event_type.as_deref() == Some("SUCCESSFUL_TRANSACTION") {
            return true;
        }
        self.payment_status.as_deref() == Some("PAID") && self.completed
    }
}

fn decimal_amount(value: Option<&Value>) -> Result<Kobo, WebhookError> {
    let Some(value) = value else {
        return Ok(Kobo::ZERO);
    };

    let decimal = if let Some(s) = value.as_str() {
        s.parse::<Decimal>()
            .map_err(|e| WebhookError::MalformedPayload(format!("bad amount '{}': {}", s, e)))?
    } else if let Some(n) = value.as_f64() {
        Decimal::try_from(n)
            .map_err(|e| WebhookError::MalformedPayload(format!("bad amount {}: {}", n, e)))?
    } else if value.is_null() {
        return Ok(Kobo::ZERO);
    } else {
        return Err(WebhookError::MalformedPayload(format!(
            "amount is not a number: {}",
            value
        )));
    };

    // Los montos del proveedor llegan en Naira con centavos; se redondea
    // al kobo por si el float del JSON trae ruido.
    let rounded = decimal.round_dp(2);
    Kobo::from_naira(rounded).map_err(|e| WebhookError::MalformedPayload(e.to_string()))
}

fn string_at<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Normaliza el cuerpo JSON de un webhook, aceptando la forma envuelta en
/// `eventData` y la forma plana.
pub fn parse(body: &Value) -> Result<ParsedWebhook, WebhookError> {
    let event_type = string_at(body, "eventType").map(str::to_string);
    let payment_status = string_at(body, "paymentStatus").map(|s| s.to_uppercase());
    let completed = body
        .get("completed")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut amount_paid = Kobo::ZERO;
    let mut transaction_reference = String::new();
    let mut payment_reference = String::new();
    let mut account_reference = None;
    let mut customer_email = None;

    // 1. Forma clásica: todo vive bajo eventData.
    if let Some(event_data) = body.get("eventData") {
        amount_paid = decimal_amount(event_data.get("amountPaid"))?;
        transaction_reference = string_at(event_data, "transactionReference")
            .unwrap_or_default()
            .to_string();
        payment_reference = string_at(event_data, "paymentReference")
            .unwrap_or_default()
            .to_string();

        customer_email = event_data
            .get("customer")
            .and_then(|c| string_at(c, "email"))
            .map(str::to_string);

        // La referencia de cuenta reservada suele venir aquí.
        if let Some(product) = event_data.get("product") {
            if string_at(product, "type") == Some("RESERVED_ACCOUNT") {
                account_reference = string_at(product, "reference").map(str::to_string);
            }
        }
    }

    // 2. Forma plana: se revisa de todos modos por si faltó algo arriba.
    if account_reference.is_none() {
        if let Some(reference) = string_at(body, "accountReference") {
            account_reference = Some(reference.to_string());
            if amount_paid.is_zero() {
                amount_paid = decimal_amount(body.get("amountPaid"))?;
            }
            if transaction_reference.is_empty() {
                transaction_reference = string_at(body, "transactionReference")
                    .unwrap_or_default()
                    .to_string();
            }
            if payment_reference.is_empty() {
                payment_reference = string_at(body, "paymentReference")
                    .unwrap_or_default()
                    .to_string();
            }
            if customer_email.is_none() {
                customer_email = string_at(body, "customerEmail")
                    .or_else(|| body.get("customer").and_then(|c| string_at(c, "email")))
                    .map(str::to_string);
            }
        }
    }

    // Referencias sueltas en la forma plana sin accountReference.
    if transaction_reference.is_empty() {
        transaction_reference = string_at(body, "transactionReference")
            .unwrap_or_default()
            .to_string();
    }
    if amount_paid.is_zero() {
        amount_paid = decimal_amount(body.get("amountPaid"))?;
    }

    Ok(ParsedWebhook {
        event_type,
        payment_status,
        completed,
        amount_paid,
        transaction_reference,
        payment_reference,
        account_reference,
        customer_email,
        raw: body.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_event_wrapped_shape() {
        let body = json!({
            "eventType": "SUCCESSFUL_TRANSACTION",
            "eventData": {
                "amountPaid": "1000.00",
                "transactionReference": "MFY-123",
                "paymentReference": "PAY-9",
                "customer": { "email": "ada@example.com" },
                "product": { "type": "RESERVED_ACCOUNT", "reference": "FICOREabc" }
            }
        });

        let parsed = parse(&body).unwrap();
        assert!(parsed.should_process());
        assert_eq!(parsed.amount_paid, Kobo(100_000));
        assert_eq!(parsed.transaction_reference, "MFY-123");
        assert_eq!(parsed.account_reference.as_deref(), Some("FICOREabc"));
        assert_eq!(parsed.customer_email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn test_parses_flat_shape() {
        let body = json!({
            "paymentStatus": "paid",
            "completed": true,
            "accountReference": "FICOREdef",
            "amountPaid": 500.5,
            "transactionReference": "MFY-456"
        });

        let parsed = parse(&body).unwrap();
        assert!(parsed.should_process());
        assert_eq!(parsed.amount_paid, Kobo(50_050));
        assert_eq!(parsed.account_reference.as_deref(), Some("FICOREdef"));
    }

    #[test]
    fn test_account_activity_is_recognized() {
        let body = json!({
            "eventType": "ACCOUNT_ACTIVITY",
            "eventData": { "activityType": "COMMISSION", "amount": 12.5 }
        });

        let parsed = parse(&body).unwrap();
        assert!(parsed.is_account_activity());
        assert!(!parsed.should_process());
    }

    #[test]
    fn test_incomplete_payment_is_not_processed() {
        let body = json!({
            "paymentStatus": "PAID",
            "completed": false,
            "transactionReference": "MFY-789"
        });

        let parsed = parse(&body).unwrap();
        assert!(!parsed.should_process());
    }

    #[test]
    fn test_non_numeric_amount_is_rejected() {
        let body = json!({
            "eventType": "SUCCESSFUL_TRANSACTION",
            "eventData": { "amountPaid": {"weird": true} }
        });

        assert!(parse(&body).is_err());
    }
}
