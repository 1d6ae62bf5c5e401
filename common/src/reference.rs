use chrono::Utc;
use uuid::Uuid;

/// Prefijo de las referencias de cuenta reservada. El proveedor de fondeo
/// devuelve este prefijo en cada webhook, y es la vía principal para mapear
/// un depósito a su billetera.
pub const ACCOUNT_REFERENCE_PREFIX: &str = "FICORE";

/// Genera el identificador único de una intención de compra.
///
/// El mismo valor se usa como `requestId`, `transactionReference` y
/// `vendReference` del proveedor: un id por intención del usuario.
///
/// Formato: `FICORE_<TYPE>_<userId>_<unixSec>_<8 hex>`.
pub fn generate_request_id(transaction_type: &str, user_id: Uuid) -> String {
    let timestamp = Utc::now().timestamp();
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    format!(
        "FICORE_{}_{}_{}_{}",
        transaction_type,
        user_id.simple(),
        timestamp,
        suffix
    )
}

/// Referencia de cuenta reservada para un usuario: `FICORE<userId>`.
pub fn account_reference(user_id: Uuid) -> String {
    format!(
        "{}{}",
        ACCOUNT_REFERENCE_PREFIX,
        user_id.simple().to_string().to_uppercase()
    )
}

/// Extrae el usuario de una referencia de cuenta reservada.
///
/// El proveedor reescribe la referencia con espacios, guiones o guiones
/// bajos según el canal, así que primero se normaliza.
pub fn parse_account_reference(reference: &str) -> Option<Uuid> {
    let cleaned: String = reference
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .to_uppercase();

    let payload = cleaned.strip_prefix(ACCOUNT_REFERENCE_PREFIX)?;
    Uuid::parse_str(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_shape() {
        let user = Uuid::new_v4();
        let id = generate_request_id("AIRTIME", user);

        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], "FICORE");
        assert_eq!(parts[1], "AIRTIME");
        assert_eq!(parts[2], user.simple().to_string());
        assert!(parts[3].parse::<i64>().is_ok());
        assert_eq!(parts[4].len(), 8);
    }

    #[test]
    fn test_request_ids_are_unique() {
        let user = Uuid::new_v4();
        let a = generate_request_id("DATA", user);
        let b = generate_request_id("DATA", user);
        assert_ne!(a, b);
    }

    #[test]
    fn test_account_reference_round_trip() {
        let user = Uuid::new_v4();
        let reference = account_reference(user);
        assert_eq!(parse_account_reference(&reference), Some(user));
    }

    #[test]
    fn test_parse_tolerates_provider_formatting() {
        let user = Uuid::new_v4();
        let reference = account_reference(user);
        // El proveedor a veces inserta separadores en la referencia.
        let mangled = format!("{}-{}", &reference[..10], &reference[10..]);
        assert_eq!(parse_account_reference(&mangled), Some(user));
    }

    #[test]
    fn test_parse_rejects_foreign_references() {
        assert_eq!(parse_account_reference("MFY-12345"), None);
        assert_eq!(parse_account_reference("FICOREnothex"), None);
        assert_eq!(parse_account_reference(""), None);
    }
}
