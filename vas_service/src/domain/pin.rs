//! Hashing y reglas del PIN de gasto.
//!
//! El hash es SHA-256 sobre `pin || salt`, con sal aleatoria de 32 bytes en
//! base64. El mismo esquema que calcula el cliente móvil, así que no puede
//! cambiarse de forma unilateral.

use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::domain::error::PinError;

/// Intentos fallidos consecutivos antes del bloqueo.
pub const MAX_ATTEMPTS: i32 = 3;
/// Duración del bloqueo en minutos.
pub const LOCKOUT_MINUTES: i64 = 15;

// PINes triviales que se rechazan en alta y en cambio.
const WEAK_PINS: [&str; 14] = [
    "0000", "1111", "2222", "3333", "4444", "5555", "6666", "7777", "8888", "9999", "1234",
    "4321", "0123", "9876",
];

/// Valida formato (4 dígitos exactos) y fortaleza del PIN.
pub fn validate_pin(pin: &str) -> Result<(), PinError> {
    if pin.len() != 4 || !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(PinError::InvalidFormat);
    }
    if WEAK_PINS.contains(&pin) {
        return Err(PinError::WeakPin);
    }
    Ok(())
}

/// Sal aleatoria de 32 bytes, codificada en base64 para almacenarse.
pub fn generate_salt() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// SHA-256 hex de `pin || salt`.
pub fn hash_pin(pin: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pin.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Comparación del PIN ingresado contra el hash almacenado.
pub fn verify_pin(pin: &str, salt: &str, stored_hash: &str) -> bool {
    hash_pin(pin, salt) == stored_hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("4829")]
    #[case("0917")]
    fn test_strong_pins_pass(#[case] pin: &str) {
        assert!(validate_pin(pin).is_ok());
    }

    #[rstest]
    #[case("123", PinError::InvalidFormat)]
    #[case("12345", PinError::InvalidFormat)]
    #[case("12a4", PinError::InvalidFormat)]
    #[case("1234", PinError::WeakPin)]
    #[case("0000", PinError::WeakPin)]
    #[case("9876", PinError::WeakPin)]
    fn test_invalid_pins_rejected(#[case] pin: &str, #[case] expected: PinError) {
        assert_eq!(validate_pin(pin).unwrap_err(), expected);
    }

    #[test]
    fn test_hash_is_deterministic_per_salt() {
        let salt = generate_salt();
        let a = hash_pin("4829", &salt);
        let b = hash_pin("4829", &salt);
        assert_eq!(a, b);

        let other_salt = generate_salt();
        assert_ne!(a, hash_pin("4829", &other_salt));
    }

    #[test]
    fn test_verify_round_trip() {
        let salt = generate_salt();
        let hash = hash_pin("7351", &salt);
        assert!(verify_pin("7351", &salt, &hash));
        assert!(!verify_pin("7352", &salt, &hash));
    }

    #[test]
    fn test_known_vector() {
        // sha256("4829" + "salt"): fija el esquema compartido con el cliente.
        assert_eq!(
            hash_pin("4829", "salt"),
            "a22032d5e2f742c752175c4375fb3e3cc39e28d818933c893fca22cf7bfab60d"
        );
    }
}
