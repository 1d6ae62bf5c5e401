//! Validador de producto entregado.
//!
//! Tras un vend exitoso se compara lo pedido contra lo que el proveedor
//! dice haber entregado. Una divergencia NO es un fallo: el proveedor
//! entregó algo y el usuario ya recibió valor; la transacción queda SUCCESS
//! y la diferencia pasa a conciliación humana.

use common::Kobo;

use crate::domain::plan_codes::extract_shape;

/// Tolerancia de monto entre pedido y entregado: ₦50.
pub const AMOUNT_TOLERANCE: Kobo = Kobo(5_000);

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryCheck {
    pub matches: bool,
    pub reason: Option<String>,
    pub delivered_plan: String,
}

/// Compara el plan pedido con el entregado.
///
/// Criterio: los nombres comparten al menos una palabra clave de tamaño o
/// vigencia, y los montos difieren a lo sumo ₦50. Si el proveedor no
/// reporta nombre ni monto no hay evidencia de divergencia y se acepta.
pub fn check_delivery(
    requested_name: Option<&str>,
    requested_amount: Kobo,
    delivered_name: Option<&str>,
    delivered_amount: Option<Kobo>,
) -> DeliveryCheck {
    let delivered_plan = delivered_name.unwrap_or("").to_string();

    if let Some(delivered) = delivered_amount {
        let diff = (requested_amount - delivered).abs();
        if diff > AMOUNT_TOLERANCE {
            return DeliveryCheck {
                matches: false,
                reason: Some(format!(
                    "delivered amount ₦{} differs from requested ₦{} beyond tolerance",
                    delivered.to_naira(),
                    requested_amount.to_naira()
                )),
                delivered_plan,
            };
        }
    }

    match (requested_name, delivered_name) {
        (Some(requested), Some(delivered)) if !delivered.trim().is_empty() => {
            if shares_keyword(requested, delivered) {
                DeliveryCheck {
                    matches: true,
                    reason: None,
                    delivered_plan,
                }
            } else {
                DeliveryCheck {
                    matches: false,
                    reason: Some(format!(
                        "delivered product '{}' shares no size/duration keyword with '{}'",
                        delivered, requested
                    )),
                    delivered_plan,
                }
            }
        }
        // Sin nombre de producto reportado no hay qué comparar.
        _ => DeliveryCheck {
            matches: true,
            reason: None,
            delivered_plan,
        },
    }
}

// Al menos una palabra clave de tamaño (`1gb`, `500mb`) o de vigencia en
// común entre ambos nombres.
fn shares_keyword(requested: &str, delivered: &str) -> bool {
    let requested_shape = extract_shape(requested);
    let delivered_shape = extract_shape(delivered);

    match (requested_shape, delivered_shape) {
        (Some(req), Some(del)) => {
            let same_size = req.size_value == del.size_value && req.size_unit == del.size_unit;
            let same_validity = req.validity_days == del.validity_days;
            same_size || same_validity
        }
        // Alguno de los nombres no describe un paquete de datos (p. ej.
        // airtime): sin evidencia de divergencia.
        _ => true,
    }
}
