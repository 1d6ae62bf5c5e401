//! Política de precios y economía unitaria.
//!
//! Airtime y datos se venden a valor de cara: el usuario paga exactamente
//! lo que ve. El margen del negocio sale de la comisión del proveedor, no
//! de un sobreprecio. Las cuotas existen solo en el fondeo.

use common::{Kobo, MoneyError};
use rust_decimal::Decimal;

use crate::domain::entities::{Provider, VasTransactionType};
use crate::domain::error::PurchaseError;
use crate::domain::repository::EconomicsFields;

/// Monto mínimo de airtime: ₦100.
pub const AIRTIME_MIN: Kobo = Kobo(10_000);
/// Monto máximo de airtime: ₦5,000.
pub const AIRTIME_MAX: Kobo = Kobo(500_000);

/// Cuota fija de depósito para usuarios no premium: ₦30.
pub const DEPOSIT_FEE: Kobo = Kobo(3_000);
/// Cuota del servicio de verificación KYC: ₦70.
pub const KYC_FEE: Kobo = Kobo(7_000);

/// La pasarela cobra 1.6% sobre todo depósito.
pub fn gateway_fee_rate() -> Decimal {
    Decimal::new(16, 3) // 0.016
}

/// Umbral de precio de emergencia: costo del proveedor ≥ 160% del valor de
/// cara (multiplicador 2.0 con tolerancia del 80%).
pub fn emergency_threshold_rate() -> Decimal {
    Decimal::new(16, 1) // 1.6
}

/// Tasa de comisión del proveedor por tipo de servicio.
pub fn commission_rate(provider: Provider, tx_type: VasTransactionType) -> Decimal {
    match (provider, tx_type) {
        (Provider::Monnify, _) => Decimal::new(3, 2), // 3%
        (Provider::Peyflex, VasTransactionType::AIRTIME) => Decimal::new(1, 2), // 1%
        (Provider::Peyflex, _) => Decimal::new(5, 2), // 5%
        (Provider::Internal, _) => Decimal::ZERO,
    }
}

/// Valida los límites de monto de una compra de airtime.
pub fn validate_airtime_amount(amount: Kobo) -> Result<(), PurchaseError> {
    if amount < AIRTIME_MIN || amount > AIRTIME_MAX {
        return Err(PurchaseError::Validation(
            "Amount must be between ₦100 and ₦5,000".to_string(),
        ));
    }
    Ok(())
}

/// Reparte la economía de un vend exitoso.
///
/// `provider_commission = amount × rate`, `provider_cost = amount −
/// comisión`. Sin cuota de pasarela en ventas VAS, así que el margen neto
/// es la comisión completa.
pub fn commission_split(
    provider: Provider,
    tx_type: VasTransactionType,
    amount: Kobo,
    delivered_amount: Option<Kobo>,
) -> Result<EconomicsFields, MoneyError> {
    let rate = commission_rate(provider, tx_type);
    let provider_commission = amount.percentage(rate)?;
    let provider_cost = amount.checked_sub(provider_commission)?;
    let gateway_fee = Kobo::ZERO;
    let net_margin = provider_commission.checked_sub(gateway_fee)?;

    // El proveedor reporta a veces un monto cobrado distinto al de cara;
    // si llega al umbral se marca para revisión de operador.
    let threshold = amount.percentage(emergency_threshold_rate())?;
    let emergency_pricing = !amount.is_zero()
        && delivered_amount
            .map(|delivered| delivered >= threshold)
            .unwrap_or(false);

    Ok(EconomicsFields {
        provider_cost,
        provider_commission,
        provider_commission_rate: rate,
        gateway_fee,
        net_margin,
        emergency_pricing,
    })
}

/// Resultado del reparto de un depósito entrante.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingSplit {
    pub deposit_fee: Kobo,
    pub gateway_fee: Kobo,
    /// Puede ser negativo: en depósitos premium no hay cuota pero la
    /// pasarela cobra igual; se registra como costo.
    pub net_deposit_revenue: Kobo,
    pub amount_to_credit: Kobo,
}

/// Reparte un depósito entrante entre cuota, costo de pasarela y monto a
/// acreditar. Un monto que no cubre la cuota es un error del evento, no un
/// crédito de cero.
pub fn funding_split(amount_paid: Kobo, is_premium: bool) -> Result<FundingSplit, MoneyError> {
    let deposit_fee = if is_premium { Kobo::ZERO } else { DEPOSIT_FEE };
    let gateway_fee = amount_paid.percentage(gateway_fee_rate())?;
    let net_deposit_revenue = deposit_fee.checked_sub(gateway_fee)?;
    let amount_to_credit = amount_paid.checked_sub(deposit_fee)?;

    Ok(FundingSplit {
        deposit_fee,
        gateway_fee,
        net_deposit_revenue,
        amount_to_credit,
    })
}

/// Participación del referente: 1% del valor de cara.
pub fn vas_share(face_value: Kobo) -> Result<Kobo, MoneyError> {
    face_value.percentage(Decimal::new(1, 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(10_000)] // exactamente ₦100
    #[case(20_000)]
    #[case(500_000)] // exactamente ₦5,000
    fn test_airtime_amount_within_bounds(#[case] amount: i64) {
        assert!(validate_airtime_amount(Kobo(amount)).is_ok());
    }

    #[rstest]
    #[case(9_999)]
    #[case(500_001)]
    #[case(0)]
    fn test_airtime_amount_out_of_bounds(#[case] amount: i64) {
        assert!(validate_airtime_amount(Kobo(amount)).is_err());
    }

    #[test]
    fn test_monnify_airtime_commission_three_percent() {
        // Escenario de referencia: ₦200 por Monnify → comisión ₦6.00.
        let econ = commission_split(
            Provider::Monnify,
            VasTransactionType::AIRTIME,
            Kobo(20_000),
            None,
        )
        .unwrap();
        assert_eq!(econ.provider_commission, Kobo(600));
        assert_eq!(econ.provider_cost, Kobo(19_400));
        assert_eq!(econ.gateway_fee, Kobo::ZERO);
        assert_eq!(econ.net_margin, Kobo(600));
        assert!(!econ.emergency_pricing);
    }

    #[test]
    fn test_peyflex_rates_differ_by_service() {
        let airtime = commission_split(
            Provider::Peyflex,
            VasTransactionType::AIRTIME,
            Kobo(50_000),
            None,
        )
        .unwrap();
        assert_eq!(airtime.provider_commission, Kobo(500)); // 1%

        let data = commission_split(Provider::Peyflex, VasTransactionType::DATA, Kobo(50_000), None)
            .unwrap();
        assert_eq!(data.provider_commission, Kobo(2_500)); // 5%
    }

    #[test]
    fn test_funding_split_regular_user() {
        // Escenario de referencia: ₦1,000 pagados, no premium.
        let split = funding_split(Kobo(100_000), false).unwrap();
        assert_eq!(split.deposit_fee, Kobo(3_000)); // ₦30
        assert_eq!(split.gateway_fee, Kobo(1_600)); // ₦16
        assert_eq!(split.net_deposit_revenue, Kobo(1_400)); // ₦14
        assert_eq!(split.amount_to_credit, Kobo(97_000)); // ₦970
    }

    #[test]
    fn test_funding_split_premium_user_tracks_gateway_cost() {
        let split = funding_split(Kobo(100_000), true).unwrap();
        assert_eq!(split.deposit_fee, Kobo::ZERO);
        assert_eq!(split.amount_to_credit, Kobo(100_000));
        // Ingreso negativo: la pasarela cobró y no hubo cuota.
        assert_eq!(split.net_deposit_revenue, Kobo(-1_600));
    }

    #[test]
    fn test_funding_at_or_below_fee_is_not_creditable() {
        let split = funding_split(Kobo(3_000), false).unwrap();
        assert!(!split.amount_to_credit.is_positive());

        let split = funding_split(Kobo(2_000), false).unwrap();
        assert!(split.amount_to_credit.is_negative());
    }

    #[test]
    fn test_emergency_pricing_flags_inflated_delivery() {
        let econ = commission_split(
            Provider::Monnify,
            VasTransactionType::DATA,
            Kobo(50_000),
            Some(Kobo(90_000)), // entregado a 180% del valor de cara
        )
        .unwrap();
        assert!(econ.emergency_pricing);

        let econ = commission_split(
            Provider::Monnify,
            VasTransactionType::DATA,
            Kobo(50_000),
            Some(Kobo(50_000)),
        )
        .unwrap();
        assert!(!econ.emergency_pricing);
    }

    #[test]
    fn test_vas_share_is_one_percent() {
        assert_eq!(vas_share(Kobo(20_000)).unwrap(), Kobo(200));
    }
}
