use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Amount has more than two decimal places: {0}")]
    TooPrecise(Decimal),

    #[error("Amount out of representable range: {0}")]
    OutOfRange(Decimal),

    #[error("Arithmetic overflow")]
    Overflow,
}

/// Monto monetario en kobo (centésimas de Naira).
///
/// Internamente todo el sistema opera con unidades menores enteras para que
/// las sumas y restas de saldos sean exactas. En las fronteras (JSON de la
/// API, payloads de proveedores) el monto se convierte a Naira decimal con
/// dos posiciones.
///
/// # Examples
/// ```
/// use common::Kobo;
/// use rust_decimal::Decimal;
/// use std::str::FromStr;
///
/// let amount = Kobo::from_naira(Decimal::from_str("200.00").unwrap()).unwrap();
/// assert_eq!(amount, Kobo(20_000));
/// assert_eq!(amount.to_naira().to_string(), "200.00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Kobo(pub i64);

impl Kobo {
    pub const ZERO: Kobo = Kobo(0);

    /// Convierte Naira decimales a kobo. Rechaza montos con más de dos
    /// decimales; el llamador decide si redondear antes.
    pub fn from_naira(naira: Decimal) -> Result<Self, MoneyError> {
        let scaled = naira * Decimal::from(100);
        if scaled.fract() != Decimal::ZERO {
            return Err(MoneyError::TooPrecise(naira));
        }
        scaled
            .to_i64()
            .map(Kobo)
            .ok_or(MoneyError::OutOfRange(naira))
    }

    /// Convierte a Naira con dos decimales (la forma serializada).
    pub fn to_naira(self) -> Decimal {
        let mut d = Decimal::from(self.0) / Decimal::from(100);
        d.rescale(2);
        d
    }

    /// Aplica una tasa porcentual (p. ej. `0.03`) redondeando al kobo más
    /// cercano, mitad hacia arriba, igual que la contabilidad de comisiones.
    pub fn percentage(self, rate: Decimal) -> Result<Self, MoneyError> {
        let result = (Decimal::from(self.0) * rate)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        result.to_i64().map(Kobo).ok_or(MoneyError::Overflow)
    }

    pub fn checked_add(self, other: Kobo) -> Result<Kobo, MoneyError> {
        self.0
            .checked_add(other.0)
            .map(Kobo)
            .ok_or(MoneyError::Overflow)
    }

    pub fn checked_sub(self, other: Kobo) -> Result<Kobo, MoneyError> {
        self.0
            .checked_sub(other.0)
            .map(Kobo)
            .ok_or(MoneyError::Overflow)
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn abs(self) -> Kobo {
        Kobo(self.0.abs())
    }
}

impl Add for Kobo {
    type Output = Kobo;

    fn add(self, rhs: Kobo) -> Kobo {
        Kobo(self.0 + rhs.0)
    }
}

impl Sub for Kobo {
    type Output = Kobo;

    fn sub(self, rhs: Kobo) -> Kobo {
        Kobo(self.0 - rhs.0)
    }
}

impl Neg for Kobo {
    type Output = Kobo;

    fn neg(self) -> Kobo {
        Kobo(-self.0)
    }
}

impl AddAssign for Kobo {
    fn add_assign(&mut self, rhs: Kobo) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Kobo {
    fn sub_assign(&mut self, rhs: Kobo) {
        self.0 -= rhs.0;
    }
}

impl Sum for Kobo {
    fn sum<I: Iterator<Item = Kobo>>(iter: I) -> Kobo {
        iter.fold(Kobo::ZERO, |acc, k| acc + k)
    }
}

impl fmt::Display for Kobo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "₦{}", self.to_naira())
    }
}

// En JSON los montos viajan como Naira decimales, no como kobo crudos.
impl Serialize for Kobo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Serialize::serialize(&self.to_naira(), serializer)
    }
}

impl<'de> Deserialize<'de> for Kobo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let naira = <Decimal as Deserialize>::deserialize(deserializer)?;
        Kobo::from_naira(naira).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case("200.00", 20_000)]
    #[case("0.01", 1)]
    #[case("970", 97_000)]
    #[case("-30.00", -3_000)]
    fn test_from_naira_exact(#[case] input: &str, #[case] expected: i64) {
        let d = Decimal::from_str(input).unwrap();
        assert_eq!(Kobo::from_naira(d).unwrap(), Kobo(expected));
    }

    #[test]
    fn test_from_naira_rejects_sub_kobo_precision() {
        let d = Decimal::from_str("10.005").unwrap();
        assert!(matches!(
            Kobo::from_naira(d),
            Err(MoneyError::TooPrecise(_))
        ));
    }

    #[test]
    fn test_to_naira_has_two_decimals() {
        assert_eq!(Kobo(20_000).to_naira().to_string(), "200.00");
        assert_eq!(Kobo(1).to_naira().to_string(), "0.01");
    }

    #[rstest]
    #[case(20_000, "0.03", 600)] // 3% de ₦200 = ₦6.00
    #[case(100_000, "0.016", 1_600)] // 1.6% de ₦1000 = ₦16.00
    #[case(50_000, "0.01", 500)] // 1% de ₦500 = ₦5.00
    #[case(33_333, "0.01", 333)] // redondeo al kobo más cercano
    fn test_percentage(#[case] amount: i64, #[case] rate: &str, #[case] expected: i64) {
        let rate = Decimal::from_str(rate).unwrap();
        assert_eq!(Kobo(amount).percentage(rate).unwrap(), Kobo(expected));
    }

    #[test]
    fn test_serde_round_trip_as_naira() {
        let amount = Kobo(97_000);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"970.00\"");
        let back: Kobo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }

    #[test]
    fn test_deserialize_accepts_plain_numbers() {
        let amount: Kobo = serde_json::from_str("200").unwrap();
        assert_eq!(amount, Kobo(20_000));
    }

    #[test]
    fn test_sum_of_reservations() {
        let held = [Kobo(10_000), Kobo(5_000), Kobo(2_500)];
        let total: Kobo = held.iter().copied().sum();
        assert_eq!(total, Kobo(17_500));
    }
}
