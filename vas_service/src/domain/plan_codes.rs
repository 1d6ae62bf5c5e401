//! Traducción de códigos de plan entre proveedores.
//!
//! Cada proveedor nombra el mismo paquete de datos con un código propio.
//! Primero se intenta el mapa exacto (levantado de catálogos reales);
//! si no hay entrada, un extractor de patrones arma el código destino a
//! partir del tamaño (MB/GB) y la vigencia. Un código irresoluble falla
//! rápido: adivinar produce entregas de plan equivocado.

use crate::domain::entities::Provider;
use crate::domain::error::ProviderError;

/// Mapa exacto Peyflex → Monnify.
fn peyflex_to_monnify(code: &str) -> Option<&'static str> {
    let target = match code {
        // MTN
        "M1GBS" => "1815",    // 1GB 7 días
        "M230MBS" => "1810",  // 230MB diario
        "M2GBS" => "1836",    // 2GB 2 días
        "M205GBS" => "1814",  // 2.5GB → 1.5GB 2 días
        "M2m5GBS" => "1814",  // variante del anterior
        "M3m2GBS" => "1835",  // 3.2GB → 3.5GB semanal
        // AIRTEL
        "A2GB30" => "1849",
        "A3GB30" => "1850",
        "A10GB30" => "1854",
        "A18GB30" => "1856",
        "A1GB7" => "1953",
        "A200MB2" => "1954",
        "A8GB30" => "1975",
        "A75MB1" => "1976",
        // GLO
        "G1GB30" => "2065",
        "G2GB30" => "2067",
        "G3GB30" => "2069",
        "G500MB30" => "2064",
        "G1GB7" => "1923",
        "G2GB7" => "1925",
        "G300MB" => "1927",
        "G1_5GB30" => "2066",
        "G2_5GB30" => "2068",
        // 9MOBILE
        "9M2GB30" => "1874",
        "9M4_5GB30" => "1875",
        "9M83MB1" => "1870",
        "9M650MB7" => "2040",
        "9M2_3GB30" => "2049",
        "9M5_2GB30" => "2050",
        "9M8_4GB30" => "2051",
        "9M11_4GB30" => "2052",
        "9M250MB1" => "2054",
        "9M3_5GB" => "2059",
        _ => return None,
    };
    Some(target)
}

/// Mapa exacto Monnify → Peyflex (inverso del anterior).
fn monnify_to_peyflex(code: &str) -> Option<&'static str> {
    let target = match code {
        "1815" => "M1GBS",
        "1810" => "M230MBS",
        "1836" => "M2GBS",
        "1814" => "M205GBS",
        "1835" => "M3m2GBS",
        "1849" => "A2GB30",
        "1850" => "A3GB30",
        "1854" => "A10GB30",
        "1856" => "A18GB30",
        "1953" => "A1GB7",
        "1954" => "A200MB2",
        "1975" => "A8GB30",
        "1976" => "A75MB1",
        "2065" => "G1GB30",
        "2067" => "G2GB30",
        "2069" => "G3GB30",
        "2064" => "G500MB30",
        "1923" => "G1GB7",
        "1925" => "G2GB7",
        "1927" => "G300MB",
        "2066" => "G1_5GB30",
        "2068" => "G2_5GB30",
        "1874" => "9M2GB30",
        "1875" => "9M4_5GB30",
        "1870" => "9M83MB1",
        "2040" => "9M650MB7",
        "2049" => "9M2_3GB30",
        "2050" => "9M5_2GB30",
        "2051" => "9M8_4GB30",
        "2052" => "9M11_4GB30",
        "2054" => "9M250MB1",
        "2059" => "9M3_5GB",
        _ => return None,
    };
    Some(target)
}

/// Tamaño de datos extraído de un código o nombre de plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanShape {
    pub size_value: String,
    pub size_unit: SizeUnit,
    pub validity_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    Mb,
    Gb,
}

impl SizeUnit {
    fn upper(self) -> &'static str {
        match self {
            SizeUnit::Mb => "MB",
            SizeUnit::Gb => "GB",
        }
    }

    fn lower(self) -> &'static str {
        match self {
            SizeUnit::Mb => "mb",
            SizeUnit::Gb => "gb",
        }
    }
}

/// Extrae `<número>(mb|gb)` y la vigencia de un texto de plan. La vigencia
/// por omisión es 30 días, como en los catálogos de ambos proveedores.
pub fn extract_shape(text: &str) -> Option<PlanShape> {
    let lower = text.to_lowercase();
    let bytes = lower.as_bytes();

    let mut size: Option<(String, SizeUnit, usize)> = None;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            let number = &lower[start..i];
            if lower[i..].starts_with("gb") {
                size = Some((number.to_string(), SizeUnit::Gb, i + 2));
                break;
            }
            if lower[i..].starts_with("mb") {
                size = Some((number.to_string(), SizeUnit::Mb, i + 2));
                break;
            }
        } else {
            i += 1;
        }
    }

    let (size_value, size_unit, rest_at) = size?;
    let rest = &lower[rest_at..];

    let validity_days = extract_validity_days(rest).unwrap_or(30);

    Some(PlanShape {
        size_value,
        size_unit,
        validity_days,
    })
}

// Busca `<número>` seguido (con separadores opcionales) de day/week/month.
fn extract_validity_days(text: &str) -> Option<u32> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let number: u32 = text[start..i].parse().ok()?;
            let mut rest = &text[i..];
            rest = rest.trim_start_matches(|c| matches!(c, '_' | '-' | ' '));
            if rest.starts_with("day") {
                return Some(number);
            }
            if rest.starts_with("week") {
                return Some(number * 7);
            }
            if rest.starts_with("month") {
                return Some(number * 30);
            }
        } else {
            i += 1;
        }
    }
    None
}

fn validity_suffix(days: u32) -> &'static str {
    match days {
        1 => "1D",
        7 => "7D",
        _ => "30D",
    }
}

fn validity_word(days: u32) -> String {
    match days {
        1 => "1day".to_string(),
        n => format!("{}days", n),
    }
}

// Red base sin sufijos de familia, p. ej. `mtn_gifting` → `mtn`.
fn base_network(network: &str) -> String {
    let lower = network.to_lowercase();
    lower
        .split('_')
        .next()
        .unwrap_or(&lower)
        .to_string()
}

/// Compone el código destino a partir del patrón del plan:
/// Monnify `MTN_DATA_1GB_30D`, Peyflex `mtn_1gb_30days`.
pub fn translate_by_pattern(code: &str, to: Provider, network: &str) -> Option<String> {
    let shape = extract_shape(code)?;
    let network = base_network(network);

    match to {
        Provider::Monnify => Some(format!(
            "{}_DATA_{}{}_{}",
            network.to_uppercase(),
            shape.size_value.to_uppercase(),
            shape.size_unit.upper(),
            validity_suffix(shape.validity_days)
        )),
        Provider::Peyflex => Some(format!(
            "{}_{}{}_{}",
            network,
            shape.size_value,
            shape.size_unit.lower(),
            validity_word(shape.validity_days)
        )),
        Provider::Internal => None,
    }
}

/// Traduce un código de plan al dialecto del proveedor destino.
///
/// Orden: mapa exacto, luego patrón. Sin resultado es un error duro.
pub fn translate(code: &str, from: Provider, to: Provider) -> Result<String, ProviderError> {
    translate_for_network(code, from, to, "")
}

pub fn translate_for_network(
    code: &str,
    from: Provider,
    to: Provider,
    network: &str,
) -> Result<String, ProviderError> {
    if from == to {
        return Ok(code.to_string());
    }

    let exact = match (from, to) {
        (Provider::Peyflex, Provider::Monnify) => peyflex_to_monnify(code),
        (Provider::Monnify, Provider::Peyflex) => monnify_to_peyflex(code),
        _ => None,
    };

    if let Some(found) = exact {
        return Ok(found.to_string());
    }

    translate_by_pattern(code, to, network)
        .ok_or_else(|| ProviderError::UnknownPlanCode(code.to_string()))
}

/// Adapta un código de plan al proveedor que va a ejecutar el vend.
///
/// Los códigos de Monnify son numéricos y los de Peyflex alfanuméricos, así
/// que el origen es decidible: un código ya nativo pasa intacto; uno
/// foráneo se traduce (mapa exacto, luego patrón) o falla rápido.
pub fn adapt_for_provider(
    code: &str,
    target: Provider,
    network: &str,
) -> Result<String, ProviderError> {
    let is_numeric = !code.is_empty() && code.chars().all(|c| c.is_ascii_digit());

    match target {
        Provider::Monnify if is_numeric => Ok(code.to_string()),
        Provider::Monnify => translate_for_network(code, Provider::Peyflex, target, network),
        Provider::Peyflex if !is_numeric => Ok(code.to_string()),
        Provider::Peyflex => translate_for_network(code, Provider::Monnify, target, network),
        Provider::Internal => Ok(code.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("M1GBS", "1815")]
    #[case("A2GB30", "1849")]
    #[case("G500MB30", "2064")]
    #[case("9M2_3GB30", "2049")]
    fn test_exact_translation_peyflex_to_monnify(#[case] from: &str, #[case] to: &str) {
        let result =
            translate_for_network(from, Provider::Peyflex, Provider::Monnify, "mtn").unwrap();
        assert_eq!(result, to);
    }

    #[rstest]
    #[case("1815", "M1GBS")]
    #[case("2067", "G2GB30")]
    #[case("1954", "A200MB2")]
    fn test_exact_translation_monnify_to_peyflex(#[case] from: &str, #[case] to: &str) {
        let result =
            translate_for_network(from, Provider::Monnify, Provider::Peyflex, "glo").unwrap();
        assert_eq!(result, to);
    }

    #[test]
    fn test_pattern_translation_to_monnify() {
        let result = translate_for_network(
            "mtn_1gb_7days",
            Provider::Peyflex,
            Provider::Monnify,
            "mtn",
        )
        .unwrap();
        assert_eq!(result, "MTN_DATA_1GB_7D");
    }

    #[test]
    fn test_pattern_translation_to_peyflex() {
        let result = translate_for_network(
            "AIRTEL_DATA_2GB_30D",
            Provider::Monnify,
            Provider::Peyflex,
            "airtel_data",
        )
        .unwrap();
        assert_eq!(result, "airtel_2gb_30days");
    }

    #[test]
    fn test_pattern_handles_weeks_and_months() {
        assert_eq!(
            extract_shape("glo_2gb_1week").unwrap().validity_days,
            7
        );
        assert_eq!(
            extract_shape("glo_2gb_2months").unwrap().validity_days,
            60
        );
    }

    #[test]
    fn test_pattern_defaults_to_thirty_days() {
        let shape = extract_shape("9mobile_500mb_plan").unwrap();
        assert_eq!(shape.validity_days, 30);
    }

    #[test]
    fn test_unresolvable_code_fails_fast() {
        let result =
            translate_for_network("WEIRD-CODE", Provider::Peyflex, Provider::Monnify, "mtn");
        assert!(matches!(result, Err(ProviderError::UnknownPlanCode(_))));
    }

    #[test]
    fn test_same_provider_is_identity() {
        let result =
            translate_for_network("1815", Provider::Monnify, Provider::Monnify, "mtn").unwrap();
        assert_eq!(result, "1815");
    }

    #[rstest]
    #[case("1815", Provider::Monnify, "1815")] // nativo, intacto
    #[case("M1GBS", Provider::Monnify, "1815")] // foráneo, mapa exacto
    #[case("M1GBS", Provider::Peyflex, "M1GBS")] // nativo, intacto
    #[case("1815", Provider::Peyflex, "M1GBS")] // foráneo, mapa exacto
    fn test_adapt_for_provider(
        #[case] code: &str,
        #[case] target: Provider,
        #[case] expected: &str,
    ) {
        assert_eq!(adapt_for_provider(code, target, "mtn").unwrap(), expected);
    }

    #[test]
    fn test_adapt_foreign_unresolvable_fails() {
        let result = adapt_for_provider("12345", Provider::Peyflex, "mtn");
        assert!(matches!(result, Err(ProviderError::UnknownPlanCode(_))));
    }

    #[test]
    fn test_decimal_sizes_survive_pattern() {
        let result = translate_for_network(
            "glo_1.5gb_30days",
            Provider::Peyflex,
            Provider::Monnify,
            "glo",
        )
        .unwrap();
        assert_eq!(result, "GLO_DATA_1.5GB_30D");
    }
}
