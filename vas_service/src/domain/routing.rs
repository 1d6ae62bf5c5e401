use crate::domain::entities::Provider;
use crate::domain::error::PurchaseError;

/// Redes soportadas. Fuera de esta lista la compra se rechaza en
/// validación, antes de reservar nada.
pub const KNOWN_NETWORKS: [&str; 4] = ["mtn", "airtel", "glo", "9mobile"];

pub fn is_known_network(network: &str) -> bool {
    KNOWN_NETWORKS.contains(&network.to_lowercase().as_str())
}

/// Nombre de red para el biller de Monnify (mayúsculas, sin sufijos).
pub fn monnify_network(network: &str) -> String {
    let lower = network.to_lowercase();
    lower
        .split('_')
        .next()
        .unwrap_or(&lower)
        .to_uppercase()
}

/// Nombre de red de airtime para Peyflex (minúsculas simples).
pub fn peyflex_airtime_network(network: &str) -> String {
    let lower = network.to_lowercase();
    lower.split('_').next().unwrap_or(&lower).to_string()
}

/// Ruta resuelta para una compra de datos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRoute {
    pub provider: Provider,
    /// Código de red en el dialecto del proveedor elegido.
    pub provider_network: String,
}

/// Resuelve proveedor y red para una compra de datos a partir del tipo de
/// plan elegido por el usuario.
///
/// Regla determinista, sin fallback implícito: la elección explícita del
/// usuario es autoritativa. Las familias *_share y *_gifting van a Peyflex;
/// los planes regulares (o la red a secas) van a Monnify. Un tipo fuera de
/// la tabla es un error, no una adivinanza.
pub fn route_data_purchase(plan_type: &str, network: &str) -> Result<DataRoute, PurchaseError> {
    let plan_type = plan_type.trim().to_lowercase();
    let network_lower = network.trim().to_lowercase();

    let route = match plan_type.as_str() {
        "mtn_data_share" | "mtn_share" => DataRoute {
            provider: Provider::Peyflex,
            provider_network: "mtn_data_share".to_string(),
        },
        "mtn_gifting_data" | "mtn_gifting" => DataRoute {
            provider: Provider::Peyflex,
            provider_network: "mtn_gifting_data".to_string(),
        },
        "airtel_data" | "airtel_share" => DataRoute {
            provider: Provider::Peyflex,
            provider_network: "airtel_data".to_string(),
        },
        "glo_data" | "glo_share" => DataRoute {
            provider: Provider::Peyflex,
            provider_network: "glo_data".to_string(),
        },
        "9mobile_data" | "9mobile_share" => DataRoute {
            provider: Provider::Peyflex,
            provider_network: "9mobile_data_share".to_string(),
        },
        "9mobile_gifting_data" | "9mobile_gifting" => DataRoute {
            provider: Provider::Peyflex,
            provider_network: "9mobile_gifting_data".to_string(),
        },
        "all_plans" | "regular_plans" | "auto" | "mtn" | "airtel" | "glo" | "9mobile" => DataRoute {
            provider: Provider::Monnify,
            provider_network: monnify_network(&network_lower),
        },
        _ => return Err(PurchaseError::UnknownPlanType(plan_type)),
    };

    Ok(route)
}

/// Sugerencia de familias alternativas para una red cuando el proveedor
/// elegido falla. Los planes de datos no son intercambiables entre
/// proveedores, así que no hay fallback: se le dice al usuario qué otras
/// familias existen.
pub fn alternatives_for(network: &str, plan_type: &str) -> String {
    let network = network.to_lowercase();
    let plan_type = plan_type.to_lowercase();

    match network.as_str() {
        "mtn" => match plan_type.as_str() {
            "mtn_data_share" | "mtn_share" => {
                "Try \"REGULAR PLANS\" or \"MTN GIFTING\" for different options.".to_string()
            }
            "mtn_gifting_data" | "mtn_gifting" => {
                "Try \"REGULAR PLANS\" or \"MTN SHARE\" for different options.".to_string()
            }
            _ => "Try \"MTN SHARE\" or \"MTN GIFTING\" for different options.".to_string(),
        },
        "airtel" => match plan_type.as_str() {
            "airtel_data" | "airtel_share" => {
                "Try \"REGULAR PLANS\" for different options.".to_string()
            }
            _ => "Try \"AIRTEL SHARE\" for different options.".to_string(),
        },
        "glo" => match plan_type.as_str() {
            "glo_data" | "glo_share" => "Try \"REGULAR PLANS\" for different options.".to_string(),
            _ => "Try \"GLO SHARE\" for different options.".to_string(),
        },
        "9mobile" => match plan_type.as_str() {
            "9mobile_data" | "9mobile_share" => {
                "Try \"REGULAR PLANS\" or \"9MOBILE GIFTING\" for different options.".to_string()
            }
            "9mobile_gifting_data" | "9mobile_gifting" => {
                "Try \"REGULAR PLANS\" or \"9MOBILE SHARE\" for different options.".to_string()
            }
            _ => "Try \"9MOBILE SHARE\" or \"9MOBILE GIFTING\" for different options.".to_string(),
        },
        _ => "Try a different plan type or network.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("mtn_share", "mtn", Provider::Peyflex, "mtn_data_share")]
    #[case("mtn_data_share", "mtn", Provider::Peyflex, "mtn_data_share")]
    #[case("mtn_gifting", "mtn", Provider::Peyflex, "mtn_gifting_data")]
    #[case("airtel_share", "airtel", Provider::Peyflex, "airtel_data")]
    #[case("glo_data", "glo", Provider::Peyflex, "glo_data")]
    #[case("9mobile_share", "9mobile", Provider::Peyflex, "9mobile_data_share")]
    #[case("9mobile_gifting", "9mobile", Provider::Peyflex, "9mobile_gifting_data")]
    #[case("all_plans", "mtn", Provider::Monnify, "MTN")]
    #[case("regular_plans", "glo", Provider::Monnify, "GLO")]
    #[case("auto", "9mobile", Provider::Monnify, "9MOBILE")]
    #[case("airtel", "airtel", Provider::Monnify, "AIRTEL")]
    fn test_route_data_purchase(
        #[case] plan_type: &str,
        #[case] network: &str,
        #[case] provider: Provider,
        #[case] provider_network: &str,
    ) {
        let route = route_data_purchase(plan_type, network).unwrap();
        assert_eq!(route.provider, provider);
        assert_eq!(route.provider_network, provider_network);
    }

    #[test]
    fn test_unknown_plan_type_is_rejected_not_guessed() {
        let result = route_data_purchase("mtn_sme", "mtn");
        assert!(matches!(result, Err(PurchaseError::UnknownPlanType(_))));
    }

    #[test]
    fn test_monnify_network_strips_suffixes() {
        assert_eq!(monnify_network("airtel_data"), "AIRTEL");
        assert_eq!(monnify_network("mtn_gifting"), "MTN");
        assert_eq!(monnify_network("9mobile"), "9MOBILE");
    }

    #[test]
    fn test_alternatives_never_suggest_the_failed_family() {
        let suggestion = alternatives_for("mtn", "mtn_share");
        assert!(!suggestion.contains("MTN SHARE"));
        assert!(suggestion.contains("MTN GIFTING"));
    }
}
