use std::sync::Arc;
use tracing::warn;

use crate::domain::entities::{DataPlan, NetworkInfo, PlanTypeOption, Provider};
use crate::domain::error::ProviderError;
use crate::domain::gateways::{BillerCategory, BillsProvider, VendProvider};

/// Redes estáticas de respaldo cuando el catálogo del proveedor no
/// responde: mejor una lista conocida que un 502 en la pantalla de compra.
fn static_networks() -> Vec<NetworkInfo> {
    ["MTN", "AIRTEL", "GLO", "9MOBILE"]
        .into_iter()
        .map(|name| NetworkInfo {
            id: name.to_lowercase(),
            name: name.to_string(),
            available: true,
        })
        .collect()
}

/// Caso de uso: catálogos de compra (redes, planes, familias de planes).
///
/// Las listas vienen del proveedor primario con fallback; esto es solo
/// lectura y el fallback aquí sí es seguro, a diferencia del vend.
pub struct CatalogUseCase {
    monnify: Arc<dyn BillsProvider>,
    peyflex: Arc<dyn VendProvider>,
}

impl CatalogUseCase {
    pub fn new(monnify: Arc<dyn BillsProvider>, peyflex: Arc<dyn VendProvider>) -> Self {
        Self { monnify, peyflex }
    }

    pub async fn airtime_networks(&self) -> Vec<NetworkInfo> {
        match self.monnify.list_networks(BillerCategory::Airtime).await {
            Ok(networks) if !networks.is_empty() => networks,
            Ok(_) => static_networks(),
            Err(e) => {
                warn!("Airtime network catalog unavailable: {}", e);
                static_networks()
            }
        }
    }

    pub async fn data_networks(&self) -> Vec<NetworkInfo> {
        match self.monnify.list_networks(BillerCategory::DataBundle).await {
            Ok(networks) if !networks.is_empty() => networks,
            Ok(_) => static_networks(),
            Err(e) => {
                warn!("Data network catalog unavailable: {}", e);
                static_networks()
            }
        }
    }

    /// Planes de datos: primario primero, alterno si el primario falla o
    /// viene vacío.
    pub async fn data_plans(&self, network: &str) -> Result<Vec<DataPlan>, ProviderError> {
        match self.monnify.list_data_plans(network).await {
            Ok(plans) if !plans.is_empty() => Ok(plans),
            Ok(_) | Err(_) => {
                warn!(
                    "Primary data plan catalog empty or failing for {}, using alternate",
                    network
                );
                self.peyflex.list_data_plans(network).await
            }
        }
    }

    /// Familias de planes por red. Tabla estática: es una decisión de
    /// producto, no un dato del proveedor.
    pub fn plan_types(&self, network: &str) -> Vec<PlanTypeOption> {
        match network.to_lowercase().as_str() {
            "mtn" | "mtn_data" => vec![
                PlanTypeOption {
                    id: "mtn".to_string(),
                    provider: Provider::Monnify,
                    network_code: "MTN".to_string(),
                    label: "REGULAR PLANS".to_string(),
                    description: "Standard pricing".to_string(),
                },
                PlanTypeOption {
                    id: "mtn_data_share".to_string(),
                    provider: Provider::Peyflex,
                    network_code: "mtn_data_share".to_string(),
                    label: "MTN SHARE".to_string(),
                    description: "Budget-friendly option".to_string(),
                },
                PlanTypeOption {
                    id: "mtn_gifting_data".to_string(),
                    provider: Provider::Peyflex,
                    network_code: "mtn_gifting_data".to_string(),
                    label: "MTN GIFTING".to_string(),
                    description: "Premium delivery".to_string(),
                },
            ],
            "airtel" | "airtel_data" => vec![
                PlanTypeOption {
                    id: "airtel".to_string(),
                    provider: Provider::Monnify,
                    network_code: "AIRTEL".to_string(),
                    label: "REGULAR PLANS".to_string(),
                    description: "Standard pricing".to_string(),
                },
                PlanTypeOption {
                    id: "airtel_data".to_string(),
                    provider: Provider::Peyflex,
                    network_code: "airtel_data".to_string(),
                    label: "AIRTEL SHARE".to_string(),
                    description: "Budget-friendly option".to_string(),
                },
            ],
            "glo" | "glo_data" => vec![
                PlanTypeOption {
                    id: "glo".to_string(),
                    provider: Provider::Monnify,
                    network_code: "GLO".to_string(),
                    label: "REGULAR PLANS".to_string(),
                    description: "Standard pricing".to_string(),
                },
                PlanTypeOption {
                    id: "glo_data".to_string(),
                    provider: Provider::Peyflex,
                    network_code: "glo_data".to_string(),
                    label: "GLO SHARE".to_string(),
                    description: "Budget-friendly option".to_string(),
                },
            ],
            "9mobile" | "9mobile_data" => vec![
                PlanTypeOption {
                    id: "9mobile".to_string(),
                    provider: Provider::Monnify,
                    network_code: "9MOBILE".to_string(),
                    label: "REGULAR PLANS".to_string(),
                    description: "Standard pricing".to_string(),
                },
                PlanTypeOption {
                    id: "9mobile_data".to_string(),
                    provider: Provider::Peyflex,
                    network_code: "9mobile_data_share".to_string(),
                    label: "9MOBILE SHARE".to_string(),
                    description: "Budget-friendly option".to_string(),
                },
                PlanTypeOption {
                    id: "9mobile_gifting_data".to_string(),
                    provider: Provider::Peyflex,
                    network_code: "9mobile_gifting_data".to_string(),
                    label: "9MOBILE GIFTING".to_string(),
                    description: "Premium delivery".to_string(),
                },
            ],
            _ => Vec::new(),
        }
    }
}
