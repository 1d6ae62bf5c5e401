use async_trait::async_trait;
use common::Kobo;
#[cfg(test)]
use mockall::automock;

use crate::domain::entities::{BankAccount, DataPlan, ExpenseEvent, NetworkInfo, Provider};
use crate::domain::error::{LedgerError, ProviderError};

/// Resultado de un vend exitoso, normalizado entre proveedores.
#[derive(Debug, Clone, PartialEq)]
pub struct VendSuccess {
    pub provider: Provider,
    /// Referencia del proveedor para la operación ejecutada.
    pub transaction_reference: String,
    /// Nuestra referencia de idempotencia, eco del proveedor cuando aplica.
    pub vend_reference: String,
    pub product_name: Option<String>,
    pub vend_amount: Option<Kobo>,
    pub commission: Option<Kobo>,
    /// Payload crudo del proveedor, se adjunta como metadata del ledger.
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillerCategory {
    Airtime,
    DataBundle,
}

impl BillerCategory {
    pub fn code(self) -> &'static str {
        match self {
            BillerCategory::Airtime => "AIRTIME",
            BillerCategory::DataBundle => "DATA_BUNDLE",
        }
    }
}

/// Puerto del proveedor primario de bill-pay (Monnify): flujo multi-paso
/// auth → billers → products → validate → vend → requery.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BillsProvider: Send + Sync {
    async fn vend_airtime(
        &self,
        network: &str,
        amount: Kobo,
        phone_number: &str,
        request_id: &str,
    ) -> Result<VendSuccess, ProviderError>;

    async fn vend_data(
        &self,
        network: &str,
        plan_code: &str,
        phone_number: &str,
        request_id: &str,
    ) -> Result<VendSuccess, ProviderError>;

    async fn list_networks(
        &self,
        category: BillerCategory,
    ) -> Result<Vec<NetworkInfo>, ProviderError>;

    async fn list_data_plans(&self, network: &str) -> Result<Vec<DataPlan>, ProviderError>;
}

/// Puerto del proveedor alterno de vend directo (Peyflex): un POST por
/// operación, sin pasos previos.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VendProvider: Send + Sync {
    /// `request_id` no viaja al proveedor (su API no lo acepta); se usa
    /// como referencia local del resultado.
    async fn vend_airtime(
        &self,
        network: &str,
        amount: Kobo,
        phone_number: &str,
        request_id: &str,
    ) -> Result<VendSuccess, ProviderError>;

    async fn vend_data(
        &self,
        network: &str,
        plan_code: &str,
        phone_number: &str,
        request_id: &str,
    ) -> Result<VendSuccess, ProviderError>;

    async fn list_data_plans(&self, network: &str) -> Result<Vec<DataPlan>, ProviderError>;
}

/// Detalle de cuentas reservadas emitidas por el proveedor de fondeo.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservedAccountDetails {
    pub account_reference: String,
    pub account_name: String,
    pub accounts: Vec<BankAccount>,
}

/// Puerto de cuentas bancarias reservadas del proveedor de fondeo.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BankAccountProvider: Send + Sync {
    async fn create_reserved_account(
        &self,
        account_reference: &str,
        account_name: &str,
        customer_email: &str,
    ) -> Result<ReservedAccountDetails, ProviderError>;

    async fn fetch_reserved_account(
        &self,
        account_reference: &str,
    ) -> Result<ReservedAccountDetails, ProviderError>;
}

/// Sumidero de eventos hacia el módulo contable externo (libro de
/// ingresos/egresos del usuario). El core emite; no consulta ni muta.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerEventSink: Send + Sync {
    async fn record_expense(&self, event: ExpenseEvent) -> Result<(), LedgerError>;
}
