pub mod admin_adjust;
pub mod buy_airtime;
pub mod buy_data;
pub mod catalog;
pub mod create_wallet;
pub mod get_balance;
pub mod list_transactions;
pub mod manage_pin;
pub mod pending_tasks;
pub mod process_webhook;
pub mod settle_transaction;

use common::Kobo;
use serde::Serialize;

use crate::domain::entities::Provider;
use crate::domain::types::TransactionId;

/// Respuesta de una compra aceptada: el vend ya ocurrió, el débito quedó
/// reservado y la liquidación viaja por la cola durable.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PurchaseReceipt {
    pub transaction_id: TransactionId,
    pub reference: String,
    /// Siempre "QUEUED": los efectos post-proveedor son asíncronos.
    pub processing_status: &'static str,
    pub provider: Provider,
    pub amount: Kobo,
    pub total_amount: Kobo,
    pub available_balance: Kobo,
}

/// Ventana del guardia anti doble clic, en minutos.
pub const DUPLICATE_WINDOW_MINUTES: i64 = 5;

/// Reintentos ante conflicto optimista del Wallet Store.
pub const CONFLICT_RETRIES: u32 = 3;
