use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::repository::{TaskQueue, WalletStore};

/// Minutos tras los cuales una reserva HELD sin resolver se libera. Cubre
/// el caso del orquestador que murió entre la reserva y el encolado.
const STALE_RESERVATION_MINUTES: i64 = 10;

/// Barrido de reservas vencidas.
pub struct ReservationSweeper {
    wallet_store: Arc<dyn WalletStore>,
}

impl ReservationSweeper {
    pub fn new(wallet_store: Arc<dyn WalletStore>) -> Self {
        Self { wallet_store }
    }

    pub async fn run(&self) {
        let cutoff = Utc::now() - Duration::minutes(STALE_RESERVATION_MINUTES);
        match self.wallet_store.release_stale_reservations(cutoff).await {
            Ok(0) => {}
            Ok(released) => info!("Released {} stale reservations", released),
            Err(e) => error!("Stale reservation sweep failed: {}", e),
        }
    }
}

/// Barrido de leases vencidos: tareas PROCESSING cuyo worker murió vuelven
/// a PENDING.
pub struct LeaseSweeper {
    task_queue: Arc<dyn TaskQueue>,
}

impl LeaseSweeper {
    pub fn new(task_queue: Arc<dyn TaskQueue>) -> Self {
        Self { task_queue }
    }

    pub async fn run(&self) {
        match self.task_queue.release_expired_leases().await {
            Ok(0) => {}
            Ok(released) => info!("Returned {} expired task leases to PENDING", released),
            Err(e) => error!("Lease sweep failed: {}", e),
        }
    }
}
