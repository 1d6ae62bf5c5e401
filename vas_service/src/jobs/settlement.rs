use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::entities::Notification;
use crate::domain::error::SettlementError;
use crate::domain::repository::{NotificationSender, TaskQueue, TransactionLedger};
use crate::use_cases::settle_transaction::SettleTransactionUseCase;

/// Intentos máximos de una tarea antes de marcarla FAILED y alertar.
const MAX_ATTEMPTS: i32 = 5;
/// Lease de una tarea reclamada, en segundos.
const LEASE_SECONDS: i64 = 60;
/// Base del backoff exponencial.
const BACKOFF_BASE_SECONDS: i64 = 30;
/// Tope del backoff.
const BACKOFF_CAP_SECONDS: i64 = 1_800;

// 2^attempts × base, con tope.
fn backoff(attempts: i32) -> Duration {
    let factor = 1i64 << attempts.clamp(0, 16);
    Duration::seconds((BACKOFF_BASE_SECONDS * factor).min(BACKOFF_CAP_SECONDS))
}

/// Worker de liquidación: drena la cola durable de tareas post-proveedor.
///
/// Varios workers corren en paralelo; el reclamo atómico garantiza que cada
/// tarea la procese a lo sumo uno. Si la transacción queda sin liquidar
/// tras agotar reintentos, el usuario ya fue servido: la fila conserva
/// SUCCESS con la bandera de fallo de liquidación y un operador interviene.
pub struct SettlementWorker {
    task_queue: Arc<dyn TaskQueue>,
    ledger: Arc<dyn TransactionLedger>,
    notifications: Arc<dyn NotificationSender>,
    settle: Arc<SettleTransactionUseCase>,
}

impl SettlementWorker {
    pub fn new(
        task_queue: Arc<dyn TaskQueue>,
        ledger: Arc<dyn TransactionLedger>,
        notifications: Arc<dyn NotificationSender>,
        settle: Arc<SettleTransactionUseCase>,
    ) -> Self {
        Self {
            task_queue,
            ledger,
            notifications,
            settle,
        }
    }

    /// Procesa tareas listas hasta vaciar la cola. Una pasada por tick del
    /// scheduler.
    pub async fn run(&self) {
        loop {
            let task = match self.task_queue.claim_next(LEASE_SECONDS).await {
                Ok(Some(task)) => task,
                Ok(None) => return,
                Err(e) => {
                    error!("Failed to claim settlement task: {}", e);
                    return;
                }
            };

            let task_id = task.id;
            match self.settle.execute(&task).await {
                Ok(()) => {
                    if let Err(e) = self.task_queue.complete(task_id).await {
                        error!("Failed to mark task {} done: {}", task_id, e);
                    }
                }
                Err(SettlementError::Retryable(reason)) => {
                    let attempts = task.attempts + 1;
                    if attempts >= MAX_ATTEMPTS {
                        self.give_up(&task, &reason).await;
                    } else {
                        let next_run_at = Utc::now() + backoff(attempts);
                        warn!(
                            "Settlement attempt {} failed for {} ({}), retrying at {}",
                            attempts, task.transaction_id, reason, next_run_at
                        );
                        if let Err(e) = self
                            .task_queue
                            .retry_later(task_id, attempts, &reason, next_run_at)
                            .await
                        {
                            error!("Failed to reschedule task {}: {}", task_id, e);
                        }
                    }
                }
                Err(SettlementError::InvalidPayload(e)) => {
                    // Sin payload no hay reintento que valga.
                    error!("Task {} has an unusable payload: {}", task_id, e);
                    self.give_up(&task, &e.to_string()).await;
                }
            }
        }
    }

    async fn give_up(&self, task: &crate::domain::entities::TransactionTask, reason: &str) {
        error!(
            "Settlement exhausted for {} after {} attempts: {}",
            task.transaction_id, task.attempts, reason
        );

        if let Err(e) = self.task_queue.fail(task.id, reason).await {
            error!("Failed to mark task {} failed: {}", task.id, e);
        }
        if let Err(e) = self.ledger.set_settlement_failed(task.transaction_id).await {
            error!(
                "Failed to flag settlement failure on {}: {}",
                task.transaction_id, e
            );
        }

        let alert = Notification {
            id: Uuid::new_v4(),
            user_id: None,
            category: "settlement".to_string(),
            title: "Settlement failed after retries".to_string(),
            body: format!(
                "Transaction {} was served by the provider but could not be settled: {}",
                task.transaction_id, reason
            ),
            related_reference: None,
            created_at: Utc::now(),
        };
        if let Err(e) = self.notifications.notify(alert).await {
            error!("Failed to emit operator alert: {}", e);
        }

        info!(
            "Operator alert emitted for unsettled transaction {}",
            task.transaction_id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 30)]
    #[case(1, 60)]
    #[case(2, 120)]
    #[case(4, 480)]
    #[case(10, 1_800)] // tope
    fn test_backoff_is_exponential_and_capped(#[case] attempts: i32, #[case] seconds: i64) {
        assert_eq!(backoff(attempts), Duration::seconds(seconds));
    }
}
