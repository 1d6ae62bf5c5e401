use std::sync::Arc;

use crate::domain::entities::TransactionTask;
use crate::domain::error::TaskError;
use crate::domain::repository::TaskQueue;
use crate::domain::types::UserId;

/// Caso de uso: tareas de liquidación pendientes de un usuario, para que el
/// cliente muestre "procesando" en vez de un estado fantasma.
pub struct PendingTasksUseCase {
    task_queue: Arc<dyn TaskQueue>,
}

impl PendingTasksUseCase {
    pub fn new(task_queue: Arc<dyn TaskQueue>) -> Self {
        Self { task_queue }
    }

    pub async fn execute(&self, user_id: UserId) -> Result<Vec<TransactionTask>, TaskError> {
        self.task_queue.pending_for_user(user_id).await
    }
}
