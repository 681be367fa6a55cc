use std::sync::Arc;

use async_trait::async_trait;
use common::error::{AppError, Res};
use db::models::transaction::{ProcessState, Transaction};
use db::transactions::{self, BatchFilter};
use sqlx::PgPool;
use uuid::Uuid;

/// Ledger operations the reconciliation jobs depend on. Production wires
/// `PgTransactionStore`; tests wire an in-memory fake.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn list_batch(&self, filter: &BatchFilter) -> Res<Vec<Transaction>>;

    /// Expected-state-guarded transition. `Ok(None)` means another run moved
    /// the row first.
    async fn transition_state(
        &self,
        id: &Uuid,
        from: ProcessState,
        to: ProcessState,
        external_id: Option<Uuid>,
        payment_method_id: Option<Uuid>,
    ) -> Res<Option<Transaction>>;

    async fn increment_attempts(&self, id: &Uuid) -> Res<Option<Transaction>>;
}

pub struct PgTransactionStore {
    pool: Arc<PgPool>,
}

impl PgTransactionStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        PgTransactionStore { pool }
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn list_batch(&self, filter: &BatchFilter) -> Res<Vec<Transaction>> {
        transactions::list_batch(&*self.pool, filter).await
    }

    async fn transition_state(
        &self,
        id: &Uuid,
        from: ProcessState,
        to: ProcessState,
        external_id: Option<Uuid>,
        payment_method_id: Option<Uuid>,
    ) -> Res<Option<Transaction>> {
        transactions::transition_state(&*self.pool, id, from, to, external_id, payment_method_id)
            .await
            .map_err(|err| match err {
                AppError::Database(db_err) if db::is_unique_violation(&db_err) => {
                    AppError::Conflict(format!(
                        "gateway payment already recorded on another transaction (id {})",
                        id
                    ))
                }
                other => other,
            })
    }

    async fn increment_attempts(&self, id: &Uuid) -> Res<Option<Transaction>> {
        transactions::increment_attempts(&*self.pool, id).await
    }
}
