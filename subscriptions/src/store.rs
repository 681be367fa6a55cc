use std::sync::Arc;

use async_trait::async_trait;
use common::error::Res;
use db::models::subscription::{SubscriptionStatus, SubscriptionType, UserSubscription};
use db::subscriptions::{self, ExpiringFilter};
use sqlx::PgPool;
use uuid::Uuid;

/// Registry operations the renewal scanner depends on. Production wires
/// `PgSubscriptionStore`; tests wire an in-memory fake.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn list_expiring(&self, filter: &ExpiringFilter) -> Res<Vec<UserSubscription>>;

    async fn list_types(&self) -> Res<Vec<SubscriptionType>>;

    /// Active → awaiting_renewal, guarded by the expected prior status.
    async fn mark_awaiting_renewal(&self, id: &Uuid) -> Res<Option<UserSubscription>>;
}

pub struct PgSubscriptionStore {
    pool: Arc<PgPool>,
}

impl PgSubscriptionStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        PgSubscriptionStore { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn list_expiring(&self, filter: &ExpiringFilter) -> Res<Vec<UserSubscription>> {
        subscriptions::list_expiring(&*self.pool, filter).await
    }

    async fn list_types(&self) -> Res<Vec<SubscriptionType>> {
        db::subscription_types::list(&*self.pool).await
    }

    async fn mark_awaiting_renewal(&self, id: &Uuid) -> Res<Option<UserSubscription>> {
        subscriptions::transition_status(
            &*self.pool,
            id,
            SubscriptionStatus::Active,
            SubscriptionStatus::AwaitingRenewal,
        )
        .await
    }
}
