use chrono::NaiveDate;
use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::models::subscription::{SubscriptionStatus, UserSubscription};

/// Batch query for the renewal scanner: active rows expiring inside the
/// look-ahead window, keyset-paged by id.
pub struct ExpiringFilter {
    pub from: NaiveDate,
    pub until: NaiveDate,
    pub cursor: Option<Uuid>,
    pub limit: i64,
}

pub async fn insert<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    type_id: &Uuid,
    user_id: &Uuid,
) -> Res<UserSubscription> {
    sqlx::query_as::<_, UserSubscription>(
        r#"
        INSERT INTO user_subscription (type_id, user_id, status)
        VALUES ($1, $2, 'new')
        RETURNING *
        "#,
    )
    .bind(type_id)
    .bind(user_id)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn get_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    id: &Uuid,
) -> Res<Option<UserSubscription>> {
    sqlx::query_as::<_, UserSubscription>("SELECT * FROM user_subscription WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

/// Non-inactive subscriptions of this user and type past the `new` stage.
/// Used for the "user already has this subscription" check.
pub async fn list_committed<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    type_id: &Uuid,
    user_id: &Uuid,
) -> Res<Vec<UserSubscription>> {
    sqlx::query_as::<_, UserSubscription>(
        r#"
        SELECT * FROM user_subscription
        WHERE type_id = $1 AND user_id = $2
          AND status NOT IN ('inactive', 'new')
        "#,
    )
    .bind(type_id)
    .bind(user_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

/// A leftover `new` row from an earlier purchase attempt, reusable instead
/// of inserting a duplicate.
pub async fn find_new<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    type_id: &Uuid,
    user_id: &Uuid,
) -> Res<Option<UserSubscription>> {
    sqlx::query_as::<_, UserSubscription>(
        r#"
        SELECT * FROM user_subscription
        WHERE type_id = $1 AND user_id = $2 AND status = 'new'
        LIMIT 1
        "#,
    )
    .bind(type_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn list_for_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: &Uuid,
) -> Res<Vec<UserSubscription>> {
    sqlx::query_as::<_, UserSubscription>(
        "SELECT * FROM user_subscription WHERE user_id = $1 AND status <> 'inactive'",
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

pub async fn get_active_for_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    id: &Uuid,
    user_id: &Uuid,
) -> Res<Option<UserSubscription>> {
    sqlx::query_as::<_, UserSubscription>(
        r#"
        SELECT * FROM user_subscription
        WHERE id = $1 AND user_id = $2 AND status = 'active'
        "#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

/// Conditionally moves a subscription between statuses. Returns `None` when
/// the row is not in `from` anymore.
pub async fn transition_status<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    id: &Uuid,
    from: SubscriptionStatus,
    to: SubscriptionStatus,
) -> Res<Option<UserSubscription>> {
    sqlx::query_as::<_, UserSubscription>(
        r#"
        UPDATE user_subscription
        SET status = $3, updated_at = now()
        WHERE id = $1 AND status = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

/// Activation write: awaiting_payment or awaiting_renewal rows become
/// active with a fresh period end. `start_of_subscription` is set only on
/// first activation.
pub async fn activate<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    id: &Uuid,
    payment_method_id: &Uuid,
    today: NaiveDate,
    end_of_subscription: NaiveDate,
) -> Res<Option<UserSubscription>> {
    sqlx::query_as::<_, UserSubscription>(
        r#"
        UPDATE user_subscription
        SET status = 'active',
            start_of_subscription = COALESCE(start_of_subscription, $3),
            end_of_subscription = $4,
            payment_method_id = $2,
            updated_at = now()
        WHERE id = $1 AND status IN ('awaiting_payment', 'awaiting_renewal')
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payment_method_id)
    .bind(today)
    .bind(end_of_subscription)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

/// Cancellation write: any non-inactive row becomes inactive, period ends
/// today.
pub async fn cancel<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    id: &Uuid,
    today: NaiveDate,
) -> Res<Option<UserSubscription>> {
    sqlx::query_as::<_, UserSubscription>(
        r#"
        UPDATE user_subscription
        SET status = 'inactive', end_of_subscription = $2, updated_at = now()
        WHERE id = $1 AND status <> 'inactive'
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(today)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn list_expiring<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    filter: &ExpiringFilter,
) -> Res<Vec<UserSubscription>> {
    sqlx::query_as::<_, UserSubscription>(
        r#"
        SELECT * FROM user_subscription
        WHERE status = 'active'
          AND end_of_subscription >= $1
          AND end_of_subscription <= $2
          AND ($3::uuid IS NULL OR id > $3)
        ORDER BY id
        LIMIT $4
        "#,
    )
    .bind(filter.from)
    .bind(filter.until)
    .bind(filter.cursor)
    .bind(filter.limit)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}
