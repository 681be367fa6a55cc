use chrono::NaiveDate;
use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::models::subscription::SubscriptionType;

pub async fn list<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
) -> Res<Vec<SubscriptionType>> {
    sqlx::query_as::<_, SubscriptionType>("SELECT * FROM subscription_type ORDER BY name")
        .fetch_all(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    id: &Uuid,
) -> Res<Option<SubscriptionType>> {
    sqlx::query_as::<_, SubscriptionType>("SELECT * FROM subscription_type WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

/// Catalog lookup gated by the sales window.
pub async fn get_purchasable<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    id: &Uuid,
    today: NaiveDate,
) -> Res<Option<SubscriptionType>> {
    sqlx::query_as::<_, SubscriptionType>(
        r#"
        SELECT * FROM subscription_type
        WHERE id = $1 AND start_of_sales <= $2 AND end_of_sales >= $2
        "#,
    )
    .bind(id)
    .bind(today)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}
