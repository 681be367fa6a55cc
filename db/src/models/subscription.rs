use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Requested by the user, no payment created yet.
    New,
    /// A payment transaction exists, waiting for the user to confirm it.
    AwaitingPayment,
    Active,
    /// The renewal scanner has initiated a recurring charge.
    AwaitingRenewal,
    Inactive,
}

/// Catalog entry. A type is purchasable only while
/// `start_of_sales <= today <= end_of_sales`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct SubscriptionType {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub annual_price: i64,
    pub monthly_price: i64,
    pub start_of_sales: NaiveDate,
    pub end_of_sales: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct UserSubscription {
    pub id: Uuid,
    pub type_id: Uuid,
    pub user_id: Uuid,
    pub payment_method_id: Option<Uuid>,
    pub status: SubscriptionStatus,
    pub start_of_subscription: Option<NaiveDate>,
    pub end_of_subscription: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
