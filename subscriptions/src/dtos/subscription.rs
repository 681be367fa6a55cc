use chrono::NaiveDate;
use db::models::subscription::{SubscriptionStatus, SubscriptionType, UserSubscription};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of the internal activate call.
#[derive(Debug, Deserialize)]
pub struct PaymentMethodBody {
    pub payment_method_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionCreate {
    pub type_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ConfirmationResponse {
    pub confirmation_url: String,
}

#[derive(Debug, Serialize)]
pub struct UserSubscriptionResponse {
    pub id: Uuid,
    pub type_id: Uuid,
    pub user_id: Uuid,
    pub payment_method_id: Option<Uuid>,
    pub status: SubscriptionStatus,
    pub start_of_subscription: Option<NaiveDate>,
    pub end_of_subscription: Option<NaiveDate>,
}

impl From<UserSubscription> for UserSubscriptionResponse {
    fn from(subscription: UserSubscription) -> Self {
        UserSubscriptionResponse {
            id: subscription.id,
            type_id: subscription.type_id,
            user_id: subscription.user_id,
            payment_method_id: subscription.payment_method_id,
            status: subscription.status,
            start_of_subscription: subscription.start_of_subscription,
            end_of_subscription: subscription.end_of_subscription,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubscriptionTypeResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub annual_price: i64,
    pub monthly_price: i64,
    pub start_of_sales: NaiveDate,
    pub end_of_sales: NaiveDate,
}

impl From<SubscriptionType> for SubscriptionTypeResponse {
    fn from(subscription_type: SubscriptionType) -> Self {
        SubscriptionTypeResponse {
            id: subscription_type.id,
            name: subscription_type.name,
            description: subscription_type.description,
            annual_price: subscription_type.annual_price,
            monthly_price: subscription_type.monthly_price,
            start_of_sales: subscription_type.start_of_sales,
            end_of_sales: subscription_type.end_of_sales,
        }
    }
}
