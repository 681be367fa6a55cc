use bigdecimal::BigDecimal;
use chrono::{Datelike, Duration, Utc};
use common::error::{AppError, Res};
use common::types::Currency;
use db::models::subscription::SubscriptionStatus;
use db::subscriptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::clients::billing::{BillingApi, NewPaymentRequest, RefundPaymentRequest};
use crate::dtos::subscription::{ConfirmationResponse, UserSubscriptionResponse};
use crate::services::refund::compute_refund;

/// Internal activation, driven by the billing jobs once a payment has
/// succeeded. Idempotent: re-activating an already-active subscription
/// changes nothing and answers OK, so a crashed caller can safely repeat
/// itself.
pub async fn activate_subscription(
    pool: &PgPool,
    id: &Uuid,
    payment_method_id: &Uuid,
) -> Res<()> {
    let today = Utc::now().date_naive();
    let end_of_subscription = today
        .with_year(today.year() + 1)
        .unwrap_or(today + Duration::days(365));

    let updated =
        subscriptions::activate(pool, id, payment_method_id, today, end_of_subscription).await?;
    if updated.is_some() {
        return Ok(());
    }

    match subscriptions::get_by_id(pool, id).await? {
        Some(subscription) if subscription.status == SubscriptionStatus::Active => Ok(()),
        Some(_) | None => Err(AppError::BadRequest(
            "User subscription not found or does not have appropriate status".to_string(),
        )),
    }
}

/// Internal cancellation. Idempotent on already-inactive rows.
pub async fn cancel_subscription(pool: &PgPool, id: &Uuid) -> Res<()> {
    let today = Utc::now().date_naive();

    let updated = subscriptions::cancel(pool, id, today).await?;
    if updated.is_some() {
        return Ok(());
    }

    match subscriptions::get_by_id(pool, id).await? {
        Some(subscription) if subscription.status == SubscriptionStatus::Inactive => Ok(()),
        Some(_) | None => Err(AppError::BadRequest(
            "User subscription not found".to_string(),
        )),
    }
}

pub async fn list_user_subscriptions(
    pool: &PgPool,
    user_id: &Uuid,
) -> Res<Vec<UserSubscriptionResponse>> {
    let rows = subscriptions::list_for_user(pool, user_id).await?;
    Ok(rows.into_iter().map(UserSubscriptionResponse::from).collect())
}

/// Purchase flow: validate the sales window, reject duplicates, create (or
/// reuse) the `new` row, request the first charge from billing and flip the
/// row to `awaiting_payment`.
///
/// The purchase itself stays asynchronous: if the payer never follows the
/// confirmation URL the row simply stays `awaiting_payment`.
pub async fn create_user_subscription(
    pool: &PgPool,
    billing: &dyn BillingApi,
    user_id: &Uuid,
    type_id: &Uuid,
) -> Res<ConfirmationResponse> {
    let today = Utc::now().date_naive();

    let subscription_type = db::subscription_types::get_purchasable(pool, type_id, today)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(
                "Subscription type not found or subscription is not on sale".to_string(),
            )
        })?;

    let committed = subscriptions::list_committed(pool, type_id, user_id).await?;
    if !committed.is_empty() {
        return Err(AppError::BadRequest(
            "User already has this type subscription".to_string(),
        ));
    }

    let subscription = match subscriptions::find_new(pool, type_id, user_id).await? {
        Some(existing) => existing,
        None => subscriptions::insert(pool, type_id, user_id)
            .await
            .map_err(translate_duplicate_subscription)?,
    };

    let confirmation_url = billing
        .payments_new(&NewPaymentRequest {
            subscription_id: subscription.id,
            user_id: *user_id,
            amount: BigDecimal::from(subscription_type.annual_price),
            currency: Currency::Rub,
            description: format!("Payment for subscription {}", subscription_type.name),
        })
        .await?;

    subscriptions::transition_status(
        pool,
        &subscription.id,
        SubscriptionStatus::New,
        SubscriptionStatus::AwaitingPayment,
    )
    .await?;

    Ok(ConfirmationResponse { confirmation_url })
}

/// User-requested cancellation with proration. A non-zero refund goes
/// through billing first; the row is only deactivated once billing accepted
/// the refund, so a failed refund leaves the subscription intact for a
/// retry.
pub async fn cancel_user_subscription(
    pool: &PgPool,
    billing: &dyn BillingApi,
    user_id: &Uuid,
    subscription_id: &Uuid,
) -> Res<UserSubscriptionResponse> {
    let subscription = subscriptions::get_active_for_user(pool, subscription_id, user_id)
        .await?
        .ok_or_else(|| {
            AppError::BadRequest("User subscription does not exist or is not active".to_string())
        })?;

    let subscription_type = db::subscription_types::get_by_id(pool, &subscription.type_id)
        .await?
        .ok_or_else(|| AppError::BadRequest("Subscription type not found".to_string()))?;

    let end_of_subscription = subscription.end_of_subscription.ok_or_else(|| {
        AppError::Internal(format!(
            "active subscription {} has no end date",
            subscription.id
        ))
    })?;

    let today = Utc::now().date_naive();
    let refund_amount = compute_refund(
        today,
        end_of_subscription,
        subscription_type.annual_price,
        subscription_type.monthly_price,
    );

    if refund_amount != 0 {
        billing
            .payments_refund(&RefundPaymentRequest {
                subscription_id: subscription.id,
                user_id: *user_id,
                amount: BigDecimal::from(refund_amount),
                currency: Currency::Rub,
                description: format!(
                    "Refund for canceled subscription {}",
                    subscription_type.name
                ),
            })
            .await?;
    }

    let canceled = subscriptions::cancel(pool, &subscription.id, today)
        .await?
        .ok_or_else(|| {
            AppError::Conflict("subscription was canceled concurrently".to_string())
        })?;

    Ok(UserSubscriptionResponse::from(canceled))
}

fn translate_duplicate_subscription(err: AppError) -> AppError {
    match err {
        AppError::Database(db_err) if db::is_unique_violation(&db_err) => {
            AppError::BadRequest("User subscription already exists".to_string())
        }
        other => other,
    }
}
