use std::sync::Arc;

use actix_web::{
    HttpRequest, Responder, get, post,
    web::{self},
};
use common::{
    error::{AppError, Res},
    http::Success,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::clients::billing::BillingApi;
use crate::dtos::subscription::SubscriptionCreate;
use crate::services;

/// The authenticated user, as stamped into `X-User-Id` by the fronting auth
/// layer.
fn user_id(req: &HttpRequest) -> Res<Uuid> {
    req.headers()
        .get("X-User-Id")
        .and_then(|header| header.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .ok_or_else(|| AppError::Unauthorized("X-User-Id header is required".to_string()))
}

#[get("")]
pub async fn get_list(req: HttpRequest, pool: web::Data<Arc<PgPool>>) -> Res<impl Responder> {
    let user_id = user_id(&req)?;
    let subscriptions = services::subscriptions::list_user_subscriptions(&pool, &user_id).await?;
    Success::ok(subscriptions)
}

/// Starts a subscription purchase. Answers with the confirmation URL the
/// payer must visit; the subscription stays `awaiting_payment` until the
/// billing jobs observe the charge.
#[post("")]
pub async fn post_subscribe(
    req: HttpRequest,
    pool: web::Data<Arc<PgPool>>,
    billing: web::Data<dyn BillingApi>,
    body: web::Json<SubscriptionCreate>,
) -> Res<impl Responder> {
    let user_id = user_id(&req)?;
    let confirmation = services::subscriptions::create_user_subscription(
        &pool,
        billing.get_ref(),
        &user_id,
        &body.type_id,
    )
    .await?;
    Success::created(confirmation)
}

/// Cancels an active subscription, refunding prorated unused months.
#[post("/{id}/cancel")]
pub async fn post_cancel(
    req: HttpRequest,
    pool: web::Data<Arc<PgPool>>,
    billing: web::Data<dyn BillingApi>,
    path: web::Path<Uuid>,
) -> Res<impl Responder> {
    let user_id = user_id(&req)?;
    let subscription =
        services::subscriptions::cancel_user_subscription(&pool, billing.get_ref(), &user_id, &path)
            .await?;
    Success::ok(subscription)
}
