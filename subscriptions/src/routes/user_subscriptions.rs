use std::sync::Arc;

use actix_web::{
    Responder, post,
    web::{self},
};
use common::{error::Res, http::Success};
use sqlx::PgPool;
use uuid::Uuid;

use crate::dtos::subscription::PaymentMethodBody;
use crate::services;

/// Activates a subscription after its payment succeeded. Called by the
/// billing service; idempotent.
#[post("/{id}/activate")]
pub async fn post_activate(
    pool: web::Data<Arc<PgPool>>,
    path: web::Path<Uuid>,
    body: web::Json<PaymentMethodBody>,
) -> Res<impl Responder> {
    services::subscriptions::activate_subscription(&pool, &path, &body.payment_method_id).await?;
    Success::ok(())
}

/// Deactivates a subscription after its payment was canceled by the
/// gateway. Called by the billing service; idempotent.
#[post("/{id}/cancel")]
pub async fn post_cancel(
    pool: web::Data<Arc<PgPool>>,
    path: web::Path<Uuid>,
) -> Res<impl Responder> {
    services::subscriptions::cancel_subscription(&pool, &path).await?;
    Success::ok(())
}
