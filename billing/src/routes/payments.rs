use std::sync::Arc;

use actix_web::{
    Responder, get, post,
    web::{self},
};
use common::{error::Res, http::Success};
use gateway::PaymentGateway;
use sqlx::PgPool;

use crate::dtos::payment::{PaymentListQuery, PaymentNewCreate, PaymentRenewCreate, RefundCreate};
use crate::services;

/// Processes a payment for a new subscription and records it as a
/// transaction. Answers with the transaction in `pending` and the
/// confirmation URL the payer must visit.
#[post("/new")]
pub async fn post_new(
    pool: web::Data<Arc<PgPool>>,
    gateway: web::Data<dyn PaymentGateway>,
    req: web::Json<PaymentNewCreate>,
) -> Res<impl Responder> {
    let payment =
        services::payments::create_new_payment(&pool, gateway.get_ref(), req.into_inner()).await?;
    Success::created(payment)
}

/// Registers a recurring payment for an existing subscription. Answers with
/// the transaction in `new`; no confirmation by the user is required.
#[post("/renew")]
pub async fn post_renew(
    pool: web::Data<Arc<PgPool>>,
    req: web::Json<PaymentRenewCreate>,
) -> Res<impl Responder> {
    let payment = services::payments::create_renew_payment(&pool, req.into_inner()).await?;
    Success::created(payment)
}

/// Refunds the last succeeded payment of a subscription.
#[post("/refund")]
pub async fn post_refund(
    pool: web::Data<Arc<PgPool>>,
    gateway: web::Data<dyn PaymentGateway>,
    req: web::Json<RefundCreate>,
) -> Res<impl Responder> {
    let refund =
        services::payments::create_refund_payment(&pool, gateway.get_ref(), req.into_inner())
            .await?;
    Success::ok(refund)
}

#[get("")]
pub async fn get_list(
    pool: web::Data<Arc<PgPool>>,
    query: web::Query<PaymentListQuery>,
) -> Res<impl Responder> {
    let payments = services::payments::list_payments(&pool, query.into_inner()).await?;
    Success::ok(payments)
}
