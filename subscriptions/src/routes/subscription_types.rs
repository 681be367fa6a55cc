use std::sync::Arc;

use actix_web::{
    Responder, get,
    web::{self},
};
use common::{
    error::{AppError, Res},
    http::Success,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::dtos::subscription::SubscriptionTypeResponse;

#[get("")]
pub async fn get_list(pool: web::Data<Arc<PgPool>>) -> Res<impl Responder> {
    let types = db::subscription_types::list(&***pool).await?;
    let types: Vec<SubscriptionTypeResponse> =
        types.into_iter().map(SubscriptionTypeResponse::from).collect();
    Success::ok(types)
}

#[get("/{id}")]
pub async fn get_one(pool: web::Data<Arc<PgPool>>, path: web::Path<Uuid>) -> Res<impl Responder> {
    let subscription_type = db::subscription_types::get_by_id(&***pool, &path)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscription type not found".to_string()))?;
    Success::ok(SubscriptionTypeResponse::from(subscription_type))
}
