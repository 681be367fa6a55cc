use common::error::{AppError, Res};
use db::models::transaction::ProcessState;
use db::transactions::{self, ListFilter, PaymentCreate, RefundCreate as RefundRow};
use gateway::{CreatePayment, CreateRefund, PaymentGateway, PaymentStatus};
use sqlx::PgPool;

use crate::dtos::payment::{
    PaymentListQuery, PaymentNewCreate, PaymentRenewCreate, PaymentResponse, RefundCreate,
};

const LIST_LIMIT: i64 = 100;

/// Charges a fresh subscription: the gateway call happens synchronously so
/// the caller can hand the confirmation URL to the payer. The resulting
/// transaction starts out `pending` and is reconciled by the checker job.
pub async fn create_new_payment(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    req: PaymentNewCreate,
) -> Res<PaymentResponse> {
    let payment = gateway
        .create_payment(&CreatePayment {
            amount: req.amount.clone(),
            currency: req.currency,
            description: req.description.clone(),
            payment_method_id: None,
        })
        .await?;

    if payment.status != PaymentStatus::Pending {
        return Err(AppError::BadRequest(format!(
            "gateway answered '{:?}' instead of 'pending' for a new payment",
            payment.status
        )));
    }

    let confirmation_url = payment.confirmation_url().map(|url| url.to_string());

    let transaction = transactions::insert_payment(
        pool,
        PaymentCreate {
            subscription_id: req.subscription_id,
            user_id: req.user_id,
            description: req.description,
            amount: req.amount,
            currency: req.currency,
            process_state: ProcessState::Pending,
            external_id: Some(payment.id),
            payment_method_id: payment.payment_method.as_ref().map(|m| m.id),
            payment_created_at: Some(payment.created_at),
            last_attempt_at: Some(payment.created_at),
        },
    )
    .await
    .map_err(translate_duplicate_external_id)?;

    Ok(PaymentResponse::from_transaction(
        transaction,
        confirmation_url,
    ))
}

/// Records a renewal charge as a `new` transaction. No gateway call here;
/// the new-payment processor drives it on its next pass.
pub async fn create_renew_payment(pool: &PgPool, req: PaymentRenewCreate) -> Res<PaymentResponse> {
    let transaction = transactions::insert_payment(
        pool,
        PaymentCreate {
            subscription_id: req.subscription_id,
            user_id: req.user_id,
            description: req.description,
            amount: req.amount,
            currency: req.currency,
            process_state: ProcessState::New,
            external_id: None,
            payment_method_id: Some(req.payment_method_id),
            payment_created_at: None,
            last_attempt_at: None,
        },
    )
    .await?;

    Ok(PaymentResponse::from_transaction(transaction, None))
}

/// Reverses the last succeeded payment of a subscription through the
/// gateway and records the linked refund transaction.
pub async fn create_refund_payment(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    req: RefundCreate,
) -> Res<PaymentResponse> {
    let payment_for_refund =
        transactions::get_payment_for_refund(pool, &req.user_id, &req.subscription_id)
            .await?
            .ok_or_else(|| AppError::NotFound("no succeeded payment to refund".to_string()))?;

    let external_id = payment_for_refund.external_id.ok_or_else(|| {
        AppError::BadRequest("payment has no gateway id and cannot be refunded".to_string())
    })?;

    let refund = gateway
        .create_refund(&CreateRefund {
            amount: req.amount.clone(),
            currency: req.currency,
            description: req.description.clone(),
            payment_to_refund_external_id: external_id,
        })
        .await?;

    if refund.status != PaymentStatus::Succeeded {
        return Err(AppError::BadRequest(
            "payment was not succeeded and can not be refunded".to_string(),
        ));
    }

    let transaction = transactions::insert_refund(
        pool,
        RefundRow {
            subscription_id: req.subscription_id,
            user_id: req.user_id,
            description: req.description,
            amount: req.amount,
            currency: req.currency,
            process_state: ProcessState::Succeeded,
            external_id: refund.id,
            payment_method_id: payment_for_refund.payment_method_id,
            refund_payment_id: payment_for_refund.id,
            payment_created_at: refund.created_at,
        },
    )
    .await
    .map_err(translate_duplicate_external_id)?;

    Ok(PaymentResponse::from_transaction(transaction, None))
}

pub async fn list_payments(pool: &PgPool, query: PaymentListQuery) -> Res<Vec<PaymentResponse>> {
    let rows = transactions::list(
        pool,
        &ListFilter {
            subscription_id: query.subscription_id,
            user_id: query.user_id,
            payment_method_id: query.payment_method_id,
            kind: query.kind,
            process_state: query.process_state,
        },
        LIST_LIMIT,
    )
    .await?;

    Ok(rows
        .into_iter()
        .map(|t| PaymentResponse::from_transaction(t, None))
        .collect())
}

/// A duplicate `external_id` means this gateway payment is already on the
/// ledger; surface it as a conflict instead of double-booking.
fn translate_duplicate_external_id(err: AppError) -> AppError {
    match err {
        AppError::Database(db_err) if db::is_unique_violation(&db_err) => {
            AppError::Conflict("transaction for this gateway payment already exists".to_string())
        }
        other => other,
    }
}
