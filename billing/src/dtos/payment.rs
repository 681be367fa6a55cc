use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use common::types::Currency;
use db::models::transaction::{ProcessState, Transaction, TransactionKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /payments/new`: first charge for a fresh subscription, the
/// payer confirms through the returned redirect URL.
#[derive(Debug, Deserialize)]
pub struct PaymentNewCreate {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub currency: Currency,
    pub description: String,
}

/// Body of `POST /payments/renew`: recurring charge against a stored payment
/// method, driven to completion by the reconciliation jobs.
#[derive(Debug, Deserialize)]
pub struct PaymentRenewCreate {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub currency: Currency,
    pub payment_method_id: Uuid,
    pub description: String,
}

/// Body of `POST /payments/refund`.
#[derive(Debug, Deserialize)]
pub struct RefundCreate {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub currency: Currency,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentListQuery {
    pub subscription_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub payment_method_id: Option<Uuid>,
    pub kind: Option<TransactionKind>,
    pub process_state: Option<ProcessState>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub payment_method_id: Option<Uuid>,
    pub refund_payment_id: Option<Uuid>,
    pub kind: TransactionKind,
    pub process_state: ProcessState,
    pub description: String,
    pub amount: BigDecimal,
    pub currency: Currency,
    pub cnt_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub changed_at: DateTime<Utc>,
    pub payment_created_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_url: Option<String>,
}

impl PaymentResponse {
    pub fn from_transaction(transaction: Transaction, confirmation_url: Option<String>) -> Self {
        PaymentResponse {
            id: transaction.id,
            subscription_id: transaction.subscription_id,
            user_id: transaction.user_id,
            payment_method_id: transaction.payment_method_id,
            refund_payment_id: transaction.refund_payment_id,
            kind: transaction.kind,
            process_state: transaction.process_state,
            description: transaction.description,
            amount: transaction.amount,
            currency: transaction.currency,
            cnt_attempts: transaction.cnt_attempts,
            created_at: transaction.created_at,
            changed_at: transaction.changed_at,
            payment_created_at: transaction.payment_created_at,
            last_attempt_at: transaction.last_attempt_at,
            confirmation_url,
        }
    }
}
