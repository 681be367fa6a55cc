//! In-memory doubles for the job seams: transaction store, payment gateway
//! and subscriptions client.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use common::env_config::BillingJobsConfig;
use common::error::{AppError, Res, ServiceError};
use common::types::Currency;
use db::models::transaction::{ProcessState, Transaction, TransactionKind};
use db::transactions::BatchFilter;
use gateway::{
    Amount, CreatePayment, CreateRefund, PaymentGateway, PaymentInternal, PaymentMethod,
    PaymentStatus, RefundInternal,
};
use uuid::Uuid;

use crate::clients::subscriptions::SubscriptionsApi;
use crate::store::TransactionStore;

pub fn job_config() -> BillingJobsConfig {
    BillingJobsConfig {
        payment_attempts_limit: 5,
        batch_size: 100,
        process_new_interval_secs: 60,
        check_pending_interval_secs: 60,
    }
}

pub fn payment_row(
    process_state: ProcessState,
    payment_method_id: Option<Uuid>,
    external_id: Option<Uuid>,
    cnt_attempts: i32,
) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        subscription_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        payment_method_id,
        refund_payment_id: None,
        external_id,
        kind: TransactionKind::Payment,
        process_state,
        description: "Subscription payment".to_string(),
        amount: BigDecimal::from(1200),
        currency: Currency::Rub,
        cnt_attempts,
        created_at: Utc::now(),
        changed_at: Utc::now(),
        payment_created_at: None,
        last_attempt_at: None,
    }
}

pub fn gateway_payment(status: PaymentStatus, payment_method_id: Option<Uuid>) -> PaymentInternal {
    PaymentInternal {
        id: Uuid::new_v4(),
        status,
        amount: Amount {
            value: "1200".to_string(),
            currency: Currency::Rub,
        },
        payment_method: payment_method_id.map(|id| PaymentMethod { id, saved: true }),
        confirmation: None,
        created_at: Utc::now(),
    }
}

/// Transaction store backed by a `Vec`, with the same expected-state and
/// unique-`external_id` semantics as the Postgres implementation.
pub struct InMemoryStore {
    rows: Mutex<Vec<Transaction>>,
}

impl InMemoryStore {
    pub fn new(rows: Vec<Transaction>) -> Self {
        InMemoryStore {
            rows: Mutex::new(rows),
        }
    }

    pub fn get(&self, id: &Uuid) -> Transaction {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == *id)
            .cloned()
            .expect("row exists")
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn list_batch(&self, filter: &BatchFilter) -> Res<Vec<Transaction>> {
        let rows = self.rows.lock().unwrap();
        let mut matching: Vec<Transaction> = rows
            .iter()
            .filter(|t| {
                t.kind == filter.kind
                    && t.process_state == filter.process_state
                    && t.cnt_attempts <= filter.max_attempts
            })
            .filter(|t| match (filter.last_attempt_on_or_after, t.last_attempt_at) {
                (Some(cutoff), Some(at)) => at.date_naive() >= cutoff,
                _ => true,
            })
            .filter(|t| match filter.cursor {
                Some((at, id)) => (t.created_at, t.id) > (at, id),
                None => true,
            })
            .cloned()
            .collect();
        matching.sort_by_key(|t| (t.created_at, t.id));
        matching.truncate(filter.limit as usize);
        Ok(matching)
    }

    async fn transition_state(
        &self,
        id: &Uuid,
        from: ProcessState,
        to: ProcessState,
        external_id: Option<Uuid>,
        payment_method_id: Option<Uuid>,
    ) -> Res<Option<Transaction>> {
        if !from.can_transition(to) {
            return Err(AppError::Internal(format!(
                "illegal transaction state transition {:?} -> {:?}",
                from, to
            )));
        }

        let mut rows = self.rows.lock().unwrap();

        if let Some(external_id) = external_id {
            if rows
                .iter()
                .any(|t| t.id != *id && t.external_id == Some(external_id))
            {
                return Err(AppError::Conflict(
                    "gateway payment already recorded on another transaction".to_string(),
                ));
            }
        }

        let Some(row) = rows.iter_mut().find(|t| t.id == *id) else {
            return Ok(None);
        };
        if row.process_state != from {
            return Ok(None);
        }

        row.process_state = to;
        if external_id.is_some() {
            row.external_id = external_id;
        }
        if payment_method_id.is_some() {
            row.payment_method_id = payment_method_id;
        }
        row.changed_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn increment_attempts(&self, id: &Uuid) -> Res<Option<Transaction>> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|t| t.id == *id) else {
            return Ok(None);
        };
        row.cnt_attempts += 1;
        row.last_attempt_at = Some(Utc::now());
        row.changed_at = Utc::now();
        Ok(Some(row.clone()))
    }
}

pub enum PaymentScript {
    Ok(PaymentInternal),
    Error,
}

enum InfoScript {
    Ok(PaymentInternal),
    Missing,
    Error,
}

/// Scripted gateway: `create_payment` answers from a queue, `get_payment_info`
/// from a per-id table.
#[derive(Default)]
pub struct FakeGateway {
    payments: Mutex<VecDeque<PaymentScript>>,
    info: Mutex<HashMap<Uuid, InfoScript>>,
    payment_calls: AtomicU32,
}

impl FakeGateway {
    pub fn script_payment(&self, script: PaymentScript) {
        self.payments.lock().unwrap().push_back(script);
    }

    pub fn script_info(&self, payment_id: Uuid, payment: Option<PaymentInternal>) {
        let script = match payment {
            Some(p) => InfoScript::Ok(p),
            None => InfoScript::Missing,
        };
        self.info.lock().unwrap().insert(payment_id, script);
    }

    pub fn script_info_error(&self, payment_id: Uuid) {
        self.info.lock().unwrap().insert(payment_id, InfoScript::Error);
    }

    pub fn create_payment_calls(&self) -> u32 {
        self.payment_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_payment(&self, _req: &CreatePayment) -> Result<PaymentInternal, ServiceError> {
        self.payment_calls.fetch_add(1, Ordering::SeqCst);
        match self.payments.lock().unwrap().pop_front() {
            Some(PaymentScript::Ok(payment)) => Ok(payment),
            Some(PaymentScript::Error) => {
                Err(ServiceError::Unavailable("gateway timeout".to_string()))
            }
            None => Err(ServiceError::Unavailable("no scripted response".to_string())),
        }
    }

    async fn create_refund(&self, _req: &CreateRefund) -> Result<RefundInternal, ServiceError> {
        Err(ServiceError::Rejected("not scripted".to_string()))
    }

    async fn get_payment_info(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<PaymentInternal>, ServiceError> {
        match self.info.lock().unwrap().get(&payment_id) {
            Some(InfoScript::Ok(payment)) => Ok(Some(payment.clone())),
            Some(InfoScript::Missing) => Ok(None),
            Some(InfoScript::Error) => {
                Err(ServiceError::Unavailable("gateway timeout".to_string()))
            }
            None => Ok(None),
        }
    }
}

/// Records activate/cancel calls; both can be scripted to fail.
#[derive(Default)]
pub struct FakeSubscriptions {
    activated: Mutex<Vec<(Uuid, Uuid)>>,
    canceled: Mutex<Vec<Uuid>>,
    activation_fails: AtomicBool,
    cancellation_fails: AtomicBool,
}

impl FakeSubscriptions {
    pub fn fail_activation(&self) {
        self.activation_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_cancellation(&self) {
        self.cancellation_fails.store(true, Ordering::SeqCst);
    }

    pub fn activated_pairs(&self) -> Vec<(Uuid, Uuid)> {
        self.activated.lock().unwrap().clone()
    }

    pub fn canceled_ids(&self) -> Vec<Uuid> {
        self.canceled.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubscriptionsApi for FakeSubscriptions {
    async fn activate_subscription(
        &self,
        subscription_id: &Uuid,
        payment_method_id: &Uuid,
    ) -> Result<(), ServiceError> {
        if self.activation_fails.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable(
                "subscriptions service down".to_string(),
            ));
        }
        self.activated
            .lock()
            .unwrap()
            .push((*subscription_id, *payment_method_id));
        Ok(())
    }

    async fn cancel_subscription(&self, subscription_id: &Uuid) -> Result<(), ServiceError> {
        if self.cancellation_fails.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable(
                "subscriptions service down".to_string(),
            ));
        }
        self.canceled.lock().unwrap().push(*subscription_id);
        Ok(())
    }
}
