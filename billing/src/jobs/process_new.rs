//! New-payment processor: drives `new` payment transactions toward the
//! gateway and, from there, toward a terminal process state.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::env_config::BillingJobsConfig;
use common::error::{AppError, Res};
use db::models::transaction::{ProcessState, Transaction, TransactionKind};
use db::transactions::BatchFilter;
use gateway::{CreatePayment, PaymentGateway, PaymentStatus};
use log::warn;
use scheduler::Job;

use crate::clients::subscriptions::SubscriptionsApi;
use crate::store::TransactionStore;

pub struct ProcessNewPayments {
    store: Arc<dyn TransactionStore>,
    gateway: Arc<dyn PaymentGateway>,
    subscriptions: Arc<dyn SubscriptionsApi>,
    config: BillingJobsConfig,
}

impl ProcessNewPayments {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PaymentGateway>,
        subscriptions: Arc<dyn SubscriptionsApi>,
        config: BillingJobsConfig,
    ) -> Self {
        ProcessNewPayments {
            store,
            gateway,
            subscriptions,
            config,
        }
    }

    async fn process_row(&self, transaction: &Transaction) -> Res<()> {
        let payment = match self
            .gateway
            .create_payment(&CreatePayment {
                amount: transaction.amount.clone(),
                currency: transaction.currency,
                description: transaction.description.clone(),
                payment_method_id: transaction.payment_method_id,
            })
            .await
        {
            Ok(payment) => payment,
            Err(e) => {
                // row-level isolation: one bad row never aborts the batch
                warn!(
                    "create_payment failed for transaction {}: {}",
                    transaction.id, e
                );
                self.store.increment_attempts(&transaction.id).await?;
                return Ok(());
            }
        };

        match payment.status {
            PaymentStatus::Succeeded => {
                let payment_method_id = payment
                    .payment_method
                    .as_ref()
                    .map(|m| m.id)
                    .or(transaction.payment_method_id);

                match self
                    .store
                    .transition_state(
                        &transaction.id,
                        ProcessState::New,
                        ProcessState::Pending,
                        Some(payment.id),
                        payment_method_id,
                    )
                    .await
                {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        warn!(
                            "transaction {} left state 'new' concurrently, skipping",
                            transaction.id
                        );
                        return Ok(());
                    }
                    Err(AppError::Conflict(message)) => {
                        warn!("transaction {}: {}", transaction.id, message);
                        self.store.increment_attempts(&transaction.id).await?;
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                }

                let Some(payment_method_id) = payment_method_id else {
                    warn!(
                        "transaction {} succeeded without a payment method, cannot activate",
                        transaction.id
                    );
                    self.store.increment_attempts(&transaction.id).await?;
                    return Ok(());
                };

                if let Err(e) = self
                    .subscriptions
                    .activate_subscription(&transaction.subscription_id, &payment_method_id)
                    .await
                {
                    // the gateway charged but the registry does not know yet;
                    // surface the error so the run is retried as a unit
                    self.store.increment_attempts(&transaction.id).await?;
                    return Err(AppError::from(e));
                }

                self.store
                    .transition_state(
                        &transaction.id,
                        ProcessState::Pending,
                        ProcessState::Succeeded,
                        None,
                        None,
                    )
                    .await?;
            }
            PaymentStatus::Canceled => {
                if let Err(e) = self
                    .subscriptions
                    .cancel_subscription(&transaction.subscription_id)
                    .await
                {
                    self.store.increment_attempts(&transaction.id).await?;
                    return Err(AppError::from(e));
                }
                // attempt cycle ends here; a new charge needs a new row
            }
            PaymentStatus::Pending | PaymentStatus::WaitingForCapture | PaymentStatus::Unknown => {
                self.store.increment_attempts(&transaction.id).await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Job for ProcessNewPayments {
    fn name(&self) -> &'static str {
        "process-new-payments"
    }

    async fn run_once(&self) -> Res<()> {
        let today = Utc::now().date_naive();
        let window_start = today - Duration::days(self.config.payment_attempts_limit as i64);
        let mut cursor = None;

        loop {
            let batch = self
                .store
                .list_batch(&BatchFilter {
                    kind: TransactionKind::Payment,
                    process_state: ProcessState::New,
                    max_attempts: self.config.payment_attempts_limit,
                    last_attempt_on_or_after: Some(window_start),
                    cursor,
                    limit: self.config.batch_size,
                })
                .await?;

            let Some(last) = batch.last() else {
                break;
            };
            cursor = Some((last.created_at, last.id));

            for transaction in &batch {
                self.process_row(transaction).await?;
            }

            if (batch.len() as i64) < self.config.batch_size {
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::jobs::fakes::{
        FakeGateway, FakeSubscriptions, InMemoryStore, PaymentScript, gateway_payment, job_config,
        payment_row,
    };

    fn job(
        store: &Arc<InMemoryStore>,
        gateway: &Arc<FakeGateway>,
        subscriptions: &Arc<FakeSubscriptions>,
    ) -> ProcessNewPayments {
        ProcessNewPayments::new(
            store.clone(),
            gateway.clone(),
            subscriptions.clone(),
            job_config(),
        )
    }

    #[tokio::test]
    async fn canceled_payment_cancels_subscription_and_leaves_row_untouched() {
        let row = payment_row(ProcessState::New, Some(Uuid::new_v4()), None, 0);
        let row_id = row.id;
        let subscription_id = row.subscription_id;

        let store = Arc::new(InMemoryStore::new(vec![row]));
        let gateway = Arc::new(FakeGateway::default());
        gateway.script_payment(PaymentScript::Ok(gateway_payment(PaymentStatus::Canceled, None)));
        let subscriptions = Arc::new(FakeSubscriptions::default());

        job(&store, &gateway, &subscriptions).run_once().await.unwrap();

        assert_eq!(subscriptions.canceled_ids(), vec![subscription_id]);
        let row = store.get(&row_id);
        assert_eq!(row.process_state, ProcessState::New);
        assert_eq!(row.cnt_attempts, 0);
    }

    #[tokio::test]
    async fn two_timeouts_then_success_reaches_succeeded_with_two_attempts() {
        let payment_method_id = Uuid::new_v4();
        let row = payment_row(ProcessState::New, Some(payment_method_id), None, 0);
        let row_id = row.id;
        let subscription_id = row.subscription_id;

        let store = Arc::new(InMemoryStore::new(vec![row]));
        let gateway = Arc::new(FakeGateway::default());
        gateway.script_payment(PaymentScript::Error);
        gateway.script_payment(PaymentScript::Error);
        gateway.script_payment(PaymentScript::Ok(gateway_payment(
            PaymentStatus::Succeeded,
            Some(payment_method_id),
        )));
        let subscriptions = Arc::new(FakeSubscriptions::default());

        let job = job(&store, &gateway, &subscriptions);
        job.run_once().await.unwrap();
        job.run_once().await.unwrap();
        job.run_once().await.unwrap();

        let row = store.get(&row_id);
        assert_eq!(row.process_state, ProcessState::Succeeded);
        assert_eq!(row.cnt_attempts, 2);
        assert_eq!(
            subscriptions.activated_pairs(),
            vec![(subscription_id, payment_method_id)]
        );
    }

    #[tokio::test]
    async fn pending_gateway_status_only_increments_attempts() {
        let row = payment_row(ProcessState::New, Some(Uuid::new_v4()), None, 0);
        let row_id = row.id;

        let store = Arc::new(InMemoryStore::new(vec![row]));
        let gateway = Arc::new(FakeGateway::default());
        gateway.script_payment(PaymentScript::Ok(gateway_payment(PaymentStatus::Pending, None)));
        let subscriptions = Arc::new(FakeSubscriptions::default());

        job(&store, &gateway, &subscriptions).run_once().await.unwrap();

        let row = store.get(&row_id);
        assert_eq!(row.process_state, ProcessState::New);
        assert_eq!(row.cnt_attempts, 1);
        assert!(row.last_attempt_at.is_some());
        assert!(subscriptions.activated_pairs().is_empty());
    }

    #[tokio::test]
    async fn activation_failure_increments_and_propagates() {
        let payment_method_id = Uuid::new_v4();
        let row = payment_row(ProcessState::New, Some(payment_method_id), None, 0);
        let row_id = row.id;

        let store = Arc::new(InMemoryStore::new(vec![row]));
        let gateway = Arc::new(FakeGateway::default());
        gateway.script_payment(PaymentScript::Ok(gateway_payment(
            PaymentStatus::Succeeded,
            Some(payment_method_id),
        )));
        let subscriptions = Arc::new(FakeSubscriptions::default());
        subscriptions.fail_activation();

        let result = job(&store, &gateway, &subscriptions).run_once().await;

        assert!(result.is_err());
        let row = store.get(&row_id);
        // the gateway acceptance is durable even though activation failed
        assert_eq!(row.process_state, ProcessState::Pending);
        assert!(row.external_id.is_some());
        assert_eq!(row.cnt_attempts, 1);
    }

    #[tokio::test]
    async fn cancellation_failure_increments_and_propagates() {
        let row = payment_row(ProcessState::New, Some(Uuid::new_v4()), None, 0);
        let row_id = row.id;

        let store = Arc::new(InMemoryStore::new(vec![row]));
        let gateway = Arc::new(FakeGateway::default());
        gateway.script_payment(PaymentScript::Ok(gateway_payment(PaymentStatus::Canceled, None)));
        let subscriptions = Arc::new(FakeSubscriptions::default());
        subscriptions.fail_cancellation();

        let result = job(&store, &gateway, &subscriptions).run_once().await;

        assert!(result.is_err());
        let row = store.get(&row_id);
        assert_eq!(row.process_state, ProcessState::New);
        assert_eq!(row.cnt_attempts, 1);
    }

    #[tokio::test]
    async fn rows_past_the_attempt_ceiling_are_not_submitted() {
        let row = payment_row(ProcessState::New, Some(Uuid::new_v4()), None, 6);
        let row_id = row.id;

        let store = Arc::new(InMemoryStore::new(vec![row]));
        let gateway = Arc::new(FakeGateway::default());
        let subscriptions = Arc::new(FakeSubscriptions::default());

        job(&store, &gateway, &subscriptions).run_once().await.unwrap();

        assert_eq!(gateway.create_payment_calls(), 0);
        let row = store.get(&row_id);
        assert_eq!(row.process_state, ProcessState::New);
        assert_eq!(row.cnt_attempts, 6);
    }

    #[tokio::test]
    async fn duplicate_external_id_is_rejected_not_overwritten() {
        let payment_method_id = Uuid::new_v4();
        let first = payment_row(ProcessState::New, Some(payment_method_id), None, 0);
        let second = payment_row(ProcessState::New, Some(payment_method_id), None, 0);
        let first_id = first.id;
        let second_id = second.id;

        let store = Arc::new(InMemoryStore::new(vec![first, second]));
        let gateway = Arc::new(FakeGateway::default());
        // the gateway reports the same payment id twice
        let payment = gateway_payment(PaymentStatus::Succeeded, Some(payment_method_id));
        gateway.script_payment(PaymentScript::Ok(payment.clone()));
        gateway.script_payment(PaymentScript::Ok(payment));
        let subscriptions = Arc::new(FakeSubscriptions::default());

        job(&store, &gateway, &subscriptions).run_once().await.unwrap();

        let first = store.get(&first_id);
        assert_eq!(first.process_state, ProcessState::Succeeded);

        let second = store.get(&second_id);
        assert_eq!(second.process_state, ProcessState::New);
        assert!(second.external_id.is_none());
        assert_eq!(second.cnt_attempts, 1);
    }
}
