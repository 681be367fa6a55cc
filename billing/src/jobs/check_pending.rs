//! Pending-payment checker: polls the gateway for transactions stuck in
//! `pending` and reconciles the ledger and the registry with what it says.
//!
//! A second sweep re-drives `succeeded` rows whose subscription activation
//! was never acknowledged (the processor's propagate path) through the
//! idempotent activate endpoint and marks them `applied`. The sweep runs
//! before the pending phase, so a row that reaches `succeeded` in this run
//! is only confirmed on the next one.

use std::sync::Arc;

use async_trait::async_trait;
use common::env_config::BillingJobsConfig;
use common::error::Res;
use db::models::transaction::{ProcessState, Transaction, TransactionKind};
use db::transactions::BatchFilter;
use gateway::{PaymentGateway, PaymentStatus};
use log::{info, warn};
use scheduler::Job;

use crate::clients::subscriptions::SubscriptionsApi;
use crate::store::TransactionStore;

pub struct CheckPendingPayments {
    store: Arc<dyn TransactionStore>,
    gateway: Arc<dyn PaymentGateway>,
    subscriptions: Arc<dyn SubscriptionsApi>,
    config: BillingJobsConfig,
}

impl CheckPendingPayments {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PaymentGateway>,
        subscriptions: Arc<dyn SubscriptionsApi>,
        config: BillingJobsConfig,
    ) -> Self {
        CheckPendingPayments {
            store,
            gateway,
            subscriptions,
            config,
        }
    }

    /// Attempt bump shared by every non-terminal outcome. Once the counter
    /// crosses the ceiling a still-pending row is explicitly failed instead
    /// of being stranded in `pending` forever.
    async fn bump_attempts(&self, transaction: &Transaction) -> Res<()> {
        let Some(updated) = self.store.increment_attempts(&transaction.id).await? else {
            return Ok(());
        };

        if updated.cnt_attempts > self.config.payment_attempts_limit
            && updated.process_state == ProcessState::Pending
        {
            info!(
                "transaction {} exhausted its {} attempts, marking failed",
                transaction.id, self.config.payment_attempts_limit
            );
            self.store
                .transition_state(
                    &transaction.id,
                    ProcessState::Pending,
                    ProcessState::Failed,
                    None,
                    None,
                )
                .await?;
        }
        Ok(())
    }

    async fn check_row(&self, transaction: &Transaction) -> Res<()> {
        let Some(external_id) = transaction.external_id else {
            warn!(
                "pending transaction {} has no gateway id",
                transaction.id
            );
            self.bump_attempts(transaction).await?;
            return Ok(());
        };

        let payment = match self.gateway.get_payment_info(external_id).await {
            Ok(Some(payment)) => payment,
            Ok(None) => {
                warn!("gateway does not know payment {}", external_id);
                self.bump_attempts(transaction).await?;
                return Ok(());
            }
            Err(e) => {
                warn!("get_payment_info failed for {}: {}", external_id, e);
                self.bump_attempts(transaction).await?;
                return Ok(());
            }
        };

        match payment.status {
            PaymentStatus::Succeeded => {
                let Some(payment_method_id) = payment
                    .payment_method
                    .as_ref()
                    .map(|m| m.id)
                    .or(transaction.payment_method_id)
                else {
                    warn!(
                        "transaction {} succeeded without a payment method, cannot activate",
                        transaction.id
                    );
                    self.bump_attempts(transaction).await?;
                    return Ok(());
                };

                if let Err(e) = self
                    .subscriptions
                    .activate_subscription(&transaction.subscription_id, &payment_method_id)
                    .await
                {
                    warn!(
                        "activation failed for subscription {}: {}",
                        transaction.subscription_id, e
                    );
                    self.bump_attempts(transaction).await?;
                    return Ok(());
                }

                self.store
                    .transition_state(
                        &transaction.id,
                        ProcessState::Pending,
                        ProcessState::Succeeded,
                        None,
                        Some(payment_method_id),
                    )
                    .await?;
            }
            PaymentStatus::Canceled => {
                if let Err(e) = self
                    .subscriptions
                    .cancel_subscription(&transaction.subscription_id)
                    .await
                {
                    warn!(
                        "cancellation failed for subscription {}: {}",
                        transaction.subscription_id, e
                    );
                    self.bump_attempts(transaction).await?;
                    return Ok(());
                }
                self.bump_attempts(transaction).await?;
            }
            PaymentStatus::Pending | PaymentStatus::WaitingForCapture | PaymentStatus::Unknown => {
                self.bump_attempts(transaction).await?;
            }
        }

        Ok(())
    }

    /// Re-drives a `succeeded` row whose activation may never have been
    /// confirmed, then marks it `applied`.
    async fn apply_row(&self, transaction: &Transaction) -> Res<()> {
        let Some(payment_method_id) = transaction.payment_method_id else {
            warn!(
                "succeeded transaction {} has no payment method, cannot confirm activation",
                transaction.id
            );
            return Ok(());
        };

        if let Err(e) = self
            .subscriptions
            .activate_subscription(&transaction.subscription_id, &payment_method_id)
            .await
        {
            warn!(
                "activation re-drive failed for subscription {}: {}",
                transaction.subscription_id, e
            );
            self.store.increment_attempts(&transaction.id).await?;
            return Ok(());
        }

        self.store
            .transition_state(
                &transaction.id,
                ProcessState::Succeeded,
                ProcessState::Applied,
                None,
                None,
            )
            .await?;
        Ok(())
    }

    async fn drain<F, Fut>(&self, process_state: ProcessState, handle: F) -> Res<()>
    where
        F: Fn(Transaction) -> Fut,
        Fut: Future<Output = Res<()>>,
    {
        let mut cursor = None;
        loop {
            let batch = self
                .store
                .list_batch(&BatchFilter {
                    kind: TransactionKind::Payment,
                    process_state,
                    max_attempts: self.config.payment_attempts_limit,
                    last_attempt_on_or_after: None,
                    cursor,
                    limit: self.config.batch_size,
                })
                .await?;

            let Some(last) = batch.last() else {
                break;
            };
            cursor = Some((last.created_at, last.id));

            let batch_len = batch.len() as i64;
            for transaction in batch {
                handle(transaction).await?;
            }

            if batch_len < self.config.batch_size {
                break;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Job for CheckPendingPayments {
    fn name(&self) -> &'static str {
        "check-pending-payments"
    }

    async fn run_once(&self) -> Res<()> {
        self.drain(ProcessState::Succeeded, |t| async move {
            self.apply_row(&t).await
        })
        .await?;

        self.drain(ProcessState::Pending, |t| async move {
            self.check_row(&t).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::jobs::fakes::{
        FakeGateway, FakeSubscriptions, InMemoryStore, gateway_payment, job_config, payment_row,
    };

    fn job(
        store: &Arc<InMemoryStore>,
        gateway: &Arc<FakeGateway>,
        subscriptions: &Arc<FakeSubscriptions>,
    ) -> CheckPendingPayments {
        CheckPendingPayments::new(
            store.clone(),
            gateway.clone(),
            subscriptions.clone(),
            job_config(),
        )
    }

    #[tokio::test]
    async fn succeeded_payment_activates_subscription_and_marks_succeeded() {
        let external_id = Uuid::new_v4();
        let payment_method_id = Uuid::new_v4();
        let row = payment_row(ProcessState::Pending, None, Some(external_id), 0);
        let row_id = row.id;
        let subscription_id = row.subscription_id;

        let store = Arc::new(InMemoryStore::new(vec![row]));
        let gateway = Arc::new(FakeGateway::default());
        gateway.script_info(
            external_id,
            Some(gateway_payment(PaymentStatus::Succeeded, Some(payment_method_id))),
        );
        let subscriptions = Arc::new(FakeSubscriptions::default());

        job(&store, &gateway, &subscriptions).run_once().await.unwrap();

        let row = store.get(&row_id);
        assert_eq!(row.process_state, ProcessState::Succeeded);
        assert_eq!(row.payment_method_id, Some(payment_method_id));
        assert_eq!(
            subscriptions.activated_pairs(),
            vec![(subscription_id, payment_method_id)]
        );
    }

    #[tokio::test]
    async fn canceled_payment_cancels_subscription_and_increments() {
        let external_id = Uuid::new_v4();
        let row = payment_row(ProcessState::Pending, Some(Uuid::new_v4()), Some(external_id), 0);
        let row_id = row.id;
        let subscription_id = row.subscription_id;

        let store = Arc::new(InMemoryStore::new(vec![row]));
        let gateway = Arc::new(FakeGateway::default());
        gateway.script_info(
            external_id,
            Some(gateway_payment(PaymentStatus::Canceled, None)),
        );
        let subscriptions = Arc::new(FakeSubscriptions::default());

        job(&store, &gateway, &subscriptions).run_once().await.unwrap();

        assert_eq!(subscriptions.canceled_ids(), vec![subscription_id]);
        let row = store.get(&row_id);
        assert_eq!(row.process_state, ProcessState::Pending);
        assert_eq!(row.cnt_attempts, 1);
    }

    #[tokio::test]
    async fn still_pending_payment_only_increments() {
        let external_id = Uuid::new_v4();
        let row = payment_row(ProcessState::Pending, Some(Uuid::new_v4()), Some(external_id), 0);
        let row_id = row.id;

        let store = Arc::new(InMemoryStore::new(vec![row]));
        let gateway = Arc::new(FakeGateway::default());
        gateway.script_info(
            external_id,
            Some(gateway_payment(PaymentStatus::Pending, None)),
        );
        let subscriptions = Arc::new(FakeSubscriptions::default());

        job(&store, &gateway, &subscriptions).run_once().await.unwrap();

        let row = store.get(&row_id);
        assert_eq!(row.process_state, ProcessState::Pending);
        assert_eq!(row.cnt_attempts, 1);
    }

    #[tokio::test]
    async fn missing_payment_increments_and_continues() {
        let external_id = Uuid::new_v4();
        let row = payment_row(ProcessState::Pending, Some(Uuid::new_v4()), Some(external_id), 0);
        let row_id = row.id;

        let store = Arc::new(InMemoryStore::new(vec![row]));
        let gateway = Arc::new(FakeGateway::default());
        gateway.script_info(external_id, None);
        let subscriptions = Arc::new(FakeSubscriptions::default());

        job(&store, &gateway, &subscriptions).run_once().await.unwrap();

        assert_eq!(store.get(&row_id).cnt_attempts, 1);
    }

    #[tokio::test]
    async fn gateway_error_increments_and_continues() {
        let external_id = Uuid::new_v4();
        let row = payment_row(ProcessState::Pending, Some(Uuid::new_v4()), Some(external_id), 0);
        let row_id = row.id;

        let store = Arc::new(InMemoryStore::new(vec![row]));
        let gateway = Arc::new(FakeGateway::default());
        gateway.script_info_error(external_id);
        let subscriptions = Arc::new(FakeSubscriptions::default());

        job(&store, &gateway, &subscriptions).run_once().await.unwrap();

        assert_eq!(store.get(&row_id).cnt_attempts, 1);
    }

    #[tokio::test]
    async fn activation_failure_increments_without_aborting_the_batch() {
        let external_id = Uuid::new_v4();
        let row = payment_row(ProcessState::Pending, Some(Uuid::new_v4()), Some(external_id), 0);
        let row_id = row.id;

        let store = Arc::new(InMemoryStore::new(vec![row]));
        let gateway = Arc::new(FakeGateway::default());
        gateway.script_info(
            external_id,
            Some(gateway_payment(PaymentStatus::Succeeded, None)),
        );
        let subscriptions = Arc::new(FakeSubscriptions::default());
        subscriptions.fail_activation();

        job(&store, &gateway, &subscriptions).run_once().await.unwrap();

        let row = store.get(&row_id);
        assert_eq!(row.process_state, ProcessState::Pending);
        assert_eq!(row.cnt_attempts, 1);
    }

    #[tokio::test]
    async fn crossing_the_ceiling_marks_the_row_failed() {
        let external_id = Uuid::new_v4();
        // already at the ceiling; this pass is its last chance
        let row = payment_row(ProcessState::Pending, Some(Uuid::new_v4()), Some(external_id), 5);
        let row_id = row.id;

        let store = Arc::new(InMemoryStore::new(vec![row]));
        let gateway = Arc::new(FakeGateway::default());
        gateway.script_info(
            external_id,
            Some(gateway_payment(PaymentStatus::Pending, None)),
        );
        let subscriptions = Arc::new(FakeSubscriptions::default());

        job(&store, &gateway, &subscriptions).run_once().await.unwrap();

        let row = store.get(&row_id);
        assert_eq!(row.process_state, ProcessState::Failed);
        assert_eq!(row.cnt_attempts, 6);
    }

    #[tokio::test]
    async fn succeeded_rows_are_re_driven_to_applied() {
        let payment_method_id = Uuid::new_v4();
        let row = payment_row(
            ProcessState::Succeeded,
            Some(payment_method_id),
            Some(Uuid::new_v4()),
            1,
        );
        let row_id = row.id;
        let subscription_id = row.subscription_id;

        let store = Arc::new(InMemoryStore::new(vec![row]));
        let gateway = Arc::new(FakeGateway::default());
        let subscriptions = Arc::new(FakeSubscriptions::default());

        job(&store, &gateway, &subscriptions).run_once().await.unwrap();

        let row = store.get(&row_id);
        assert_eq!(row.process_state, ProcessState::Applied);
        assert_eq!(
            subscriptions.activated_pairs(),
            vec![(subscription_id, payment_method_id)]
        );
    }

    #[tokio::test]
    async fn failed_re_drive_keeps_the_row_succeeded() {
        let row = payment_row(
            ProcessState::Succeeded,
            Some(Uuid::new_v4()),
            Some(Uuid::new_v4()),
            0,
        );
        let row_id = row.id;

        let store = Arc::new(InMemoryStore::new(vec![row]));
        let gateway = Arc::new(FakeGateway::default());
        let subscriptions = Arc::new(FakeSubscriptions::default());
        subscriptions.fail_activation();

        job(&store, &gateway, &subscriptions).run_once().await.unwrap();

        let row = store.get(&row_id);
        assert_eq!(row.process_state, ProcessState::Succeeded);
        assert_eq!(row.cnt_attempts, 1);
    }
}
