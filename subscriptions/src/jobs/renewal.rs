//! Subscription renewal scanner: finds active subscriptions about to expire
//! and asks billing for a recurring charge.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use common::env_config::RenewalJobConfig;
use common::error::Res;
use common::types::Currency;
use db::models::subscription::UserSubscription;
use db::subscriptions::ExpiringFilter;
use log::warn;
use scheduler::Job;
use uuid::Uuid;

use crate::clients::billing::{BillingApi, RenewPaymentRequest};
use crate::store::SubscriptionStore;

struct TypePricing {
    name: String,
    annual_price: i64,
}

pub struct SubscriptionsRenewal {
    store: Arc<dyn SubscriptionStore>,
    billing: Arc<dyn BillingApi>,
    config: RenewalJobConfig,
}

impl SubscriptionsRenewal {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        billing: Arc<dyn BillingApi>,
        config: RenewalJobConfig,
    ) -> Self {
        SubscriptionsRenewal {
            store,
            billing,
            config,
        }
    }

    async fn renew_row(
        &self,
        subscription: &UserSubscription,
        pricing: &HashMap<Uuid, TypePricing>,
    ) {
        let Some(pricing) = pricing.get(&subscription.type_id) else {
            warn!(
                "subscription {} references unknown type {}",
                subscription.id, subscription.type_id
            );
            return;
        };
        let Some(payment_method_id) = subscription.payment_method_id else {
            warn!(
                "subscription {} is active without a payment method, cannot renew",
                subscription.id
            );
            return;
        };

        let request = RenewPaymentRequest {
            subscription_id: subscription.id,
            user_id: subscription.user_id,
            amount: BigDecimal::from(pricing.annual_price),
            currency: Currency::Rub,
            payment_method_id,
            description: format!("Renewal of subscription {}", pricing.name),
        };

        // any failure leaves the row active; the look-ahead window re-includes
        // it on every run until it actually renews or expires
        if let Err(e) = self.billing.payments_renew(&request).await {
            warn!("renewal request for subscription {} failed: {}", subscription.id, e);
            return;
        }

        match self.store.mark_awaiting_renewal(&subscription.id).await {
            Ok(Some(_)) => {}
            Ok(None) => warn!(
                "subscription {} left status 'active' concurrently",
                subscription.id
            ),
            Err(e) => warn!(
                "could not mark subscription {} awaiting renewal: {}",
                subscription.id, e
            ),
        }
    }
}

#[async_trait]
impl Job for SubscriptionsRenewal {
    fn name(&self) -> &'static str {
        "subscriptions-renewal"
    }

    async fn run_once(&self) -> Res<()> {
        let today = Utc::now().date_naive();
        let until = today + Duration::days(self.config.lookahead_days);

        // one price lookup per run instead of one per row
        let pricing: HashMap<Uuid, TypePricing> = self
            .store
            .list_types()
            .await?
            .into_iter()
            .map(|t| {
                (
                    t.id,
                    TypePricing {
                        name: t.name,
                        annual_price: t.annual_price,
                    },
                )
            })
            .collect();

        let mut cursor = None;
        loop {
            let batch = self
                .store
                .list_expiring(&ExpiringFilter {
                    from: today,
                    until,
                    cursor,
                    limit: self.config.batch_size,
                })
                .await?;

            let Some(last) = batch.last() else {
                break;
            };
            cursor = Some(last.id);

            for subscription in &batch {
                self.renew_row(subscription, &pricing).await;
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
    use db::models::subscription::SubscriptionStatus;

    use super::*;
    use crate::jobs::fakes::{FakeBilling, InMemoryRegistry, job_config, subscription_row, subscription_type_row};

    fn job(store: &Arc<InMemoryRegistry>, billing: &Arc<FakeBilling>) -> SubscriptionsRenewal {
        SubscriptionsRenewal::new(store.clone(), billing.clone(), job_config())
    }

    #[tokio::test]
    async fn expiring_subscription_is_renewed_at_the_annual_price() {
        let subscription_type = subscription_type_row("Basic", 1200, 100);
        let row = subscription_row(subscription_type.id, SubscriptionStatus::Active, 2);
        let row_id = row.id;
        let payment_method_id = row.payment_method_id.unwrap();

        let store = Arc::new(InMemoryRegistry::new(vec![subscription_type], vec![row]));
        let billing = Arc::new(FakeBilling::default());

        job(&store, &billing).run_once().await.unwrap();

        let requests = billing.renew_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].subscription_id, row_id);
        assert_eq!(requests[0].payment_method_id, payment_method_id);
        assert_eq!(requests[0].amount, BigDecimal::from(1200));
        assert!(requests[0].description.contains("Basic"));

        assert_eq!(store.get(&row_id).status, SubscriptionStatus::AwaitingRenewal);
    }

    #[tokio::test]
    async fn subscriptions_outside_the_window_are_left_alone() {
        let subscription_type = subscription_type_row("Basic", 1200, 100);
        let row = subscription_row(subscription_type.id, SubscriptionStatus::Active, 10);
        let row_id = row.id;

        let store = Arc::new(InMemoryRegistry::new(vec![subscription_type], vec![row]));
        let billing = Arc::new(FakeBilling::default());

        job(&store, &billing).run_once().await.unwrap();

        assert!(billing.renew_requests().is_empty());
        assert_eq!(store.get(&row_id).status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn client_failure_leaves_the_row_active_for_the_next_run() {
        let subscription_type = subscription_type_row("Basic", 1200, 100);
        let row = subscription_row(subscription_type.id, SubscriptionStatus::Active, 1);
        let row_id = row.id;

        let store = Arc::new(InMemoryRegistry::new(vec![subscription_type], vec![row]));
        let billing = Arc::new(FakeBilling::default());
        billing.fail_renewals();

        job(&store, &billing).run_once().await.unwrap();

        assert_eq!(store.get(&row_id).status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn one_bad_row_does_not_block_the_rest_of_the_batch() {
        let subscription_type = subscription_type_row("Basic", 1200, 100);
        // no payment method: unrenewable, must be skipped
        let mut broken = subscription_row(subscription_type.id, SubscriptionStatus::Active, 1);
        broken.payment_method_id = None;
        let healthy = subscription_row(subscription_type.id, SubscriptionStatus::Active, 2);
        let healthy_id = healthy.id;

        let store = Arc::new(InMemoryRegistry::new(
            vec![subscription_type],
            vec![broken, healthy],
        ));
        let billing = Arc::new(FakeBilling::default());

        job(&store, &billing).run_once().await.unwrap();

        assert_eq!(billing.renew_requests().len(), 1);
        assert_eq!(store.get(&healthy_id).status, SubscriptionStatus::AwaitingRenewal);
    }

    #[tokio::test]
    async fn prices_are_looked_up_once_per_run() {
        let subscription_type = subscription_type_row("Basic", 1200, 100);
        let first = subscription_row(subscription_type.id, SubscriptionStatus::Active, 1);
        let second = subscription_row(subscription_type.id, SubscriptionStatus::Active, 2);

        let store = Arc::new(InMemoryRegistry::new(
            vec![subscription_type],
            vec![first, second],
        ));
        let billing = Arc::new(FakeBilling::default());

        job(&store, &billing).run_once().await.unwrap();

        assert_eq!(store.list_types_calls(), 1);
        assert_eq!(billing.renew_requests().len(), 2);
    }
}
