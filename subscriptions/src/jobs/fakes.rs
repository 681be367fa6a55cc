//! In-memory doubles for the renewal scanner seams.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::env_config::RenewalJobConfig;
use common::error::{Res, ServiceError};
use db::models::subscription::{SubscriptionStatus, SubscriptionType, UserSubscription};
use db::subscriptions::ExpiringFilter;
use uuid::Uuid;

use crate::clients::billing::{
    BillingApi, NewPaymentRequest, RefundPaymentRequest, RenewPaymentRequest,
};
use crate::store::SubscriptionStore;

pub fn job_config() -> RenewalJobConfig {
    RenewalJobConfig {
        renewal_hour: 15,
        lookahead_days: 3,
        batch_size: 100,
    }
}

pub fn subscription_type_row(name: &str, annual_price: i64, monthly_price: i64) -> SubscriptionType {
    let today = Utc::now().date_naive();
    SubscriptionType {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: None,
        annual_price,
        monthly_price,
        start_of_sales: today - Duration::days(30),
        end_of_sales: today + Duration::days(365),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// An active subscription expiring `expires_in_days` from today.
pub fn subscription_row(
    type_id: Uuid,
    status: SubscriptionStatus,
    expires_in_days: i64,
) -> UserSubscription {
    let today = Utc::now().date_naive();
    UserSubscription {
        id: Uuid::new_v4(),
        type_id,
        user_id: Uuid::new_v4(),
        payment_method_id: Some(Uuid::new_v4()),
        status,
        start_of_subscription: Some(today - Duration::days(365 - expires_in_days)),
        end_of_subscription: Some(today + Duration::days(expires_in_days)),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub struct InMemoryRegistry {
    types: Vec<SubscriptionType>,
    rows: Mutex<Vec<UserSubscription>>,
    list_types_calls: AtomicU32,
}

impl InMemoryRegistry {
    pub fn new(types: Vec<SubscriptionType>, rows: Vec<UserSubscription>) -> Self {
        InMemoryRegistry {
            types,
            rows: Mutex::new(rows),
            list_types_calls: AtomicU32::new(0),
        }
    }

    pub fn get(&self, id: &Uuid) -> UserSubscription {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == *id)
            .cloned()
            .expect("subscription exists")
    }

    pub fn list_types_calls(&self) -> u32 {
        self.list_types_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryRegistry {
    async fn list_expiring(&self, filter: &ExpiringFilter) -> Res<Vec<UserSubscription>> {
        let rows = self.rows.lock().unwrap();
        let mut matching: Vec<UserSubscription> = rows
            .iter()
            .filter(|s| s.status == SubscriptionStatus::Active)
            .filter(|s| match s.end_of_subscription {
                Some(end) => end >= filter.from && end <= filter.until,
                None => false,
            })
            .filter(|s| match filter.cursor {
                Some(cursor) => s.id > cursor,
                None => true,
            })
            .cloned()
            .collect();
        matching.sort_by_key(|s| s.id);
        matching.truncate(filter.limit as usize);
        Ok(matching)
    }

    async fn list_types(&self) -> Res<Vec<SubscriptionType>> {
        self.list_types_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.types.clone())
    }

    async fn mark_awaiting_renewal(&self, id: &Uuid) -> Res<Option<UserSubscription>> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|s| s.id == *id) else {
            return Ok(None);
        };
        if row.status != SubscriptionStatus::Active {
            return Ok(None);
        }
        row.status = SubscriptionStatus::AwaitingRenewal;
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }
}

/// Recorded renew request, owned copies for assertions.
#[derive(Debug, Clone)]
pub struct RecordedRenewal {
    pub subscription_id: Uuid,
    pub payment_method_id: Uuid,
    pub amount: bigdecimal::BigDecimal,
    pub description: String,
}

#[derive(Default)]
pub struct FakeBilling {
    renewals: Mutex<Vec<RecordedRenewal>>,
    renewals_fail: AtomicBool,
}

impl FakeBilling {
    pub fn fail_renewals(&self) {
        self.renewals_fail.store(true, Ordering::SeqCst);
    }

    pub fn renew_requests(&self) -> Vec<RecordedRenewal> {
        self.renewals.lock().unwrap().clone()
    }
}

#[async_trait]
impl BillingApi for FakeBilling {
    async fn payments_new(&self, _req: &NewPaymentRequest) -> Result<String, ServiceError> {
        Ok("https://gateway.example/confirm".to_string())
    }

    async fn payments_renew(&self, req: &RenewPaymentRequest) -> Result<(), ServiceError> {
        if self.renewals_fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable("billing service down".to_string()));
        }
        self.renewals.lock().unwrap().push(RecordedRenewal {
            subscription_id: req.subscription_id,
            payment_method_id: req.payment_method_id,
            amount: req.amount.clone(),
            description: req.description.clone(),
        });
        Ok(())
    }

    async fn payments_refund(&self, _req: &RefundPaymentRequest) -> Result<(), ServiceError> {
        Ok(())
    }
}
