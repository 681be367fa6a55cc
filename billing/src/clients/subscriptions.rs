use async_trait::async_trait;
use common::{
    env_config::ServiceAuthConfig,
    error::ServiceError,
    jwt::generate_service_jwt,
    retry::{RetryPolicy, retry_with_backoff},
};
use log::{info, warn};
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use uuid::Uuid;

/// The subscription-registry operations the billing side drives. Both calls
/// are idempotent on the registry, so a duplicate delivery after a crash is
/// harmless.
#[async_trait]
pub trait SubscriptionsApi: Send + Sync {
    async fn activate_subscription(
        &self,
        subscription_id: &Uuid,
        payment_method_id: &Uuid,
    ) -> Result<(), ServiceError>;

    async fn cancel_subscription(&self, subscription_id: &Uuid) -> Result<(), ServiceError>;
}

/// HTTP client for the subscriptions service. Holds a cached bearer token;
/// a 401 triggers exactly one re-authentication and a single retry.
pub struct SubscriptionsClient {
    client: Client,
    base_url: String,
    auth: ServiceAuthConfig,
    retry: RetryPolicy,
    token: Mutex<Option<String>>,
}

impl SubscriptionsClient {
    pub fn new(base_url: String, auth: ServiceAuthConfig, retry: RetryPolicy) -> Self {
        SubscriptionsClient {
            client: Client::new(),
            base_url,
            auth,
            retry,
            token: Mutex::new(None),
        }
    }

    async fn bearer(&self) -> Result<String, ServiceError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let token = generate_service_jwt("billing", &self.auth)
            .map_err(|e| ServiceError::Auth(e.to_string()))?;
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn refresh_bearer(&self) -> Result<String, ServiceError> {
        let token = generate_service_jwt("billing", &self.auth)
            .map_err(|e| ServiceError::Auth(e.to_string()))?;
        *self.token.lock().await = Some(token.clone());
        Ok(token)
    }

    async fn send(
        &self,
        path: &str,
        body: &serde_json::Value,
        token: &str,
    ) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let error_body = response.json::<serde_json::Value>().await.unwrap_or(
            serde_json::json!({"error": "subscriptions service request failed"}),
        );
        let message = error_body["error"]
            .as_str()
            .unwrap_or("subscriptions service request failed")
            .to_string();
        warn!("subscriptions service answered {}: {}", status, message);

        if status == StatusCode::UNAUTHORIZED {
            Err(ServiceError::Auth(message))
        } else if status.is_server_error() {
            Err(ServiceError::Unavailable(message))
        } else {
            Err(ServiceError::Rejected(message))
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<(), ServiceError> {
        let token = self.bearer().await?;
        match retry_with_backoff(&self.retry, || self.send(path, &body, &token)).await {
            Err(ServiceError::Auth(_)) => {
                info!("re-authenticating against the subscriptions service");
                let token = self.refresh_bearer().await?;
                retry_with_backoff(&self.retry, || self.send(path, &body, &token)).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl SubscriptionsApi for SubscriptionsClient {
    async fn activate_subscription(
        &self,
        subscription_id: &Uuid,
        payment_method_id: &Uuid,
    ) -> Result<(), ServiceError> {
        self.post(
            &format!("/user_subscriptions/{}/activate", subscription_id),
            serde_json::json!({ "payment_method_id": payment_method_id }),
        )
        .await
    }

    async fn cancel_subscription(&self, subscription_id: &Uuid) -> Result<(), ServiceError> {
        self.post(
            &format!("/user_subscriptions/{}/cancel", subscription_id),
            serde_json::json!({}),
        )
        .await
    }
}
