use async_trait::async_trait;
use bigdecimal::BigDecimal;
use common::{
    env_config::ServiceAuthConfig,
    error::ServiceError,
    jwt::generate_service_jwt,
    retry::{RetryPolicy, retry_with_backoff},
    types::Currency,
};
use log::{info, warn};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct NewPaymentRequest {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub currency: Currency,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct RenewPaymentRequest {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub currency: Currency,
    pub payment_method_id: Uuid,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct RefundPaymentRequest {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub currency: Currency,
    pub description: String,
}

/// The billing-ledger operations the registry side drives.
#[async_trait]
pub trait BillingApi: Send + Sync {
    /// Requests a first charge; answers with the confirmation URL the payer
    /// must visit.
    async fn payments_new(&self, req: &NewPaymentRequest) -> Result<String, ServiceError>;

    /// Registers a recurring charge; the billing jobs drive it from there.
    async fn payments_renew(&self, req: &RenewPaymentRequest) -> Result<(), ServiceError>;

    async fn payments_refund(&self, req: &RefundPaymentRequest) -> Result<(), ServiceError>;
}

/// HTTP client for the billing service. Holds a cached bearer token; a 401
/// triggers exactly one re-authentication and a single retry.
pub struct BillingClient {
    client: Client,
    base_url: String,
    auth: ServiceAuthConfig,
    retry: RetryPolicy,
    token: Mutex<Option<String>>,
}

impl BillingClient {
    pub fn new(base_url: String, auth: ServiceAuthConfig, retry: RetryPolicy) -> Self {
        BillingClient {
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
        let token = generate_service_jwt("subscriptions", &self.auth)
            .map_err(|e| ServiceError::Auth(e.to_string()))?;
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn refresh_bearer(&self) -> Result<String, ServiceError> {
        let token = generate_service_jwt("subscriptions", &self.auth)
            .map_err(|e| ServiceError::Auth(e.to_string()))?;
        *self.token.lock().await = Some(token.clone());
        Ok(token)
    }

    async fn send(
        &self,
        path: &str,
        body: &serde_json::Value,
        token: &str,
    ) -> Result<serde_json::Value, ServiceError> {
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
            return Ok(response
                .json::<serde_json::Value>()
                .await
                .unwrap_or(serde_json::Value::Null));
        }

        let error_body = response
            .json::<serde_json::Value>()
            .await
            .unwrap_or(serde_json::json!({"error": "billing service request failed"}));
        let message = error_body["error"]
            .as_str()
            .unwrap_or("billing service request failed")
            .to_string();
        warn!("billing service answered {}: {}", status, message);

        if status == StatusCode::UNAUTHORIZED {
            Err(ServiceError::Auth(message))
        } else if status == StatusCode::CONFLICT {
            Err(ServiceError::Integrity(message))
        } else if status.is_server_error() {
            Err(ServiceError::Unavailable(message))
        } else {
            Err(ServiceError::Rejected(message))
        }
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, ServiceError> {
        let token = self.bearer().await?;
        match retry_with_backoff(&self.retry, || self.send(path, &body, &token)).await {
            Err(ServiceError::Auth(_)) => {
                info!("re-authenticating against the billing service");
                let token = self.refresh_bearer().await?;
                retry_with_backoff(&self.retry, || self.send(path, &body, &token)).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl BillingApi for BillingClient {
    async fn payments_new(&self, req: &NewPaymentRequest) -> Result<String, ServiceError> {
        let body = serde_json::to_value(req)
            .map_err(|e| ServiceError::Rejected(format!("unserializable request: {}", e)))?;
        let response = self.post("/payments/new", body).await?;
        response["confirmation_url"]
            .as_str()
            .map(|url| url.to_string())
            .ok_or_else(|| {
                ServiceError::Rejected("billing did not return a confirmation url".to_string())
            })
    }

    async fn payments_renew(&self, req: &RenewPaymentRequest) -> Result<(), ServiceError> {
        let body = serde_json::to_value(req)
            .map_err(|e| ServiceError::Rejected(format!("unserializable request: {}", e)))?;
        self.post("/payments/renew", body).await.map(|_| ())
    }

    async fn payments_refund(&self, req: &RefundPaymentRequest) -> Result<(), ServiceError> {
        let body = serde_json::to_value(req)
            .map_err(|e| ServiceError::Rejected(format!("unserializable request: {}", e)))?;
        self.post("/payments/refund", body).await.map(|_| ())
    }
}
