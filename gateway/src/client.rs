use async_trait::async_trait;
use bigdecimal::BigDecimal;
use common::{
    env_config::GatewayConfig,
    error::ServiceError,
    retry::{RetryPolicy, retry_with_backoff},
    types::Currency,
};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::types::{Amount, PaymentInternal, RefundInternal};

/// Ledger intent to charge a payer.
///
/// `payment_method_id` absent means a first charge: the gateway captures a
/// new method and answers with a redirect confirmation URL. Present means a
/// recurring charge against the stored method, no user interaction.
pub struct CreatePayment {
    pub amount: BigDecimal,
    pub currency: Currency,
    pub description: String,
    pub payment_method_id: Option<Uuid>,
}

pub struct CreateRefund {
    pub amount: BigDecimal,
    pub currency: Currency,
    pub description: String,
    /// Gateway id of the payment being reversed.
    pub payment_to_refund_external_id: Uuid,
}

/// The gateway operations the reconciliation core consumes. Jobs and routes
/// take this trait so tests can substitute a scripted fake.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(&self, req: &CreatePayment) -> Result<PaymentInternal, ServiceError>;

    async fn create_refund(&self, req: &CreateRefund) -> Result<RefundInternal, ServiceError>;

    /// Polls one payment. `Ok(None)` means the gateway does not know the id.
    async fn get_payment_info(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<PaymentInternal>, ServiceError>;
}

#[derive(Serialize)]
struct ConfirmationRequest {
    #[serde(rename = "type")]
    kind: &'static str,
    return_url: String,
}

#[derive(Serialize)]
struct CreatePaymentBody {
    amount: Amount,
    description: String,
    capture: bool,
    save_payment_method: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_method_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confirmation: Option<ConfirmationRequest>,
}

#[derive(Serialize)]
struct CreateRefundBody {
    amount: Amount,
    description: String,
    payment_id: Uuid,
}

/// HTTP implementation of the gateway contract.
pub struct HttpGateway {
    client: Client,
    config: GatewayConfig,
    retry: RetryPolicy,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig, retry: RetryPolicy) -> Self {
        HttpGateway {
            client: Client::new(),
            config,
            retry,
        }
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ServiceError> {
        // one key per logical operation, reused across backoff retries, so a
        // retried request cannot double-charge
        let idempotence_key = Uuid::new_v4();

        retry_with_backoff(&self.retry, || async move {
            let response = self
                .client
                .post(format!("{}{}", self.config.base_url, path))
                .basic_auth(&self.config.account_id, Some(&self.config.secret_key))
                .header("Idempotence-Key", idempotence_key.to_string())
                .json(body)
                .send()
                .await
                .map_err(map_transport_error)?;

            decode_response(response).await
        })
        .await
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_payment(&self, req: &CreatePayment) -> Result<PaymentInternal, ServiceError> {
        let body = CreatePaymentBody {
            amount: Amount {
                value: req.amount.to_string(),
                currency: req.currency,
            },
            description: req.description.clone(),
            capture: true,
            // first charges capture the method for future recurring use
            save_payment_method: req.payment_method_id.is_none(),
            payment_method_id: req.payment_method_id,
            confirmation: req.payment_method_id.is_none().then(|| ConfirmationRequest {
                kind: "redirect",
                return_url: self.config.return_url.clone(),
            }),
        };
        self.post("/payments", &body).await
    }

    async fn create_refund(&self, req: &CreateRefund) -> Result<RefundInternal, ServiceError> {
        let body = CreateRefundBody {
            amount: Amount {
                value: req.amount.to_string(),
                currency: req.currency,
            },
            description: req.description.clone(),
            payment_id: req.payment_to_refund_external_id,
        };
        self.post("/refunds", &body).await
    }

    async fn get_payment_info(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<PaymentInternal>, ServiceError> {
        retry_with_backoff(&self.retry, || async move {
            let response = self
                .client
                .get(format!("{}/payments/{}", self.config.base_url, payment_id))
                .basic_auth(&self.config.account_id, Some(&self.config.secret_key))
                .send()
                .await
                .map_err(map_transport_error)?;

            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            decode_response(response).await.map(Some)
        })
        .await
    }
}

fn map_transport_error(err: reqwest::Error) -> ServiceError {
    ServiceError::Unavailable(err.to_string())
}

async fn decode_response<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
    let status = response.status();

    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::Rejected(format!("malformed gateway response: {}", e)));
    }

    let error_body = response
        .json::<serde_json::Value>()
        .await
        .unwrap_or(serde_json::json!({"description": "no error body"}));
    let message = error_body["description"]
        .as_str()
        .unwrap_or("gateway request failed")
        .to_string();
    log::warn!("gateway answered {}: {}", status, message);

    if status.is_server_error() {
        Err(ServiceError::Unavailable(message))
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(ServiceError::Auth(message))
    } else {
        Err(ServiceError::Rejected(message))
    }
}
