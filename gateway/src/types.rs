//! Wire types of the payment gateway contract.

use chrono::{DateTime, Utc};
use common::types::Currency;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status vocabulary reported by the gateway. This is the gateway's own
/// lifecycle, not the ledger's `process_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    WaitingForCapture,
    Succeeded,
    Canceled,
    /// Anything the gateway starts reporting that this build does not know.
    /// Jobs treat it like `pending`: increment attempts and look again later.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Amount {
    /// Decimal string, e.g. "1200.00".
    pub value: String,
    pub currency: Currency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmation {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: Uuid,
    #[serde(default)]
    pub saved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInternal {
    pub id: Uuid,
    pub status: PaymentStatus,
    pub amount: Amount,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub confirmation: Option<Confirmation>,
    pub created_at: DateTime<Utc>,
}

impl PaymentInternal {
    /// Redirect URL the payer must visit to confirm a first charge.
    pub fn confirmation_url(&self) -> Option<&str> {
        self.confirmation
            .as_ref()
            .and_then(|c| c.confirmation_url.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundInternal {
    pub id: Uuid,
    pub status: PaymentStatus,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_decodes_snake_case() {
        let status: PaymentStatus = serde_json::from_str("\"waiting_for_capture\"").unwrap();
        assert_eq!(status, PaymentStatus::WaitingForCapture);
        let status: PaymentStatus = serde_json::from_str("\"succeeded\"").unwrap();
        assert_eq!(status, PaymentStatus::Succeeded);
    }

    #[test]
    fn unknown_status_does_not_fail_decoding() {
        let status: PaymentStatus = serde_json::from_str("\"under_review\"").unwrap();
        assert_eq!(status, PaymentStatus::Unknown);
    }

    #[test]
    fn payment_decodes_without_optional_fields() {
        let payment: PaymentInternal = serde_json::from_value(serde_json::json!({
            "id": "2419a771-000f-5000-9000-1edaf29243f2",
            "status": "pending",
            "amount": { "value": "1200.00", "currency": "RUB" },
            "created_at": "2025-06-01T12:00:00Z"
        }))
        .unwrap();
        assert!(payment.payment_method.is_none());
        assert!(payment.confirmation_url().is_none());
    }
}
