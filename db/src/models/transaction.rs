use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use common::types::Currency;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Payment,
    Refund,
}

/// Ledger-side lifecycle stage of a transaction, distinct from the gateway's
/// own status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_process_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    /// Created, not yet submitted to the gateway.
    New,
    /// Accepted by the gateway, awaiting a terminal gateway status.
    Pending,
    /// The gateway confirmed the payment.
    Succeeded,
    /// The linked subscription action has been confirmed to have taken
    /// effect.
    Applied,
    /// Canceled by the gateway or attempt budget exhausted. Terminal.
    Failed,
}

impl ProcessState {
    /// The legal forward edges of the state machine. Everything else,
    /// including every transition out of `Failed`, is rejected.
    pub fn can_transition(self, to: ProcessState) -> bool {
        matches!(
            (self, to),
            (ProcessState::New, ProcessState::Pending)
                | (ProcessState::Pending, ProcessState::Succeeded)
                | (ProcessState::Pending, ProcessState::Failed)
                | (ProcessState::Succeeded, ProcessState::Applied)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessState::Failed)
    }
}

/// One payment or refund attempt against the gateway. Rows are only ever
/// inserted and transitioned, never deleted; a new attempt after `Failed`
/// means a new row.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub payment_method_id: Option<Uuid>,
    pub refund_payment_id: Option<Uuid>,
    pub external_id: Option<Uuid>,
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_edges_are_legal() {
        assert!(ProcessState::New.can_transition(ProcessState::Pending));
        assert!(ProcessState::Pending.can_transition(ProcessState::Succeeded));
        assert!(ProcessState::Pending.can_transition(ProcessState::Failed));
        assert!(ProcessState::Succeeded.can_transition(ProcessState::Applied));
    }

    #[test]
    fn backward_and_skipping_edges_are_illegal() {
        assert!(!ProcessState::Pending.can_transition(ProcessState::New));
        assert!(!ProcessState::Succeeded.can_transition(ProcessState::Pending));
        assert!(!ProcessState::New.can_transition(ProcessState::Succeeded));
        assert!(!ProcessState::New.can_transition(ProcessState::Applied));
        assert!(!ProcessState::Applied.can_transition(ProcessState::Failed));
    }

    #[test]
    fn failed_is_terminal() {
        assert!(ProcessState::Failed.is_terminal());
        assert!(!ProcessState::Failed.can_transition(ProcessState::New));
        assert!(!ProcessState::Failed.can_transition(ProcessState::Pending));
        assert!(!ProcessState::Failed.can_transition(ProcessState::Succeeded));
        assert!(!ProcessState::Failed.can_transition(ProcessState::Applied));
    }
}
