use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use common::error::{AppError, Res};
use common::types::Currency;
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::models::transaction::{ProcessState, Transaction, TransactionKind};

pub struct PaymentCreate {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub description: String,
    pub amount: BigDecimal,
    pub currency: Currency,
    pub process_state: ProcessState,
    pub external_id: Option<Uuid>,
    pub payment_method_id: Option<Uuid>,
    pub payment_created_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

pub struct RefundCreate {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub description: String,
    pub amount: BigDecimal,
    pub currency: Currency,
    pub process_state: ProcessState,
    pub external_id: Uuid,
    pub payment_method_id: Option<Uuid>,
    /// The original payment transaction this refund reverses.
    pub refund_payment_id: Uuid,
    pub payment_created_at: DateTime<Utc>,
}

/// State-gated batch query used by the reconciliation jobs. `cursor` is the
/// `(created_at, id)` of the last row of the previous page.
pub struct BatchFilter {
    pub kind: TransactionKind,
    pub process_state: ProcessState,
    pub max_attempts: i32,
    /// When set, rows must have `last_attempt_at` null or on/after this date.
    pub last_attempt_on_or_after: Option<NaiveDate>,
    pub cursor: Option<(DateTime<Utc>, Uuid)>,
    pub limit: i64,
}

/// Optional filters for the transaction listing endpoint.
#[derive(Default)]
pub struct ListFilter {
    pub subscription_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub payment_method_id: Option<Uuid>,
    pub kind: Option<TransactionKind>,
    pub process_state: Option<ProcessState>,
}

pub async fn insert_payment<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: PaymentCreate,
) -> Res<Transaction> {
    sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions
            (subscription_id, user_id, description, amount, currency, kind,
             process_state, external_id, payment_method_id, payment_created_at,
             last_attempt_at)
        VALUES ($1, $2, $3, $4, $5, 'payment', $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(data.subscription_id)
    .bind(data.user_id)
    .bind(&data.description)
    .bind(&data.amount)
    .bind(data.currency)
    .bind(data.process_state)
    .bind(data.external_id)
    .bind(data.payment_method_id)
    .bind(data.payment_created_at)
    .bind(data.last_attempt_at)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn insert_refund<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: RefundCreate,
) -> Res<Transaction> {
    sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions
            (subscription_id, user_id, description, amount, currency, kind,
             process_state, external_id, payment_method_id, refund_payment_id,
             payment_created_at)
        VALUES ($1, $2, $3, $4, $5, 'refund', $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(data.subscription_id)
    .bind(data.user_id)
    .bind(&data.description)
    .bind(&data.amount)
    .bind(data.currency)
    .bind(data.process_state)
    .bind(data.external_id)
    .bind(data.payment_method_id)
    .bind(data.refund_payment_id)
    .bind(data.payment_created_at)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn get_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    id: &Uuid,
) -> Res<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

/// Conditionally transitions `process_state`, guarded by the expected prior
/// state. Returns `None` when the row is no longer in `from` (a concurrent
/// run got there first); callers log and skip.
///
/// `external_id` and `payment_method_id` are written only when provided.
pub async fn transition_state<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
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

    sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET process_state = $3,
            external_id = COALESCE($4, external_id),
            payment_method_id = COALESCE($5, payment_method_id),
            changed_at = now()
        WHERE id = $1 AND process_state = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .bind(external_id)
    .bind(payment_method_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

/// Advances the attempt counter and stamps `last_attempt_at`. The counter is
/// only ever incremented.
pub async fn increment_attempts<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    id: &Uuid,
) -> Res<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET cnt_attempts = cnt_attempts + 1,
            last_attempt_at = now(),
            changed_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

/// One keyset page of the rows a reconciliation job should drive.
pub async fn list_batch<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    filter: &BatchFilter,
) -> Res<Vec<Transaction>> {
    let (cursor_at, cursor_id) = match filter.cursor {
        Some((at, id)) => (Some(at), Some(id)),
        None => (None, None),
    };

    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT * FROM transactions
        WHERE kind = $1
          AND process_state = $2
          AND cnt_attempts <= $3
          AND ($4::date IS NULL OR last_attempt_at IS NULL OR last_attempt_at::date >= $4)
          AND ($5::timestamptz IS NULL OR (created_at, id) > ($5, $6))
        ORDER BY created_at, id
        LIMIT $7
        "#,
    )
    .bind(filter.kind)
    .bind(filter.process_state)
    .bind(filter.max_attempts)
    .bind(filter.last_attempt_on_or_after)
    .bind(cursor_at)
    .bind(cursor_id)
    .bind(filter.limit)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

/// The most recent succeeded payment for a subscription, i.e. the one a
/// refund reverses.
pub async fn get_payment_for_refund<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: &Uuid,
    subscription_id: &Uuid,
) -> Res<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT * FROM transactions
        WHERE user_id = $1
          AND subscription_id = $2
          AND kind = 'payment'
          AND process_state IN ('succeeded', 'applied')
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(subscription_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn list<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    filter: &ListFilter,
    limit: i64,
) -> Res<Vec<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT * FROM transactions
        WHERE ($1::uuid IS NULL OR subscription_id = $1)
          AND ($2::uuid IS NULL OR user_id = $2)
          AND ($3::uuid IS NULL OR payment_method_id = $3)
          AND ($4::transaction_kind IS NULL OR kind = $4)
          AND ($5::transaction_process_state IS NULL OR process_state = $5)
        ORDER BY created_at DESC
        LIMIT $6
        "#,
    )
    .bind(filter.subscription_id)
    .bind(filter.user_id)
    .bind(filter.payment_method_id)
    .bind(filter.kind)
    .bind(filter.process_state)
    .bind(limit)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}
