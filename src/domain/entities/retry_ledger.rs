use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::retry_ledger;

/// Append-only record of a failed post-confirmation side effect, keyed
/// by the gateway operation id so an out-of-band sweep can replay it.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = retry_ledger)]
pub struct RetryLedgerEntity {
    pub id: Uuid,
    pub operation_id: String,
    pub error: String,
    pub payment_reference: Option<String>,
    pub invoice_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = retry_ledger)]
pub struct NewRetryLedgerEntity {
    pub operation_id: String,
    pub error: String,
    pub payment_reference: Option<String>,
    pub invoice_id: Option<Uuid>,
}
