use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::invoices;

/// One workshop seat owed. Created pending by the booking flow (out of
/// scope here); never deleted — cancellation and refund are transitions.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = invoices)]
pub struct InvoiceEntity {
    pub id: Uuid,
    pub description: String,
    pub customer_email: Option<String>,
    /// Drives refund-window eligibility.
    pub workshop_at: DateTime<Utc>,
    pub amount_minor: i64,
    /// Assigned at first payment-link creation; the join key for every
    /// inbound notification (the internal id is not round-tripped).
    pub gateway_invoice_id: Option<i32>,
    /// Opaque refund authorization token, cached after first fetch.
    pub gateway_operation_token: Option<String>,
    pub status: String,
    pub refund_status: String,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refund_request_id: Option<String>,
    pub refund_reason: Option<String>,
    pub refund_contact_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = invoices)]
pub struct InsertInvoiceEntity {
    pub description: String,
    pub customer_email: Option<String>,
    pub workshop_at: DateTime<Utc>,
    pub amount_minor: i64,
    pub status: String,
    pub refund_status: String,
}
