use chrono::{DateTime, Utc};

/// What a verified payment confirmation carries into the `mark_paid`
/// transition.
#[derive(Debug, Clone)]
pub struct PaymentConfirmationModel {
    pub confirmed_minor: i64,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub paid_at: DateTime<Utc>,
}

/// Refund request metadata persisted once the gateway accepts the
/// refund submission.
#[derive(Debug, Clone)]
pub struct BeginRefundModel {
    pub refund_request_id: String,
    pub reason: String,
    pub contact_email: String,
}
