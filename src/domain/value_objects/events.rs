use uuid::Uuid;

/// Domain events handed to the real-time fan-out layer. Publishing is
/// best-effort; a lost event never affects invoice state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    InvoicePaid {
        invoice_id: Uuid,
        gateway_invoice_id: i32,
        amount_minor: i64,
    },
    RefundAccepted {
        invoice_id: Uuid,
        refund_request_id: String,
    },
}
