pub mod invoice_statuses;
pub mod refund_statuses;
