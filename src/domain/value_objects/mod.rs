pub mod amounts;
pub mod enums;
pub mod events;
pub mod gateway_notifications;
pub mod invoice_transitions;
pub mod invoices;
pub mod payment_artifacts;
