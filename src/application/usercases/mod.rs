pub mod gateway_webhook;
pub mod payment_links;
pub mod refunds;
