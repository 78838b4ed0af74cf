use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::application::usercases::gateway_webhook::PaymentEventSink;
use crate::domain::value_objects::events::PaymentEvent;

/// Structured-log event sink. The real-time fan-out channel is not wired
/// up yet; operators follow these lines in the meantime and the seam is
/// already in place for a broker-backed sink.
#[derive(Debug, Default)]
pub struct TracingEventSink;

#[async_trait]
impl PaymentEventSink for TracingEventSink {
    async fn publish(&self, event: PaymentEvent) -> Result<()> {
        match event {
            PaymentEvent::InvoicePaid {
                invoice_id,
                gateway_invoice_id,
                amount_minor,
            } => info!(
                %invoice_id,
                gateway_invoice_id,
                amount_minor,
                "event: invoice paid"
            ),
            PaymentEvent::RefundAccepted {
                invoice_id,
                refund_request_id,
            } => info!(
                %invoice_id,
                %refund_request_id,
                "event: refund accepted"
            ),
        }
        Ok(())
    }
}
