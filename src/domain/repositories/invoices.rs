use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::invoices::InvoiceEntity;
use crate::domain::value_objects::invoice_transitions::{
    CancellationOutcome, PaymentOutcome, RefundCompletionOutcome, RefundRequestOutcome,
};
use crate::domain::value_objects::invoices::{BeginRefundModel, PaymentConfirmationModel};

/// Invoice persistence. Every transition method re-reads the row under a
/// row lock inside one transaction, applies the pure state machine and
/// writes the result, so concurrent webhook deliveries serialize per
/// invoice.
#[automock]
#[async_trait]
pub trait InvoiceRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<InvoiceEntity>>;

    async fn find_by_gateway_invoice_id(
        &self,
        gateway_invoice_id: i32,
    ) -> Result<Option<InvoiceEntity>>;

    /// Overwrites the gateway invoice id; each payment-link creation
    /// assigns a fresh one before handing an artifact to the caller.
    async fn assign_gateway_invoice_id(&self, id: Uuid, gateway_invoice_id: i32) -> Result<()>;

    async fn mark_paid(
        &self,
        gateway_invoice_id: i32,
        confirmation: PaymentConfirmationModel,
    ) -> Result<PaymentOutcome>;

    async fn mark_cancelled(&self, id: Uuid) -> Result<CancellationOutcome>;

    /// No-op if a token is already cached; the first fetched token wins.
    async fn store_operation_token(&self, id: Uuid, token: String) -> Result<()>;

    async fn begin_refund(
        &self,
        id: Uuid,
        request: BeginRefundModel,
    ) -> Result<RefundRequestOutcome>;

    async fn complete_refund(&self, id: Uuid) -> Result<RefundCompletionOutcome>;
}
