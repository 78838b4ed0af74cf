use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::config_model::GatewayConfig;
use crate::domain::entities::invoices::InvoiceEntity;
use crate::domain::entities::retry_ledger::NewRetryLedgerEntity;
use crate::domain::repositories::invoices::InvoiceRepository;
use crate::domain::repositories::retry_ledger::RetryLedgerRepository;
use crate::domain::value_objects::enums::invoice_statuses::InvoiceStatus;
use crate::domain::value_objects::events::PaymentEvent;
use crate::domain::value_objects::invoice_transitions::{
    RefundCompletionOutcome, RefundRequestOutcome,
};
use crate::domain::value_objects::invoices::BeginRefundModel;
use crate::payments::gateway_client::{GatewayApi, GatewayError};
use crate::payments::receipt::FiscalReceipt;

use super::gateway_webhook::PaymentEventSink;

/// Refunds close no earlier than three hours before the workshop starts.
const REFUND_CUTOFF_HOURS: i64 = 3;

#[derive(Debug, Error)]
pub enum RefundError {
    #[error("invoice not found")]
    InvoiceNotFound,
    #[error("invoice is not refundable: status is {0}")]
    InvoiceNotRefundable(String),
    #[error("a refund is already in progress or completed")]
    RefundAlreadyInProgress,
    #[error("the refund window has closed")]
    RefundWindowClosed,
    #[error("no refund operation token could be obtained: {0}")]
    OperationTokenUnavailable(String),
    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("gateway rejected the refund: {0}")]
    GatewayRejected(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RefundError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            RefundError::InvoiceNotFound => StatusCode::NOT_FOUND,
            RefundError::InvoiceNotRefundable(_) => StatusCode::CONFLICT,
            RefundError::RefundAlreadyInProgress => StatusCode::CONFLICT,
            RefundError::RefundWindowClosed => StatusCode::UNPROCESSABLE_ENTITY,
            RefundError::OperationTokenUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RefundError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            RefundError::GatewayRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RefundError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type RefundResult<T> = Result<T, RefundError>;

/// Caller-supplied refund details. The request id comes back from the
/// gateway once the submission is accepted.
#[derive(Debug, Clone)]
pub struct RefundRequestModel {
    pub reason: String,
    pub contact_email: String,
}

pub struct RefundUseCase<I, L, G, E>
where
    I: InvoiceRepository + Send + Sync + 'static,
    L: RetryLedgerRepository + Send + Sync + 'static,
    G: GatewayApi + 'static,
    E: PaymentEventSink + 'static,
{
    invoice_repo: Arc<I>,
    retry_ledger: Arc<L>,
    gateway: Arc<G>,
    events: Arc<E>,
    config: GatewayConfig,
}

impl<I, L, G, E> RefundUseCase<I, L, G, E>
where
    I: InvoiceRepository + Send + Sync + 'static,
    L: RetryLedgerRepository + Send + Sync + 'static,
    G: GatewayApi + 'static,
    E: PaymentEventSink + 'static,
{
    pub fn new(
        invoice_repo: Arc<I>,
        retry_ledger: Arc<L>,
        gateway: Arc<G>,
        events: Arc<E>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            invoice_repo,
            retry_ledger,
            gateway,
            events,
            config,
        }
    }

    /// Full-amount refund against the original payment operation. The
    /// gateway submission happens before the local transition, so a
    /// crash between the two leaves a submitted-but-unrecorded refund;
    /// the retry ledger entry written in that corridor carries the
    /// request id needed to reconcile it by hand.
    pub async fn initiate_refund(
        &self,
        invoice_id: Uuid,
        request: RefundRequestModel,
    ) -> RefundResult<String> {
        let invoice = self.load_invoice(invoice_id).await?;

        if InvoiceStatus::from_str(&invoice.status) != Some(InvoiceStatus::Paid) {
            warn!(
                %invoice_id,
                status = %invoice.status,
                "refunds: invoice is not refundable"
            );
            return Err(RefundError::InvoiceNotRefundable(invoice.status.clone()));
        }
        if invoice.refund_status != "none" {
            warn!(
                %invoice_id,
                refund_status = %invoice.refund_status,
                "refunds: refund already requested"
            );
            return Err(RefundError::RefundAlreadyInProgress);
        }

        // Strictly more than the cutoff must remain; exactly on the
        // boundary the window is closed.
        let remaining = invoice.workshop_at - Utc::now();
        if remaining <= Duration::hours(REFUND_CUTOFF_HOURS) {
            info!(
                %invoice_id,
                workshop_at = %invoice.workshop_at,
                "refunds: refund window has closed"
            );
            return Err(RefundError::RefundWindowClosed);
        }

        let op_key = self.resolve_operation_token(&invoice).await?;

        let receipt = FiscalReceipt::single_service(
            &invoice.description,
            invoice.amount_minor,
            &self.config.taxation_system,
        );
        let submission = self
            .gateway
            .submit_refund(op_key, invoice.amount_minor, Some(receipt))
            .await
            .map_err(|err| self.map_submission_error(&invoice, err))?;

        info!(
            %invoice_id,
            refund_request_id = %submission.request_id,
            "refunds: gateway accepted refund submission"
        );

        let outcome = self
            .invoice_repo
            .begin_refund(
                invoice_id,
                BeginRefundModel {
                    refund_request_id: submission.request_id.clone(),
                    reason: request.reason,
                    contact_email: request.contact_email,
                },
            )
            .await
            .map_err(|err| {
                error!(
                    %invoice_id,
                    refund_request_id = %submission.request_id,
                    db_error = ?err,
                    "refunds: begin_refund transaction failed after gateway accepted"
                );
                RefundError::Internal(err)
            })?;

        match outcome {
            RefundRequestOutcome::Accepted => {}
            RefundRequestOutcome::NotPaid(status) => {
                // Lost a race with a concurrent transition after the
                // gateway already accepted; leave a reconciliation trail.
                self.record_failure(
                    &submission.request_id,
                    &format!("refund accepted by gateway but invoice moved to {status}"),
                    &invoice,
                )
                .await;
                return Err(RefundError::InvoiceNotRefundable(status.to_string()));
            }
            RefundRequestOutcome::AlreadyInProgress(_) => {
                self.record_failure(
                    &submission.request_id,
                    "refund accepted by gateway but another refund won the race",
                    &invoice,
                )
                .await;
                return Err(RefundError::RefundAlreadyInProgress);
            }
        }

        let event = PaymentEvent::RefundAccepted {
            invoice_id,
            refund_request_id: submission.request_id.clone(),
        };
        if let Err(err) = self.events.publish(event).await {
            self.record_failure(
                &submission.request_id,
                &format!("refund event publish failed: {err}"),
                &invoice,
            )
            .await;
        }

        Ok(submission.request_id)
    }

    /// Marks a pending refund as completed once the money actually moved
    /// (operator-confirmed today; a settlement feed later).
    pub async fn complete_refund(&self, invoice_id: Uuid) -> RefundResult<()> {
        let invoice = self.load_invoice(invoice_id).await?;

        let outcome = self
            .invoice_repo
            .complete_refund(invoice_id)
            .await
            .map_err(|err| {
                error!(%invoice_id, db_error = ?err, "refunds: complete_refund failed");
                RefundError::Internal(err)
            })?;

        match outcome {
            RefundCompletionOutcome::Completed => {
                info!(
                    %invoice_id,
                    refund_request_id = ?invoice.refund_request_id,
                    "refunds: refund completed"
                );
                Ok(())
            }
            RefundCompletionOutcome::NotPending(status) => {
                warn!(
                    %invoice_id,
                    refund_status = %status,
                    "refunds: no pending refund to complete"
                );
                Err(RefundError::InvoiceNotRefundable(status.to_string()))
            }
        }
    }

    async fn load_invoice(&self, invoice_id: Uuid) -> RefundResult<InvoiceEntity> {
        self.invoice_repo
            .find_by_id(invoice_id)
            .await
            .map_err(|err| {
                error!(%invoice_id, db_error = ?err, "refunds: failed to load invoice");
                RefundError::Internal(err)
            })?
            .ok_or(RefundError::InvoiceNotFound)
    }

    /// The cached token short-circuits the status query; when it has to
    /// be fetched, it is cached on the invoice before continuing so the
    /// next attempt skips the round trip.
    async fn resolve_operation_token(&self, invoice: &InvoiceEntity) -> RefundResult<String> {
        if let Some(token) = &invoice.gateway_operation_token {
            return Ok(token.clone());
        }

        let gateway_invoice_id = invoice.gateway_invoice_id.ok_or_else(|| {
            RefundError::OperationTokenUnavailable(
                "invoice was never submitted to the gateway".to_string(),
            )
        })?;

        let state = match self.gateway.fetch_operation_state(gateway_invoice_id).await {
            Ok(state) => state,
            Err(GatewayError::Unavailable(reason)) => {
                self.record_failure(
                    &gateway_invoice_id.to_string(),
                    &format!("operation state query failed: {reason}"),
                    invoice,
                )
                .await;
                return Err(RefundError::GatewayUnavailable(reason));
            }
            Err(GatewayError::Rejected(reason)) => {
                warn!(
                    invoice_id = %invoice.id,
                    gateway_invoice_id,
                    reason = %reason,
                    "refunds: gateway has no refundable operation for this invoice"
                );
                return Err(RefundError::OperationTokenUnavailable(reason));
            }
        };

        if let Err(err) = self
            .invoice_repo
            .store_operation_token(invoice.id, state.op_key.clone())
            .await
        {
            // Cache miss next time, nothing worse.
            warn!(
                invoice_id = %invoice.id,
                db_error = ?err,
                "refunds: failed to cache operation token"
            );
        }

        Ok(state.op_key)
    }

    fn map_submission_error(&self, invoice: &InvoiceEntity, err: GatewayError) -> RefundError {
        match err {
            GatewayError::Unavailable(reason) => {
                error!(
                    invoice_id = %invoice.id,
                    reason = %reason,
                    "refunds: refund submission transport failure"
                );
                RefundError::GatewayUnavailable(reason)
            }
            GatewayError::Rejected(reason) => {
                warn!(
                    invoice_id = %invoice.id,
                    reason = %reason,
                    "refunds: gateway rejected refund submission"
                );
                RefundError::GatewayRejected(reason)
            }
        }
    }

    async fn record_failure(&self, operation_id: &str, message: &str, invoice: &InvoiceEntity) {
        let entry = NewRetryLedgerEntity {
            operation_id: operation_id.to_string(),
            error: message.to_string(),
            payment_reference: invoice.payment_reference.clone(),
            invoice_id: Some(invoice.id),
        };
        if let Err(err) = self.retry_ledger.record(entry).await {
            warn!(
                operation_id,
                db_error = ?err,
                "refunds: failed to record retry ledger entry"
            );
        }
    }
}
