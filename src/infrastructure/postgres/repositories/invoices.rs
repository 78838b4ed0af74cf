use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use diesel::{OptionalExtension, RunQueryDsl, prelude::*, update};
use uuid::Uuid;

use crate::{
    domain::{
        entities::invoices::InvoiceEntity,
        repositories::invoices::InvoiceRepository,
        value_objects::{
            enums::{invoice_statuses::InvoiceStatus, refund_statuses::RefundStatus},
            invoice_transitions::{
                self, CancellationOutcome, PaymentOutcome, RefundCompletionOutcome,
                RefundRequestOutcome,
            },
            invoices::{BeginRefundModel, PaymentConfirmationModel},
        },
    },
    infrastructure::postgres::{postgres_connection::PgPoolSquad, schema::invoices},
};

pub struct InvoicePostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl InvoicePostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

fn parse_status(invoice: &InvoiceEntity) -> Result<InvoiceStatus> {
    InvoiceStatus::from_str(&invoice.status)
        .ok_or_else(|| anyhow!("invoice {} has unknown status {:?}", invoice.id, invoice.status))
}

fn parse_refund_status(invoice: &InvoiceEntity) -> Result<RefundStatus> {
    RefundStatus::from_str(&invoice.refund_status).ok_or_else(|| {
        anyhow!(
            "invoice {} has unknown refund status {:?}",
            invoice.id,
            invoice.refund_status
        )
    })
}

#[async_trait]
impl InvoiceRepository for InvoicePostgres {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<InvoiceEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let invoice = invoices::table
            .find(id)
            .select(InvoiceEntity::as_select())
            .first::<InvoiceEntity>(&mut conn)
            .optional()?;

        Ok(invoice)
    }

    async fn find_by_gateway_invoice_id(
        &self,
        gateway_invoice_id: i32,
    ) -> Result<Option<InvoiceEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let invoice = invoices::table
            .filter(invoices::gateway_invoice_id.eq(gateway_invoice_id))
            .select(InvoiceEntity::as_select())
            .first::<InvoiceEntity>(&mut conn)
            .optional()?;

        Ok(invoice)
    }

    async fn assign_gateway_invoice_id(&self, id: Uuid, gateway_invoice_id: i32) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(invoices::table.find(id))
            .set((
                invoices::gateway_invoice_id.eq(gateway_invoice_id),
                invoices::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    /// Re-reads the row under `FOR UPDATE` and applies the transition
    /// inside one transaction, so two concurrent deliveries of the same
    /// confirmation serialize and the loser sees the terminal status.
    async fn mark_paid(
        &self,
        gateway_invoice_id: i32,
        confirmation: PaymentConfirmationModel,
    ) -> Result<PaymentOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        conn.transaction::<PaymentOutcome, anyhow::Error, _>(|conn| {
            let invoice: InvoiceEntity = invoices::table
                .filter(invoices::gateway_invoice_id.eq(gateway_invoice_id))
                .select(InvoiceEntity::as_select())
                .for_update()
                .first(conn)?;

            let status = parse_status(&invoice)?;
            let outcome = invoice_transitions::apply_payment(
                status,
                invoice.amount_minor,
                confirmation.confirmed_minor,
            );

            if outcome == PaymentOutcome::Transitioned {
                update(invoices::table.find(invoice.id))
                    .set((
                        invoices::status.eq(InvoiceStatus::Paid.as_str()),
                        invoices::payment_method.eq(confirmation.payment_method),
                        invoices::payment_reference.eq(confirmation.payment_reference),
                        invoices::paid_at.eq(Some(confirmation.paid_at)),
                        invoices::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)?;
            }

            Ok(outcome)
        })
    }

    async fn mark_cancelled(&self, id: Uuid) -> Result<CancellationOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        conn.transaction::<CancellationOutcome, anyhow::Error, _>(|conn| {
            let invoice: InvoiceEntity = invoices::table
                .find(id)
                .select(InvoiceEntity::as_select())
                .for_update()
                .first(conn)?;

            let status = parse_status(&invoice)?;
            let outcome = invoice_transitions::apply_cancellation(status);

            if outcome == CancellationOutcome::Cancelled {
                update(invoices::table.find(id))
                    .set((
                        invoices::status.eq(InvoiceStatus::Cancelled.as_str()),
                        invoices::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)?;
            }

            Ok(outcome)
        })
    }

    /// The filter makes this a no-op when a token is already cached, so
    /// the first stored token wins without a read-modify-write race.
    async fn store_operation_token(&self, id: Uuid, token: String) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(
            invoices::table
                .find(id)
                .filter(invoices::gateway_operation_token.is_null()),
        )
        .set((
            invoices::gateway_operation_token.eq(token),
            invoices::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

        Ok(())
    }

    async fn begin_refund(
        &self,
        id: Uuid,
        request: BeginRefundModel,
    ) -> Result<RefundRequestOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        conn.transaction::<RefundRequestOutcome, anyhow::Error, _>(|conn| {
            let invoice: InvoiceEntity = invoices::table
                .find(id)
                .select(InvoiceEntity::as_select())
                .for_update()
                .first(conn)?;

            let status = parse_status(&invoice)?;
            let refund_status = parse_refund_status(&invoice)?;
            let outcome = invoice_transitions::apply_refund_request(status, refund_status);

            if outcome == RefundRequestOutcome::Accepted {
                update(invoices::table.find(id))
                    .set((
                        invoices::refund_status.eq(RefundStatus::Pending.as_str()),
                        invoices::refund_request_id.eq(request.refund_request_id),
                        invoices::refund_reason.eq(request.reason),
                        invoices::refund_contact_email.eq(request.contact_email),
                        invoices::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)?;
            }

            Ok(outcome)
        })
    }

    async fn complete_refund(&self, id: Uuid) -> Result<RefundCompletionOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        conn.transaction::<RefundCompletionOutcome, anyhow::Error, _>(|conn| {
            let invoice: InvoiceEntity = invoices::table
                .find(id)
                .select(InvoiceEntity::as_select())
                .for_update()
                .first(conn)?;

            let refund_status = parse_refund_status(&invoice)?;
            let outcome = invoice_transitions::apply_refund_completion(refund_status);

            if outcome == RefundCompletionOutcome::Completed {
                update(invoices::table.find(id))
                    .set((
                        invoices::refund_status.eq(RefundStatus::Completed.as_str()),
                        invoices::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)?;
            }

            Ok(outcome)
        })
    }
}
