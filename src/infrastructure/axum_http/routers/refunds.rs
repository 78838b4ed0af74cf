use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::post,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    application::usercases::{
        gateway_webhook::PaymentEventSink,
        refunds::{RefundRequestModel, RefundUseCase},
    },
    config::config_model::GatewayConfig,
    domain::repositories::{invoices::InvoiceRepository, retry_ledger::RetryLedgerRepository},
    infrastructure::{
        events::TracingEventSink,
        postgres::{
            postgres_connection::PgPoolSquad,
            repositories::{invoices::InvoicePostgres, retry_ledger::RetryLedgerPostgres},
        },
    },
    payments::gateway_client::{GatewayApi, GatewayClient},
};

#[derive(Debug, Deserialize)]
pub struct RefundRequestBody {
    pub reason: String,
    pub contact_email: String,
}

pub fn routes(db_pool: Arc<PgPoolSquad>, config: GatewayConfig) -> Router {
    let invoice_repository = InvoicePostgres::new(Arc::clone(&db_pool));
    let retry_ledger_repository = RetryLedgerPostgres::new(Arc::clone(&db_pool));
    let gateway_client = GatewayClient::new(config.clone());
    let refund_usecase = RefundUseCase::new(
        Arc::new(invoice_repository),
        Arc::new(retry_ledger_repository),
        Arc::new(gateway_client),
        Arc::new(TracingEventSink),
        config,
    );

    Router::new()
        .route("/:invoice_id", post(initiate_refund))
        .route("/:invoice_id/complete", post(complete_refund))
        .with_state(Arc::new(refund_usecase))
}

pub async fn initiate_refund<I, L, G, E>(
    State(refund_usecase): State<Arc<RefundUseCase<I, L, G, E>>>,
    Path(invoice_id): Path<Uuid>,
    Json(body): Json<RefundRequestBody>,
) -> impl IntoResponse
where
    I: InvoiceRepository + Send + Sync + 'static,
    L: RetryLedgerRepository + Send + Sync + 'static,
    G: GatewayApi + 'static,
    E: PaymentEventSink + 'static,
{
    let request = RefundRequestModel {
        reason: body.reason,
        contact_email: body.contact_email,
    };
    match refund_usecase.initiate_refund(invoice_id, request).await {
        Ok(refund_request_id) => {
            Json(json!({ "refund_request_id": refund_request_id })).into_response()
        }
        Err(err) => (err.status_code(), Json(json!({ "error": err.to_string() }))).into_response(),
    }
}

pub async fn complete_refund<I, L, G, E>(
    State(refund_usecase): State<Arc<RefundUseCase<I, L, G, E>>>,
    Path(invoice_id): Path<Uuid>,
) -> impl IntoResponse
where
    I: InvoiceRepository + Send + Sync + 'static,
    L: RetryLedgerRepository + Send + Sync + 'static,
    G: GatewayApi + 'static,
    E: PaymentEventSink + 'static,
{
    match refund_usecase.complete_refund(invoice_id).await {
        Ok(()) => Json(json!({ "status": "completed" })).into_response(),
        Err(err) => (err.status_code(), Json(json!({ "error": err.to_string() }))).into_response(),
    }
}
