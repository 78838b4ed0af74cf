use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::post,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    application::usercases::payment_links::{PaymentLinkError, PaymentLinkUseCase},
    config::config_model::GatewayConfig,
    domain::repositories::invoices::InvoiceRepository,
    infrastructure::postgres::{
        postgres_connection::PgPoolSquad, repositories::invoices::InvoicePostgres,
    },
    payments::gateway_client::{GatewayApi, GatewayClient},
};

pub fn routes(db_pool: Arc<PgPoolSquad>, config: GatewayConfig) -> Router {
    let invoice_repository = InvoicePostgres::new(Arc::clone(&db_pool));
    let gateway_client = GatewayClient::new(config.clone());
    let payment_link_usecase = PaymentLinkUseCase::new(
        Arc::new(invoice_repository),
        Arc::new(gateway_client),
        config,
    );

    Router::new()
        .route("/:invoice_id/redirect-link", post(build_redirect_link))
        .route("/:invoice_id/form", post(build_payment_form))
        .route("/:invoice_id/embedded", post(build_embedded_payload))
        .route("/:invoice_id/invoice-api", post(create_via_invoice_api))
        .with_state(Arc::new(payment_link_usecase))
}

fn error_response(err: PaymentLinkError) -> axum::response::Response {
    (err.status_code(), Json(json!({ "error": err.to_string() }))).into_response()
}

pub async fn build_redirect_link<I, G>(
    State(payment_link_usecase): State<Arc<PaymentLinkUseCase<I, G>>>,
    Path(invoice_id): Path<Uuid>,
) -> impl IntoResponse
where
    I: InvoiceRepository + Send + Sync + 'static,
    G: GatewayApi + 'static,
{
    match payment_link_usecase.build_redirect_link(invoice_id).await {
        Ok(artifact) => Json(artifact).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn build_payment_form<I, G>(
    State(payment_link_usecase): State<Arc<PaymentLinkUseCase<I, G>>>,
    Path(invoice_id): Path<Uuid>,
) -> impl IntoResponse
where
    I: InvoiceRepository + Send + Sync + 'static,
    G: GatewayApi + 'static,
{
    match payment_link_usecase.build_payment_form(invoice_id).await {
        Ok(artifact) => Json(artifact).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn build_embedded_payload<I, G>(
    State(payment_link_usecase): State<Arc<PaymentLinkUseCase<I, G>>>,
    Path(invoice_id): Path<Uuid>,
) -> impl IntoResponse
where
    I: InvoiceRepository + Send + Sync + 'static,
    G: GatewayApi + 'static,
{
    match payment_link_usecase.build_embedded_payload(invoice_id).await {
        Ok(artifact) => Json(artifact).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn create_via_invoice_api<I, G>(
    State(payment_link_usecase): State<Arc<PaymentLinkUseCase<I, G>>>,
    Path(invoice_id): Path<Uuid>,
) -> impl IntoResponse
where
    I: InvoiceRepository + Send + Sync + 'static,
    G: GatewayApi + 'static,
{
    match payment_link_usecase.create_via_invoice_api(invoice_id).await {
        Ok(artifact) => Json(artifact).into_response(),
        Err(err) => error_response(err),
    }
}
