use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use tracing::warn;

use crate::{
    application::usercases::gateway_webhook::{
        GatewayWebhookUseCase, PaymentEventSink, WebhookAck,
    },
    config::config_model::GatewayConfig,
    domain::{
        repositories::{invoices::InvoiceRepository, retry_ledger::RetryLedgerRepository},
        value_objects::gateway_notifications::RawNotification,
    },
    infrastructure::{
        events::TracingEventSink,
        postgres::{
            postgres_connection::PgPoolSquad,
            repositories::{invoices::InvoicePostgres, retry_ledger::RetryLedgerPostgres},
        },
    },
    payments::gateway_client::{GatewayApi, GatewayClient},
};

pub fn routes(db_pool: Arc<PgPoolSquad>, config: GatewayConfig) -> Router {
    let invoice_repository = InvoicePostgres::new(Arc::clone(&db_pool));
    let retry_ledger_repository = RetryLedgerPostgres::new(Arc::clone(&db_pool));
    let gateway_client = GatewayClient::new(config.clone());
    let gateway_webhook_usecase = GatewayWebhookUseCase::new(
        Arc::new(invoice_repository),
        Arc::new(retry_ledger_repository),
        Arc::new(gateway_client),
        Arc::new(TracingEventSink),
        config,
    );

    Router::new()
        .route("/result", post(handle_result))
        .route("/success", get(handle_success))
        .route("/fail", get(handle_fail))
        .with_state(Arc::new(gateway_webhook_usecase))
}

/// The gateway posts the classic callback as form-urlencoded and the
/// token variant as JSON; both land in the same flat field map.
fn parse_notification(headers: &HeaderMap, body: &[u8]) -> RawNotification {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if content_type.contains("json") {
        match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(serde_json::Value::Object(object)) => {
                let fields = object
                    .into_iter()
                    .map(|(key, value)| {
                        let text = match value {
                            serde_json::Value::String(text) => text,
                            other => other.to_string(),
                        };
                        (key, text)
                    })
                    .collect();
                return RawNotification::from_fields(fields);
            }
            Ok(_) | Err(_) => {
                warn!("gateway_webhook: json notification body is not an object");
                return RawNotification::default();
            }
        }
    }

    let fields = url::form_urlencoded::parse(body)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    RawNotification::from_fields(fields)
}

pub async fn handle_result<I, L, G, E>(
    State(gateway_webhook_usecase): State<Arc<GatewayWebhookUseCase<I, L, G, E>>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse
where
    I: InvoiceRepository + Send + Sync + 'static,
    L: RetryLedgerRepository + Send + Sync + 'static,
    G: GatewayApi + 'static,
    E: PaymentEventSink + 'static,
{
    let raw = parse_notification(&headers, &body);
    let ack = gateway_webhook_usecase.handle_notification(raw).await;

    // Business rejections still answer 200: the gateway only retries on
    // transport-level failure and these deliveries must not be retried.
    let status = match ack {
        WebhookAck::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    (status, ack.body())
}

pub async fn handle_success<I, L, G, E>(
    State(gateway_webhook_usecase): State<Arc<GatewayWebhookUseCase<I, L, G, E>>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> impl IntoResponse
where
    I: InvoiceRepository + Send + Sync + 'static,
    L: RetryLedgerRepository + Send + Sync + 'static,
    G: GatewayApi + 'static,
    E: PaymentEventSink + 'static,
{
    let raw = RawNotification::from_fields(params);
    match gateway_webhook_usecase.handle_success_return(&raw) {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(reason) => (StatusCode::BAD_REQUEST, reason).into_response(),
    }
}

pub async fn handle_fail<I, L, G, E>(
    State(gateway_webhook_usecase): State<Arc<GatewayWebhookUseCase<I, L, G, E>>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> impl IntoResponse
where
    I: InvoiceRepository + Send + Sync + 'static,
    L: RetryLedgerRepository + Send + Sync + 'static,
    G: GatewayApi + 'static,
    E: PaymentEventSink + 'static,
{
    let raw = RawNotification::from_fields(params);
    let url = gateway_webhook_usecase.handle_fail_return(&raw);
    Redirect::to(&url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_urlencoded_body_parses_into_the_field_map() {
        let headers = HeaderMap::new();
        let body = b"OutSum=1000.00&InvId=42&SignatureValue=abc&Shp_invoice=xyz";
        let raw = parse_notification(&headers, body);
        assert_eq!(raw.get("OutSum"), Some("1000.00"));
        assert_eq!(raw.get("InvId"), Some("42"));
        assert_eq!(raw.custom_fields().len(), 1);
    }

    #[test]
    fn json_body_stringifies_non_string_values() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            "application/json".parse().unwrap(),
        );
        let body = br#"{"token":"a.b.c","attempt":3}"#;
        let raw = parse_notification(&headers, body);
        assert_eq!(raw.get("token"), Some("a.b.c"));
        assert_eq!(raw.get("attempt"), Some("3"));
    }

    #[test]
    fn malformed_json_yields_an_empty_map() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            "application/json".parse().unwrap(),
        );
        let raw = parse_notification(&headers, b"[1,2,3]");
        assert!(raw.fields.is_empty());
    }
}
