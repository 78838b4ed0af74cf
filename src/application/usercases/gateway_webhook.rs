use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::config_model::GatewayConfig;
use crate::domain::entities::invoices::InvoiceEntity;
use crate::domain::entities::retry_ledger::NewRetryLedgerEntity;
use crate::domain::repositories::invoices::InvoiceRepository;
use crate::domain::repositories::retry_ledger::RetryLedgerRepository;
use crate::domain::value_objects::amounts::parse_amount_minor;
use crate::domain::value_objects::events::PaymentEvent;
use crate::domain::value_objects::gateway_notifications::{
    ConfirmationFields, FIELD_INV_ID, FIELD_OUT_SUM, FIELD_SIGNATURE, NotificationKind,
    RawNotification,
};
use crate::domain::value_objects::invoice_transitions::PaymentOutcome;
use crate::domain::value_objects::invoices::PaymentConfirmationModel;
use crate::payments::gateway_client::GatewayApi;
use crate::payments::receipt::FiscalReceipt;
use crate::payments::signature;

/// Seam to the real-time fan-out layer. Publishing is best-effort; a
/// failure is logged and recorded, never propagated.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentEventSink: Send + Sync {
    async fn publish(&self, event: PaymentEvent) -> AnyResult<()>;
}

/// What goes back to the gateway. The confirmation path always answers
/// HTTP 200 with a body: the literal `OK<InvId>` on acceptance (the
/// gateway matches it byte for byte) or a short diagnostic on a business
/// rejection, so the gateway only retries on transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAck {
    Accepted(i32),
    Rejected(&'static str),
    /// Our side failed (storage and the like); the gateway should retry.
    ServerError,
}

impl WebhookAck {
    pub fn body(&self) -> String {
        match self {
            WebhookAck::Accepted(inv_id) => format!("OK{inv_id}"),
            WebhookAck::Rejected(reason) => (*reason).to_string(),
            WebhookAck::ServerError => "processing failure".to_string(),
        }
    }
}

/// Payload of the signed-token confirmation variant.
#[derive(Debug, Deserialize)]
struct TokenNotificationPayload {
    state: String,
    #[serde(rename = "invId")]
    inv_id: i32,
    #[serde(rename = "opKey")]
    op_key: Option<String>,
    #[serde(rename = "paymentMethod")]
    payment_method: Option<String>,
    #[serde(rename = "incSum")]
    inc_sum: serde_json::Value,
}

impl TokenNotificationPayload {
    fn inc_sum_text(&self) -> String {
        match &self.inc_sum {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

pub struct GatewayWebhookUseCase<I, L, G, E>
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

impl<I, L, G, E> GatewayWebhookUseCase<I, L, G, E>
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

    /// Server-to-server notification endpoint: classifies the body once
    /// and dispatches on the closed kind set.
    pub async fn handle_notification(&self, raw: RawNotification) -> WebhookAck {
        match NotificationKind::classify(&raw) {
            NotificationKind::Confirmation(fields) => self.handle_confirmation(fields).await,
            NotificationKind::SignedToken(token) => self.handle_token_notification(&token).await,
            NotificationKind::Unknown => {
                warn!(
                    field_count = raw.fields.len(),
                    "gateway_webhook: unrecognized notification shape"
                );
                WebhookAck::Rejected("unrecognized notification")
            }
        }
    }

    async fn handle_confirmation(&self, fields: ConfirmationFields) -> WebhookAck {
        let inv_id = fields.inv_id;
        info!(
            gateway_invoice_id = inv_id,
            out_sum = %fields.out_sum,
            "gateway_webhook: payment confirmation received"
        );

        let authentic = signature::verify_result_signature(
            &fields.out_sum,
            inv_id,
            &fields.custom_fields,
            &fields.signature,
            &self.config.result_secret,
            self.config.signature_alg,
        );
        if !authentic {
            warn!(
                gateway_invoice_id = inv_id,
                "gateway_webhook: confirmation signature mismatch"
            );
            return WebhookAck::Rejected("bad sign");
        }

        let Some(confirmed_minor) = parse_amount_minor(&fields.out_sum) else {
            warn!(
                gateway_invoice_id = inv_id,
                out_sum = %fields.out_sum,
                "gateway_webhook: unparseable confirmed amount"
            );
            return WebhookAck::Rejected("bad amount");
        };

        let operation_id = fields
            .payment_reference
            .clone()
            .unwrap_or_else(|| inv_id.to_string());

        self.apply_confirmed_payment(
            inv_id,
            confirmed_minor,
            fields.payment_method.clone(),
            fields.payment_reference.clone(),
            &operation_id,
            None,
        )
        .await
    }

    /// Signed-token variant. Decode-only: the token is signed with a
    /// certificate this system does not hold, so the payload is treated
    /// as lower-trust input — it joins the same idempotent transition as
    /// the server-to-server path and cannot re-fire effects on an
    /// invoice that path already settled.
    async fn handle_token_notification(&self, token: &str) -> WebhookAck {
        let decoded = match signature::decode_signed_token(token) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(error = %err, "gateway_webhook: malformed token notification");
                return WebhookAck::Rejected("malformed token");
            }
        };

        let payload: TokenNotificationPayload = match serde_json::from_value(decoded.payload) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "gateway_webhook: token payload has unexpected shape");
                return WebhookAck::Rejected("malformed token");
            }
        };

        let inv_id = payload.inv_id;
        if payload.state != "OK" {
            info!(
                gateway_invoice_id = inv_id,
                state = %payload.state,
                "gateway_webhook: token notification with non-final state, acknowledged"
            );
            return WebhookAck::Accepted(inv_id);
        }

        let Some(confirmed_minor) = parse_amount_minor(&payload.inc_sum_text()) else {
            warn!(
                gateway_invoice_id = inv_id,
                "gateway_webhook: unparseable amount in token payload"
            );
            return WebhookAck::Rejected("bad amount");
        };

        let operation_id = payload
            .op_key
            .clone()
            .unwrap_or_else(|| inv_id.to_string());

        self.apply_confirmed_payment(
            inv_id,
            confirmed_minor,
            payload.payment_method.clone(),
            payload.op_key.clone(),
            &operation_id,
            payload.op_key.clone(),
        )
        .await
    }

    /// Shared effect path for both confirmation variants. The invoice is
    /// joined by gateway invoice id, the transition runs under a row
    /// lock, and a redelivery lands in `AlreadyTerminal` and is
    /// acknowledged with no side effects.
    async fn apply_confirmed_payment(
        &self,
        gateway_invoice_id: i32,
        confirmed_minor: i64,
        payment_method: Option<String>,
        payment_reference: Option<String>,
        operation_id: &str,
        op_key_hint: Option<String>,
    ) -> WebhookAck {
        let invoice = match self
            .invoice_repo
            .find_by_gateway_invoice_id(gateway_invoice_id)
            .await
        {
            Ok(Some(invoice)) => invoice,
            Ok(None) => {
                warn!(
                    gateway_invoice_id,
                    "gateway_webhook: no invoice for confirmation"
                );
                return WebhookAck::Rejected("unknown invoice");
            }
            Err(err) => {
                error!(
                    gateway_invoice_id,
                    db_error = ?err,
                    "gateway_webhook: invoice lookup failed"
                );
                return WebhookAck::ServerError;
            }
        };

        let confirmation = PaymentConfirmationModel {
            confirmed_minor,
            payment_method,
            payment_reference: payment_reference.clone(),
            paid_at: Utc::now(),
        };

        let outcome = match self
            .invoice_repo
            .mark_paid(gateway_invoice_id, confirmation)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    gateway_invoice_id,
                    db_error = ?err,
                    "gateway_webhook: mark_paid transaction failed"
                );
                return WebhookAck::ServerError;
            }
        };

        match outcome {
            PaymentOutcome::Transitioned => {
                info!(
                    gateway_invoice_id,
                    invoice_id = %invoice.id,
                    "gateway_webhook: invoice marked paid"
                );
                self.run_post_payment_effects(&invoice, gateway_invoice_id, operation_id, op_key_hint)
                    .await;
                WebhookAck::Accepted(gateway_invoice_id)
            }
            PaymentOutcome::AlreadyTerminal(status) => {
                info!(
                    gateway_invoice_id,
                    invoice_id = %invoice.id,
                    status = %status,
                    "gateway_webhook: redelivered confirmation, acknowledged as no-op"
                );
                WebhookAck::Accepted(gateway_invoice_id)
            }
            PaymentOutcome::AmountMismatch {
                expected_minor,
                confirmed_minor,
            } => {
                warn!(
                    gateway_invoice_id,
                    invoice_id = %invoice.id,
                    expected_minor,
                    confirmed_minor,
                    "gateway_webhook: confirmed amount outside tolerance"
                );
                WebhookAck::Rejected("amount mismatch")
            }
        }
    }

    /// Best-effort effects after the paid transition committed: cache
    /// the refund operation token, publish the domain event and enqueue
    /// the second fiscal receipt. Each failure is logged and written to
    /// the retry ledger; none of them touches the acknowledgment.
    async fn run_post_payment_effects(
        &self,
        invoice: &InvoiceEntity,
        gateway_invoice_id: i32,
        operation_id: &str,
        op_key_hint: Option<String>,
    ) {
        if invoice.gateway_operation_token.is_none() {
            let token = match op_key_hint {
                Some(op_key) => Ok(op_key),
                None => self
                    .gateway
                    .fetch_operation_state(gateway_invoice_id)
                    .await
                    .map(|state| state.op_key),
            };

            match token {
                Ok(token) => {
                    if let Err(err) = self
                        .invoice_repo
                        .store_operation_token(invoice.id, token)
                        .await
                    {
                        self.record_failure(
                            operation_id,
                            &format!("failed to store operation token: {err}"),
                            invoice,
                        )
                        .await;
                    }
                }
                Err(err) => {
                    self.record_failure(
                        operation_id,
                        &format!("operation token fetch failed: {err}"),
                        invoice,
                    )
                    .await;
                }
            }
        }

        let event = PaymentEvent::InvoicePaid {
            invoice_id: invoice.id,
            gateway_invoice_id,
            amount_minor: invoice.amount_minor,
        };
        if let Err(err) = self.events.publish(event).await {
            self.record_failure(
                operation_id,
                &format!("payment event publish failed: {err}"),
                invoice,
            )
            .await;
        }

        let receipt = FiscalReceipt::single_service(
            &invoice.description,
            invoice.amount_minor,
            &self.config.taxation_system,
        );
        if let Err(err) = self
            .gateway
            .register_second_receipt(gateway_invoice_id, receipt)
            .await
        {
            self.record_failure(
                operation_id,
                &format!("second receipt registration failed: {err}"),
                invoice,
            )
            .await;
        }
    }

    async fn record_failure(&self, operation_id: &str, message: &str, invoice: &InvoiceEntity) {
        warn!(
            operation_id,
            invoice_id = %invoice.id,
            error = %message,
            "gateway_webhook: post-confirmation side effect failed"
        );

        let entry = NewRetryLedgerEntity {
            operation_id: operation_id.to_string(),
            error: message.to_string(),
            payment_reference: invoice.payment_reference.clone(),
            invoice_id: Some(invoice.id),
        };
        if let Err(err) = self.retry_ledger.record(entry).await {
            // The ledger itself failing must not delay the ack.
            warn!(
                operation_id,
                db_error = ?err,
                "gateway_webhook: failed to record retry ledger entry"
            );
        }
    }

    /// User-redirect success notification. Verified with the redirect
    /// secret; never mutates invoice state. Returns the URL to send the
    /// user to.
    pub fn handle_success_return(&self, raw: &RawNotification) -> Result<String, &'static str> {
        let out_sum = raw.get(FIELD_OUT_SUM).ok_or("missing OutSum")?;
        let inv_id: i32 = raw
            .get(FIELD_INV_ID)
            .and_then(|value| value.parse().ok())
            .ok_or("missing InvId")?;
        let provided = raw.get(FIELD_SIGNATURE).ok_or("missing SignatureValue")?;

        let authentic = signature::verify_success_signature(
            out_sum,
            inv_id,
            &raw.custom_fields(),
            provided,
            &self.config.payment_secret,
            self.config.signature_alg,
        );
        if !authentic {
            warn!(
                gateway_invoice_id = inv_id,
                "gateway_webhook: success redirect signature mismatch"
            );
            return Err("bad sign");
        }

        info!(gateway_invoice_id = inv_id, "gateway_webhook: success redirect verified");
        Ok(format!(
            "{}?InvId={}&OutSum={}",
            self.config.success_redirect_url,
            inv_id,
            urlencoding::encode(out_sum)
        ))
    }

    /// User-redirect failure notification: informational only, no
    /// signature and no state change.
    pub fn handle_fail_return(&self, raw: &RawNotification) -> String {
        let inv_id = raw.get(FIELD_INV_ID).unwrap_or("");
        let out_sum = raw.get(FIELD_OUT_SUM).unwrap_or("");
        info!(
            gateway_invoice_id = %inv_id,
            "gateway_webhook: fail redirect received"
        );
        format!(
            "{}?InvId={}&OutSum={}",
            self.config.fail_redirect_url,
            urlencoding::encode(inv_id),
            urlencoding::encode(out_sum)
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Duration;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::domain::repositories::invoices::MockInvoiceRepository;
    use crate::domain::repositories::retry_ledger::MockRetryLedgerRepository;
    use crate::domain::value_objects::enums::invoice_statuses::InvoiceStatus;
    use crate::payments::gateway_client::{GatewayError, MockGatewayApi, OperationState};
    use crate::payments::signature::SignatureAlg;

    const GATEWAY_INV_ID: i32 = 42;

    fn gateway_config() -> GatewayConfig {
        GatewayConfig {
            merchant_login: "workshop-merchant".to_string(),
            payment_secret: "payment-secret-one".to_string(),
            result_secret: "result-secret-two".to_string(),
            signature_alg: SignatureAlg::Md5,
            payment_url: "https://pay.example.com/index".to_string(),
            status_url: "https://pay.example.com/opstate".to_string(),
            invoice_api_url: "https://pay.example.com/create".to_string(),
            refund_url: "https://pay.example.com/refund".to_string(),
            receipt_url: "https://pay.example.com/receipt".to_string(),
            success_redirect_url: "https://workshops.example.com/paid".to_string(),
            fail_redirect_url: "https://workshops.example.com/failed".to_string(),
            culture: "ru".to_string(),
            request_timeout_secs: 10,
            taxation_system: "usn_income".to_string(),
        }
    }

    fn invoice(status: InvoiceStatus) -> InvoiceEntity {
        let now = Utc::now();
        InvoiceEntity {
            id: Uuid::new_v4(),
            description: "Pottery workshop seat".to_string(),
            customer_email: Some("guest@example.com".to_string()),
            workshop_at: now + Duration::days(7),
            amount_minor: 100_000,
            gateway_invoice_id: Some(GATEWAY_INV_ID),
            gateway_operation_token: None,
            status: status.as_str().to_string(),
            refund_status: "none".to_string(),
            payment_method: None,
            payment_reference: None,
            paid_at: None,
            refund_request_id: None,
            refund_reason: None,
            refund_contact_email: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn signed_confirmation(out_sum: &str) -> RawNotification {
        let custom = BTreeMap::from([("Shp_invoice".to_string(), "abc".to_string())]);
        let mut fields = BTreeMap::from([
            ("OutSum".to_string(), out_sum.to_string()),
            ("InvId".to_string(), GATEWAY_INV_ID.to_string()),
            ("Shp_invoice".to_string(), "abc".to_string()),
        ]);
        let signature_value = {
            // Mirror the verification base: OutSum:InvId:secret:values.
            let base = format!("{out_sum}:{GATEWAY_INV_ID}");
            let values: Vec<&str> = custom.values().map(String::as_str).collect();
            let full = format!("{base}:result-secret-two:{}", values.join(":"));
            use md5::{Digest, Md5};
            hex::encode(Md5::digest(full.as_bytes()))
        };
        fields.insert("SignatureValue".to_string(), signature_value);
        RawNotification::from_fields(fields)
    }

    fn usecase(
        invoice_repo: MockInvoiceRepository,
        retry_ledger: MockRetryLedgerRepository,
        gateway: MockGatewayApi,
        events: MockPaymentEventSink,
    ) -> GatewayWebhookUseCase<
        MockInvoiceRepository,
        MockRetryLedgerRepository,
        MockGatewayApi,
        MockPaymentEventSink,
    > {
        GatewayWebhookUseCase::new(
            Arc::new(invoice_repo),
            Arc::new(retry_ledger),
            Arc::new(gateway),
            Arc::new(events),
            gateway_config(),
        )
    }

    #[tokio::test]
    async fn confirmed_payment_transitions_and_fires_effects_once() {
        let mut invoice_repo = MockInvoiceRepository::new();
        let pending = invoice(InvoiceStatus::Pending);
        let found = pending.clone();
        invoice_repo
            .expect_find_by_gateway_invoice_id()
            .returning(move |_| Ok(Some(found.clone())));
        invoice_repo
            .expect_mark_paid()
            .times(1)
            .returning(|_, confirmation| {
                assert_eq!(confirmation.confirmed_minor, 100_000);
                Ok(PaymentOutcome::Transitioned)
            });
        invoice_repo
            .expect_store_operation_token()
            .times(1)
            .returning(|_, _| Ok(()));

        let mut gateway = MockGatewayApi::new();
        gateway
            .expect_fetch_operation_state()
            .times(1)
            .returning(|_| {
                Ok(OperationState {
                    state_code: 100,
                    op_key: "op-abc".to_string(),
                    out_sum: Some("1000.00".to_string()),
                })
            });
        gateway
            .expect_register_second_receipt()
            .times(1)
            .returning(|_, _| Ok(()));

        let mut events = MockPaymentEventSink::new();
        events.expect_publish().times(1).returning(|_| Ok(()));

        let usecase = usecase(
            invoice_repo,
            MockRetryLedgerRepository::new(),
            gateway,
            events,
        );

        let ack = usecase
            .handle_notification(signed_confirmation("1000.00"))
            .await;
        assert_eq!(ack, WebhookAck::Accepted(GATEWAY_INV_ID));
        assert_eq!(ack.body(), "OK42");
    }

    #[tokio::test]
    async fn amount_mismatch_is_rejected_without_effects() {
        let mut invoice_repo = MockInvoiceRepository::new();
        let pending = invoice(InvoiceStatus::Pending);
        let found = pending.clone();
        invoice_repo
            .expect_find_by_gateway_invoice_id()
            .returning(move |_| Ok(Some(found.clone())));
        invoice_repo.expect_mark_paid().times(1).returning(|_, _| {
            Ok(PaymentOutcome::AmountMismatch {
                expected_minor: 100_000,
                confirmed_minor: 99_950,
            })
        });
        invoice_repo.expect_store_operation_token().never();

        let mut gateway = MockGatewayApi::new();
        gateway.expect_fetch_operation_state().never();
        gateway.expect_register_second_receipt().never();

        let mut events = MockPaymentEventSink::new();
        events.expect_publish().never();

        let usecase = usecase(
            invoice_repo,
            MockRetryLedgerRepository::new(),
            gateway,
            events,
        );

        let ack = usecase
            .handle_notification(signed_confirmation("999.50"))
            .await;
        assert_eq!(ack, WebhookAck::Rejected("amount mismatch"));
    }

    #[tokio::test]
    async fn redelivered_confirmation_acks_without_side_effects() {
        let mut invoice_repo = MockInvoiceRepository::new();
        let paid = invoice(InvoiceStatus::Paid);
        let found = paid.clone();
        invoice_repo
            .expect_find_by_gateway_invoice_id()
            .returning(move |_| Ok(Some(found.clone())));
        invoice_repo
            .expect_mark_paid()
            .times(1)
            .returning(|_, _| Ok(PaymentOutcome::AlreadyTerminal(InvoiceStatus::Paid)));
        invoice_repo.expect_store_operation_token().never();

        let mut gateway = MockGatewayApi::new();
        gateway.expect_fetch_operation_state().never();
        gateway.expect_register_second_receipt().never();

        let mut events = MockPaymentEventSink::new();
        events.expect_publish().never();

        let usecase = usecase(
            invoice_repo,
            MockRetryLedgerRepository::new(),
            gateway,
            events,
        );

        let ack = usecase
            .handle_notification(signed_confirmation("1000.00"))
            .await;
        assert_eq!(ack, WebhookAck::Accepted(GATEWAY_INV_ID));
        assert_eq!(ack.body(), "OK42");
    }

    #[tokio::test]
    async fn tampered_signature_never_reaches_the_repository() {
        let mut invoice_repo = MockInvoiceRepository::new();
        invoice_repo.expect_find_by_gateway_invoice_id().never();
        invoice_repo.expect_mark_paid().never();

        let usecase = usecase(
            invoice_repo,
            MockRetryLedgerRepository::new(),
            MockGatewayApi::new(),
            MockPaymentEventSink::new(),
        );

        let mut raw = signed_confirmation("1000.00");
        raw.fields
            .insert("SignatureValue".to_string(), "0000".to_string());
        let ack = usecase.handle_notification(raw).await;
        assert_eq!(ack, WebhookAck::Rejected("bad sign"));
    }

    #[tokio::test]
    async fn unknown_invoice_is_acknowledged_with_diagnostic() {
        let mut invoice_repo = MockInvoiceRepository::new();
        invoice_repo
            .expect_find_by_gateway_invoice_id()
            .returning(|_| Ok(None));
        invoice_repo.expect_mark_paid().never();

        let usecase = usecase(
            invoice_repo,
            MockRetryLedgerRepository::new(),
            MockGatewayApi::new(),
            MockPaymentEventSink::new(),
        );

        let ack = usecase
            .handle_notification(signed_confirmation("1000.00"))
            .await;
        assert_eq!(ack, WebhookAck::Rejected("unknown invoice"));
    }

    #[tokio::test]
    async fn token_notification_uses_payload_op_key_without_status_fetch() {
        let token = signature::build_signed_token(
            &json!({
                "state": "OK",
                "invId": GATEWAY_INV_ID,
                "opKey": "op-from-token",
                "paymentMethod": "card",
                "incSum": "1000.00",
            }),
            "workshop-merchant",
            "payment-secret-one",
            SignatureAlg::Sha256,
        );

        let mut invoice_repo = MockInvoiceRepository::new();
        let pending = invoice(InvoiceStatus::Pending);
        let found = pending.clone();
        invoice_repo
            .expect_find_by_gateway_invoice_id()
            .returning(move |_| Ok(Some(found.clone())));
        invoice_repo
            .expect_mark_paid()
            .times(1)
            .returning(|_, _| Ok(PaymentOutcome::Transitioned));
        invoice_repo
            .expect_store_operation_token()
            .times(1)
            .withf(|_, token| token == "op-from-token")
            .returning(|_, _| Ok(()));

        let mut gateway = MockGatewayApi::new();
        gateway.expect_fetch_operation_state().never();
        gateway
            .expect_register_second_receipt()
            .times(1)
            .returning(|_, _| Ok(()));

        let mut events = MockPaymentEventSink::new();
        events.expect_publish().times(1).returning(|_| Ok(()));

        let usecase = usecase(
            invoice_repo,
            MockRetryLedgerRepository::new(),
            gateway,
            events,
        );

        let raw = RawNotification::from_fields(BTreeMap::from([(
            "token".to_string(),
            token,
        )]));
        let ack = usecase.handle_notification(raw).await;
        assert_eq!(ack, WebhookAck::Accepted(GATEWAY_INV_ID));
    }

    #[tokio::test]
    async fn token_notification_with_non_ok_state_changes_nothing() {
        let token = signature::build_signed_token(
            &json!({ "state": "FAILED", "invId": GATEWAY_INV_ID, "incSum": "1000.00" }),
            "workshop-merchant",
            "payment-secret-one",
            SignatureAlg::Sha256,
        );

        let mut invoice_repo = MockInvoiceRepository::new();
        invoice_repo.expect_find_by_gateway_invoice_id().never();
        invoice_repo.expect_mark_paid().never();

        let usecase = usecase(
            invoice_repo,
            MockRetryLedgerRepository::new(),
            MockGatewayApi::new(),
            MockPaymentEventSink::new(),
        );

        let raw = RawNotification::from_fields(BTreeMap::from([(
            "token".to_string(),
            token,
        )]));
        let ack = usecase.handle_notification(raw).await;
        assert_eq!(ack, WebhookAck::Accepted(GATEWAY_INV_ID));
    }

    #[tokio::test]
    async fn failed_side_effect_lands_in_the_retry_ledger() {
        let mut invoice_repo = MockInvoiceRepository::new();
        let pending = invoice(InvoiceStatus::Pending);
        let found = pending.clone();
        invoice_repo
            .expect_find_by_gateway_invoice_id()
            .returning(move |_| Ok(Some(found.clone())));
        invoice_repo
            .expect_mark_paid()
            .times(1)
            .returning(|_, _| Ok(PaymentOutcome::Transitioned));

        let mut gateway = MockGatewayApi::new();
        gateway
            .expect_fetch_operation_state()
            .times(1)
            .returning(|_| Err(GatewayError::Unavailable("timeout".to_string())));
        gateway
            .expect_register_second_receipt()
            .times(1)
            .returning(|_, _| Ok(()));

        let mut events = MockPaymentEventSink::new();
        events.expect_publish().times(1).returning(|_| Ok(()));

        let mut retry_ledger = MockRetryLedgerRepository::new();
        retry_ledger
            .expect_record()
            .times(1)
            .withf(|entry| entry.error.contains("operation token fetch failed"))
            .returning(|_| Ok(Uuid::new_v4()));

        let usecase = usecase(invoice_repo, retry_ledger, gateway, events);

        let ack = usecase
            .handle_notification(signed_confirmation("1000.00"))
            .await;
        // The ledger write never blocks the acknowledgment.
        assert_eq!(ack, WebhookAck::Accepted(GATEWAY_INV_ID));
    }

    #[tokio::test]
    async fn success_redirect_round_trips_and_rejects_bad_signature() {
        let usecase = usecase(
            MockInvoiceRepository::new(),
            MockRetryLedgerRepository::new(),
            MockGatewayApi::new(),
            MockPaymentEventSink::new(),
        );

        let signature_value = {
            use md5::{Digest, Md5};
            hex::encode(Md5::digest(
                format!("1000.00:{GATEWAY_INV_ID}:payment-secret-one").as_bytes(),
            ))
        };
        let raw = RawNotification::from_fields(BTreeMap::from([
            ("OutSum".to_string(), "1000.00".to_string()),
            ("InvId".to_string(), GATEWAY_INV_ID.to_string()),
            ("SignatureValue".to_string(), signature_value),
        ]));

        let url = usecase.handle_success_return(&raw).unwrap();
        assert!(url.starts_with("https://workshops.example.com/paid?InvId=42"));

        let mut tampered = raw.clone();
        tampered
            .fields
            .insert("SignatureValue".to_string(), "ffff".to_string());
        assert_eq!(usecase.handle_success_return(&tampered), Err("bad sign"));
    }

    #[tokio::test]
    async fn fail_redirect_is_informational() {
        let usecase = usecase(
            MockInvoiceRepository::new(),
            MockRetryLedgerRepository::new(),
            MockGatewayApi::new(),
            MockPaymentEventSink::new(),
        );

        let raw = RawNotification::from_fields(BTreeMap::from([
            ("OutSum".to_string(), "1000.00".to_string()),
            ("InvId".to_string(), "42".to_string()),
        ]));
        let url = usecase.handle_fail_return(&raw);
        assert_eq!(
            url,
            "https://workshops.example.com/failed?InvId=42&OutSum=1000.00"
        );
    }
}
