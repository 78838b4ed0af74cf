use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::config_model::GatewayConfig;
use crate::domain::entities::invoices::InvoiceEntity;
use crate::domain::repositories::invoices::InvoiceRepository;
use crate::domain::value_objects::amounts::format_amount;
use crate::domain::value_objects::enums::invoice_statuses::InvoiceStatus;
use crate::domain::value_objects::payment_artifacts::{
    EmbeddedPaymentArtifact, FormField, PaymentFormArtifact, PaymentLinkArtifact,
};
use crate::payments::gateway_client::{GatewayApi, GatewayError, TokenInvoiceRequest};
use crate::payments::receipt::FiscalReceipt;
use crate::payments::signature;

#[derive(Debug, Error)]
pub enum PaymentLinkError {
    #[error("invoice not found")]
    InvoiceNotFound,
    #[error("invoice is not payable: status is {0}")]
    InvoiceNotPayable(String),
    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("gateway rejected invoice creation: {0}")]
    GatewayRejected(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PaymentLinkError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            PaymentLinkError::InvoiceNotFound => StatusCode::NOT_FOUND,
            PaymentLinkError::InvoiceNotPayable(_) => StatusCode::CONFLICT,
            PaymentLinkError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            PaymentLinkError::GatewayRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PaymentLinkError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type PaymentLinkResult<T> = Result<T, PaymentLinkError>;

/// Derives the numeric id the gateway sees from the internal id plus an
/// hourly salt, so a retried creation attempt within the same invoice
/// does not collide with the previous one after the hour rolls over.
pub fn derive_gateway_invoice_id(invoice_id: Uuid, now: DateTime<Utc>) -> i32 {
    let bucket = now.timestamp() / 3600;
    let digest = Md5::digest(format!("{invoice_id}:{bucket}").as_bytes());
    let raw = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    let id = (raw & 0x7fff_ffff) as i32;
    if id == 0 { 1 } else { id }
}

pub struct PaymentLinkUseCase<I, G>
where
    I: InvoiceRepository + Send + Sync + 'static,
    G: GatewayApi + 'static,
{
    invoice_repo: Arc<I>,
    gateway: Arc<G>,
    config: GatewayConfig,
}

impl<I, G> PaymentLinkUseCase<I, G>
where
    I: InvoiceRepository + Send + Sync + 'static,
    G: GatewayApi + 'static,
{
    pub fn new(invoice_repo: Arc<I>, gateway: Arc<G>, config: GatewayConfig) -> Self {
        Self {
            invoice_repo,
            gateway,
            config,
        }
    }

    /// Loads a payable invoice and stamps a fresh gateway invoice id on
    /// it. The id is persisted before any artifact leaves this module;
    /// it is the join key for everything the gateway sends back.
    async fn prepare_invoice(&self, invoice_id: Uuid) -> PaymentLinkResult<(InvoiceEntity, i32)> {
        let invoice = self
            .invoice_repo
            .find_by_id(invoice_id)
            .await
            .map_err(|err| {
                error!(%invoice_id, db_error = ?err, "payment_links: failed to load invoice");
                PaymentLinkError::Internal(err)
            })?
            .ok_or(PaymentLinkError::InvoiceNotFound)?;

        if InvoiceStatus::from_str(&invoice.status) != Some(InvoiceStatus::Pending) {
            warn!(
                %invoice_id,
                status = %invoice.status,
                "payment_links: invoice is not payable"
            );
            return Err(PaymentLinkError::InvoiceNotPayable(invoice.status.clone()));
        }

        let gateway_invoice_id = derive_gateway_invoice_id(invoice_id, Utc::now());
        self.invoice_repo
            .assign_gateway_invoice_id(invoice_id, gateway_invoice_id)
            .await
            .map_err(|err| {
                error!(
                    %invoice_id,
                    gateway_invoice_id,
                    db_error = ?err,
                    "payment_links: failed to persist gateway invoice id"
                );
                PaymentLinkError::Internal(err)
            })?;

        info!(
            %invoice_id,
            gateway_invoice_id,
            "payment_links: gateway invoice id assigned"
        );
        Ok((invoice, gateway_invoice_id))
    }

    /// The fields every artifact shares, in transmission order. The
    /// `Receipt` value is the URL-encoded JSON and the signature is
    /// computed over that exact string — signing the raw JSON while
    /// sending the encoded form is the mismatch this layout prevents.
    fn payment_fields(&self, invoice: &InvoiceEntity, gateway_invoice_id: i32) -> Vec<FormField> {
        let out_sum = format_amount(invoice.amount_minor);
        let receipt = FiscalReceipt::single_service(
            &invoice.description,
            invoice.amount_minor,
            &self.config.taxation_system,
        );
        let encoded_receipt = receipt.to_encoded();

        let custom_fields: BTreeMap<String, String> =
            BTreeMap::from([("Shp_invoice".to_string(), invoice.id.to_string())]);

        let signature = signature::sign_payment_request(
            &self.config.merchant_login,
            &out_sum,
            gateway_invoice_id,
            Some(&encoded_receipt),
            &custom_fields,
            &self.config.payment_secret,
            self.config.signature_alg,
        );

        let mut fields = vec![
            FormField {
                name: "MerchantLogin".to_string(),
                value: self.config.merchant_login.clone(),
            },
            FormField {
                name: "OutSum".to_string(),
                value: out_sum,
            },
            FormField {
                name: "InvId".to_string(),
                value: gateway_invoice_id.to_string(),
            },
            FormField {
                name: "Description".to_string(),
                value: invoice.description.clone(),
            },
            FormField {
                name: "SignatureValue".to_string(),
                value: signature,
            },
            FormField {
                name: "Culture".to_string(),
                value: self.config.culture.clone(),
            },
            FormField {
                name: "Encoding".to_string(),
                value: "utf-8".to_string(),
            },
            FormField {
                name: "Receipt".to_string(),
                value: encoded_receipt,
            },
            // Not part of the signature base; the receipt's sno carries
            // the same code for the fiscal side.
            FormField {
                name: "TaxationSystem".to_string(),
                value: self.config.taxation_system.clone(),
            },
        ];
        for (name, value) in custom_fields {
            fields.push(FormField { name, value });
        }
        fields
    }

    pub async fn build_redirect_link(
        &self,
        invoice_id: Uuid,
    ) -> PaymentLinkResult<PaymentLinkArtifact> {
        let (invoice, gateway_invoice_id) = self.prepare_invoice(invoice_id).await?;
        let fields = self.payment_fields(&invoice, gateway_invoice_id);

        // Hand-assembled so each value is encoded exactly once on top of
        // what the field already carries.
        let query = fields
            .iter()
            .map(|field| format!("{}={}", field.name, urlencoding::encode(&field.value)))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!("{}?{}", self.config.payment_url, query);

        info!(%invoice_id, gateway_invoice_id, "payment_links: redirect link built");
        Ok(PaymentLinkArtifact {
            gateway_invoice_id,
            url,
        })
    }

    pub async fn build_payment_form(
        &self,
        invoice_id: Uuid,
    ) -> PaymentLinkResult<PaymentFormArtifact> {
        let (invoice, gateway_invoice_id) = self.prepare_invoice(invoice_id).await?;
        let fields = self.payment_fields(&invoice, gateway_invoice_id);

        info!(%invoice_id, gateway_invoice_id, "payment_links: payment form built");
        Ok(PaymentFormArtifact {
            gateway_invoice_id,
            action_url: self.config.payment_url.clone(),
            method: "POST".to_string(),
            fields,
        })
    }

    pub async fn build_embedded_payload(
        &self,
        invoice_id: Uuid,
    ) -> PaymentLinkResult<EmbeddedPaymentArtifact> {
        let (invoice, gateway_invoice_id) = self.prepare_invoice(invoice_id).await?;
        let fields = self.payment_fields(&invoice, gateway_invoice_id);

        info!(%invoice_id, gateway_invoice_id, "payment_links: embedded payload built");
        Ok(EmbeddedPaymentArtifact {
            gateway_invoice_id,
            fields,
        })
    }

    /// Creates the invoice through the gateway's structured API and
    /// returns the ready payment URL it responds with.
    pub async fn create_via_invoice_api(
        &self,
        invoice_id: Uuid,
    ) -> PaymentLinkResult<PaymentLinkArtifact> {
        let (invoice, gateway_invoice_id) = self.prepare_invoice(invoice_id).await?;

        let receipt = FiscalReceipt::single_service(
            &invoice.description,
            invoice.amount_minor,
            &self.config.taxation_system,
        );
        let request = TokenInvoiceRequest {
            inv_id: gateway_invoice_id,
            out_sum: format_amount(invoice.amount_minor),
            description: invoice.description.clone(),
            receipt,
        };

        let url = self
            .gateway
            .create_invoice(request)
            .await
            .map_err(|err| {
                error!(
                    %invoice_id,
                    gateway_invoice_id,
                    error = %err,
                    "payment_links: gateway invoice creation failed"
                );
                match err {
                    GatewayError::Unavailable(reason) => {
                        PaymentLinkError::GatewayUnavailable(reason)
                    }
                    GatewayError::Rejected(reason) => PaymentLinkError::GatewayRejected(reason),
                }
            })?;

        info!(%invoice_id, gateway_invoice_id, "payment_links: invoice created via token api");
        Ok(PaymentLinkArtifact {
            gateway_invoice_id,
            url,
        })
    }
}
