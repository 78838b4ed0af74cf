use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::config::config_model::GatewayConfig;
use crate::domain::value_objects::amounts::format_amount;
use crate::payments::receipt::FiscalReceipt;
use crate::payments::signature;

/// Transport failures (timeout, connect, 5xx) are retryable; the gateway
/// saying "no" (4xx, non-zero result code, success=false) is terminal.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Parsed operation-status response. `op_key` is the opaque token that
/// authorizes a refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationState {
    pub state_code: i32,
    pub op_key: String,
    pub out_sum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundSubmission {
    pub request_id: String,
}

#[derive(Debug, Clone)]
pub struct TokenInvoiceRequest {
    pub inv_id: i32,
    pub out_sum: String,
    pub description: String,
    pub receipt: FiscalReceipt,
}

/// Outbound calls to the payment gateway's structured APIs. Mocked in
/// use-case tests; `GatewayClient` is the production implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GatewayApi: Send + Sync {
    /// Signed GET against the XML status endpoint. A non-zero result
    /// code is a hard failure, not a retry candidate.
    async fn fetch_operation_state(&self, gateway_invoice_id: i32)
    -> GatewayResult<OperationState>;

    async fn submit_refund(
        &self,
        op_key: String,
        refund_minor: i64,
        items: Option<FiscalReceipt>,
    ) -> GatewayResult<RefundSubmission>;

    /// Token-based invoice creation; returns the ready payment URL.
    async fn create_invoice(&self, request: TokenInvoiceRequest) -> GatewayResult<String>;

    /// Second fiscal receipt after a confirmed payment. Best-effort on
    /// the caller's side.
    async fn register_second_receipt(
        &self,
        gateway_invoice_id: i32,
        receipt: FiscalReceipt,
    ) -> GatewayResult<()>;
}

pub struct GatewayClient {
    http: reqwest::Client,
    config: GatewayConfig,
}

#[derive(Debug, Deserialize)]
struct OperationStateResponse {
    #[serde(rename = "Result")]
    result: ResultNode,
    #[serde(rename = "State")]
    state: Option<StateNode>,
    #[serde(rename = "Info")]
    info: Option<InfoNode>,
}

#[derive(Debug, Deserialize)]
struct ResultNode {
    #[serde(rename = "Code")]
    code: i32,
    #[serde(rename = "Description")]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StateNode {
    #[serde(rename = "Code")]
    code: i32,
}

#[derive(Debug, Deserialize)]
struct InfoNode {
    #[serde(rename = "OpKey")]
    op_key: Option<String>,
    #[serde(rename = "OutSum")]
    out_sum: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenApiResponse {
    success: bool,
    url: Option<String>,
    request_id: Option<String>,
    error_message: Option<String>,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("failed to build http client");
        Self { http, config }
    }

    fn transport_error(err: reqwest::Error, context: &str) -> GatewayError {
        error!(error = %err, context, "gateway request transport failure");
        GatewayError::Unavailable(format!("{context}: {err}"))
    }

    async fn ensure_success(
        resp: reqwest::Response,
        context: &str,
    ) -> GatewayResult<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        error!(
            status = %status,
            response_body = %body,
            context,
            "gateway api request failed"
        );

        if status.is_server_error() {
            Err(GatewayError::Unavailable(format!(
                "{context}: status {status}"
            )))
        } else {
            Err(GatewayError::Rejected(format!(
                "{context}: status {status}: {body}"
            )))
        }
    }

    fn signed_token(&self, payload: &serde_json::Value) -> String {
        signature::build_signed_token(
            payload,
            &self.config.merchant_login,
            &self.config.payment_secret,
            self.config.signature_alg,
        )
    }

    async fn post_token_api(
        &self,
        url: &str,
        payload: serde_json::Value,
        context: &str,
    ) -> GatewayResult<TokenApiResponse> {
        let token = self.signed_token(&payload);

        let resp = self
            .http
            .post(url)
            .json(&json!({ "token": token }))
            .send()
            .await
            .map_err(|err| Self::transport_error(err, context))?;
        let resp = Self::ensure_success(resp, context).await?;

        let parsed: TokenApiResponse = resp
            .json()
            .await
            .map_err(|err| Self::transport_error(err, context))?;

        if !parsed.success {
            let reason = parsed
                .error_message
                .unwrap_or_else(|| "no error message".to_string());
            return Err(GatewayError::Rejected(format!("{context}: {reason}")));
        }

        Ok(parsed)
    }
}

#[async_trait]
impl GatewayApi for GatewayClient {
    async fn fetch_operation_state(
        &self,
        gateway_invoice_id: i32,
    ) -> GatewayResult<OperationState> {
        let context = "fetch operation state";
        let sig = signature::status_request_signature(
            &self.config.merchant_login,
            gateway_invoice_id,
            &self.config.result_secret,
            self.config.signature_alg,
        );

        let resp = self
            .http
            .get(&self.config.status_url)
            .query(&[
                ("MerchantLogin", self.config.merchant_login.as_str()),
                ("InvoiceID", &gateway_invoice_id.to_string()),
                ("Signature", &sig),
            ])
            .send()
            .await
            .map_err(|err| Self::transport_error(err, context))?;
        let resp = Self::ensure_success(resp, context).await?;

        let body = resp
            .text()
            .await
            .map_err(|err| Self::transport_error(err, context))?;
        let parsed: OperationStateResponse = quick_xml::de::from_str(&body)
            .map_err(|err| GatewayError::Rejected(format!("{context}: malformed xml: {err}")))?;

        if parsed.result.code != 0 {
            let description = parsed
                .result
                .description
                .unwrap_or_else(|| "no description".to_string());
            return Err(GatewayError::Rejected(format!(
                "{context}: result code {}: {}",
                parsed.result.code, description
            )));
        }

        let op_key = parsed
            .info
            .as_ref()
            .and_then(|info| info.op_key.clone())
            .ok_or_else(|| {
                GatewayError::Rejected(format!("{context}: response is missing OpKey"))
            })?;

        Ok(OperationState {
            state_code: parsed.state.map(|state| state.code).unwrap_or_default(),
            op_key,
            out_sum: parsed.info.and_then(|info| info.out_sum),
        })
    }

    async fn submit_refund(
        &self,
        op_key: String,
        refund_minor: i64,
        items: Option<FiscalReceipt>,
    ) -> GatewayResult<RefundSubmission> {
        let context = "submit refund";
        let mut payload = json!({
            "MerchantLogin": self.config.merchant_login,
            "OpKey": op_key,
            "RefundSum": format_amount(refund_minor),
        });
        if let Some(items) = items {
            payload["InvoiceItems"] = serde_json::to_value(items.items)
                .map_err(|err| GatewayError::Rejected(format!("{context}: {err}")))?;
        }

        let parsed = self
            .post_token_api(&self.config.refund_url, payload, context)
            .await?;
        let request_id = parsed.request_id.ok_or_else(|| {
            GatewayError::Rejected(format!("{context}: response is missing requestId"))
        })?;

        Ok(RefundSubmission { request_id })
    }

    async fn create_invoice(&self, request: TokenInvoiceRequest) -> GatewayResult<String> {
        let context = "create invoice";
        let payload = json!({
            "MerchantLogin": self.config.merchant_login,
            "InvId": request.inv_id,
            "OutSum": request.out_sum,
            "Description": request.description,
            "Receipt": serde_json::to_value(&request.receipt)
                .map_err(|err| GatewayError::Rejected(format!("{context}: {err}")))?,
        });

        let parsed = self
            .post_token_api(&self.config.invoice_api_url, payload, context)
            .await?;
        parsed.url.ok_or_else(|| {
            GatewayError::Rejected(format!("{context}: response is missing payment url"))
        })
    }

    async fn register_second_receipt(
        &self,
        gateway_invoice_id: i32,
        receipt: FiscalReceipt,
    ) -> GatewayResult<()> {
        let context = "register second receipt";
        let payload = json!({
            "MerchantLogin": self.config.merchant_login,
            "InvId": gateway_invoice_id,
            "Receipt": serde_json::to_value(&receipt)
                .map_err(|err| GatewayError::Rejected(format!("{context}: {err}")))?,
        });

        self.post_token_api(&self.config.receipt_url, payload, context)
            .await?;
        Ok(())
    }
}
