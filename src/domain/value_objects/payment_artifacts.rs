use serde::Serialize;

/// One field of an outbound payment request, in transmission order.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

/// Ready-to-follow hosted payment URL.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentLinkArtifact {
    pub gateway_invoice_id: i32,
    pub url: String,
}

/// Server-rendered POST form: same fields as the link, for templates
/// that render their own button.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentFormArtifact {
    pub gateway_invoice_id: i32,
    pub action_url: String,
    pub method: String,
    pub fields: Vec<FormField>,
}

/// The same fields shaped for an inline (same-tab) payment surface.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddedPaymentArtifact {
    pub gateway_invoice_id: i32,
    pub fields: Vec<FormField>,
}
