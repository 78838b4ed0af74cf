use crate::payments::signature::SignatureAlg;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub server: Server,
    pub database: Database,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone)]
pub struct Server {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

/// Everything needed to talk to the payment gateway. Built once by the
/// config loader and passed into component constructors; no component
/// reads the process environment on its own.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub merchant_login: String,
    /// Secret for outbound request signatures, the user-redirect
    /// ("success") verification and the token APIs.
    pub payment_secret: String,
    /// Secret for the server-to-server ("result") callback verification
    /// and the operation-status query. Distinct from `payment_secret`.
    pub result_secret: String,
    pub signature_alg: SignatureAlg,
    /// Base URL of the hosted payment page (redirect link / POST form).
    pub payment_url: String,
    /// XML operation-status endpoint.
    pub status_url: String,
    /// Structured token-based invoice creation endpoint.
    pub invoice_api_url: String,
    /// Signed-token refund endpoint.
    pub refund_url: String,
    /// Second fiscal receipt registration endpoint.
    pub receipt_url: String,
    /// Where the user lands after a success / fail redirect.
    pub success_redirect_url: String,
    pub fail_redirect_url: String,
    pub culture: String,
    pub request_timeout_secs: u64,
    /// Fixed taxation-system code stamped into every fiscal receipt.
    pub taxation_system: String,
}
