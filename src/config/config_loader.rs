use anyhow::{Ok, Result};

use super::config_model::{Database, DotEnvyConfig, GatewayConfig, Server};
use crate::payments::signature::SignatureAlg;

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let server = Server {
        port: std::env::var("SERVER_PORT")
            .expect("SERVER_PORT is invalid")
            .parse()?,
        body_limit: std::env::var("SERVER_BODY_LIMIT")
            .expect("SERVER_BODY_LIMIT is invalid")
            .parse()?,
        timeout: std::env::var("SERVER_TIMEOUT")
            .expect("SERVER_TIMEOUT is invalid")
            .parse()?,
    };

    let database = Database {
        url: std::env::var("DATABASE_URL").expect("DATABASE_URL is invalid"),
    };

    let gateway = GatewayConfig {
        merchant_login: std::env::var("GATEWAY_MERCHANT_LOGIN")
            .expect("GATEWAY_MERCHANT_LOGIN is invalid"),
        payment_secret: std::env::var("GATEWAY_PAYMENT_SECRET")
            .expect("GATEWAY_PAYMENT_SECRET is invalid"),
        result_secret: std::env::var("GATEWAY_RESULT_SECRET")
            .expect("GATEWAY_RESULT_SECRET is invalid"),
        signature_alg: std::env::var("GATEWAY_SIGNATURE_ALG")
            .unwrap_or_else(|_| "md5".to_string())
            .parse::<SignatureAlg>()?,
        payment_url: std::env::var("GATEWAY_PAYMENT_URL").expect("GATEWAY_PAYMENT_URL is invalid"),
        status_url: std::env::var("GATEWAY_STATUS_URL").expect("GATEWAY_STATUS_URL is invalid"),
        invoice_api_url: std::env::var("GATEWAY_INVOICE_API_URL")
            .expect("GATEWAY_INVOICE_API_URL is invalid"),
        refund_url: std::env::var("GATEWAY_REFUND_URL").expect("GATEWAY_REFUND_URL is invalid"),
        receipt_url: std::env::var("GATEWAY_RECEIPT_URL").expect("GATEWAY_RECEIPT_URL is invalid"),
        success_redirect_url: std::env::var("PAYMENT_SUCCESS_REDIRECT_URL")
            .expect("PAYMENT_SUCCESS_REDIRECT_URL is invalid"),
        fail_redirect_url: std::env::var("PAYMENT_FAIL_REDIRECT_URL")
            .expect("PAYMENT_FAIL_REDIRECT_URL is invalid"),
        culture: std::env::var("GATEWAY_CULTURE").unwrap_or_else(|_| "ru".to_string()),
        request_timeout_secs: std::env::var("GATEWAY_REQUEST_TIMEOUT")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?,
        taxation_system: std::env::var("GATEWAY_TAXATION_SYSTEM")
            .unwrap_or_else(|_| "usn_income".to_string()),
    };

    Ok(DotEnvyConfig {
        server,
        database,
        gateway,
    })
}
