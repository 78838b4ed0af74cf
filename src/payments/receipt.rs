use serde::Serialize;
use serde_json::Number;

/// Fiscal receipt in the gateway-mandated shape: one line item, quantity
/// 1, full prepayment, "service" payment object, no-VAT tax code for the
/// educational-service category. The shape is data, not logic; the exact
/// serialization matters because the encoded string is what gets signed.

pub const PAYMENT_METHOD_FULL_PREPAYMENT: &str = "full_prepayment";
pub const PAYMENT_OBJECT_SERVICE: &str = "service";
pub const TAX_NONE: &str = "none";

#[derive(Debug, Clone, Serialize)]
pub struct FiscalReceipt {
    pub sno: String,
    pub items: Vec<ReceiptItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptItem {
    pub name: String,
    pub quantity: u32,
    pub sum: Number,
    pub cost: Number,
    pub payment_method: String,
    pub payment_object: String,
    pub tax: String,
}

/// Minor units to a JSON number: whole amounts stay integers, fractional
/// ones get at most two decimals. Both sides serialize identically as
/// long as the same string is reused for signing and transmission.
fn amount_number(minor: i64) -> Number {
    if minor % 100 == 0 {
        Number::from(minor / 100)
    } else {
        Number::from_f64(minor as f64 / 100.0).unwrap_or_else(|| Number::from(0))
    }
}

impl FiscalReceipt {
    /// The single-item receipt every workshop seat produces. The
    /// description is copied verbatim from the invoice.
    pub fn single_service(description: &str, amount_minor: i64, taxation_system: &str) -> Self {
        let amount = amount_number(amount_minor);
        Self {
            sno: taxation_system.to_string(),
            items: vec![ReceiptItem {
                name: description.to_string(),
                quantity: 1,
                sum: amount.clone(),
                cost: amount,
                payment_method: PAYMENT_METHOD_FULL_PREPAYMENT.to_string(),
                payment_object: PAYMENT_OBJECT_SERVICE.to_string(),
                tax: TAX_NONE.to_string(),
            }],
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("receipt serialization is infallible")
    }

    /// The URL-encoded form that is both transmitted and signed. Signing
    /// anything other than these exact bytes breaks verification on the
    /// gateway side.
    pub fn to_encoded(&self) -> String {
        urlencoding::encode(&self.to_json()).into_owned()
    }
}
