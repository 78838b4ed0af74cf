use std::collections::BTreeMap;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use ripemd::Ripemd160;
use serde_json::Value;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use thiserror::Error;

/// All integrity math for the gateway protocol lives here: request and
/// notification signatures plus the bespoke signed-token format. Pure
/// functions, no I/O, so every variant can be exercised in isolation
/// against the exact bytes that go over the wire.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlg {
    /// Historical default: a plain digest over the base string with the
    /// secret spliced in.
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Ripemd160,
}

impl SignatureAlg {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlg::Md5 => "md5",
            SignatureAlg::Sha1 => "sha1",
            SignatureAlg::Sha256 => "sha256",
            SignatureAlg::Sha384 => "sha384",
            SignatureAlg::Sha512 => "sha512",
            SignatureAlg::Ripemd160 => "ripemd160",
        }
    }

    /// Name stamped into the signed-token header.
    pub fn token_alg_name(&self) -> &'static str {
        match self {
            SignatureAlg::Md5 => "MD5",
            SignatureAlg::Sha1 => "SHA1",
            SignatureAlg::Sha256 => "SHA256",
            SignatureAlg::Sha384 => "SHA384",
            SignatureAlg::Sha512 => "SHA512",
            SignatureAlg::Ripemd160 => "RIPEMD160",
        }
    }
}

impl FromStr for SignatureAlg {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "md5" => Ok(SignatureAlg::Md5),
            "sha1" => Ok(SignatureAlg::Sha1),
            "sha256" => Ok(SignatureAlg::Sha256),
            "sha384" => Ok(SignatureAlg::Sha384),
            "sha512" => Ok(SignatureAlg::Sha512),
            "ripemd160" => Ok(SignatureAlg::Ripemd160),
            other => Err(anyhow::anyhow!("unsupported signature algorithm: {other}")),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed token: expected exactly three segments")]
    MalformedToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
    pub header: Value,
    pub payload: Value,
}

fn hmac_hex(alg: SignatureAlg, key: &[u8], message: &[u8]) -> String {
    fn run<M: Mac + hmac::digest::KeyInit>(key: &[u8], message: &[u8]) -> String {
        // An HMAC key of any length is accepted, so this cannot fail.
        let mut mac = <M as Mac>::new_from_slice(key).expect("hmac accepts any key length");
        mac.update(message);
        hex::encode(mac.finalize().into_bytes())
    }

    match alg {
        SignatureAlg::Md5 => run::<Hmac<Md5>>(key, message),
        SignatureAlg::Sha1 => run::<Hmac<Sha1>>(key, message),
        SignatureAlg::Sha256 => run::<Hmac<Sha256>>(key, message),
        SignatureAlg::Sha384 => run::<Hmac<Sha384>>(key, message),
        SignatureAlg::Sha512 => run::<Hmac<Sha512>>(key, message),
        SignatureAlg::Ripemd160 => run::<Hmac<Ripemd160>>(key, message),
    }
}

/// Applies the secret the way the selected algorithm expects: the MD5
/// variant splices `:secret` into the hashed string, the HMAC variants
/// key the MAC with it. `after_secret` carries the parts the protocol
/// places after the secret (each with its leading colon).
fn seal(alg: SignatureAlg, before_secret: &str, after_secret: &str, secret: &str) -> String {
    match alg {
        SignatureAlg::Md5 => {
            let full = format!("{before_secret}:{secret}{after_secret}");
            hex::encode(Md5::digest(full.as_bytes()))
        }
        _ => {
            let message = format!("{before_secret}{after_secret}");
            hmac_hex(alg, secret.as_bytes(), message.as_bytes())
        }
    }
}

/// Signature for an outbound payment request. The receipt argument must
/// be the URL-encoded string that is actually transmitted — signing the
/// raw JSON is the classic mismatch bug. Custom pass-through fields are
/// appended after the secret as `key=value`, sorted by key.
pub fn sign_payment_request(
    merchant_login: &str,
    out_sum: &str,
    inv_id: i32,
    encoded_receipt: Option<&str>,
    custom_fields: &BTreeMap<String, String>,
    secret: &str,
    alg: SignatureAlg,
) -> String {
    let mut before = format!("{merchant_login}:{out_sum}:{inv_id}");
    if let Some(receipt) = encoded_receipt {
        before.push(':');
        before.push_str(receipt);
    }

    let mut after = String::new();
    for (key, value) in custom_fields {
        after.push(':');
        after.push_str(key);
        after.push('=');
        after.push_str(value);
    }

    seal(alg, &before, &after, secret)
}

fn verify_inbound(
    out_sum: &str,
    inv_id: i32,
    custom_fields: &BTreeMap<String, String>,
    provided: &str,
    secret: &str,
    alg: SignatureAlg,
) -> bool {
    let before = format!("{out_sum}:{inv_id}");

    // Only the values participate, in key order; the keys never do.
    let mut after = String::new();
    for value in custom_fields.values() {
        after.push(':');
        after.push_str(value);
    }

    let expected = seal(alg, &before, &after, secret);
    expected.eq_ignore_ascii_case(provided)
}

/// Verifies a server-to-server confirmation callback. Takes the result
/// secret; the user-redirect path uses a different one and the two are
/// deliberately separate entry points.
pub fn verify_result_signature(
    out_sum: &str,
    inv_id: i32,
    custom_fields: &BTreeMap<String, String>,
    provided: &str,
    result_secret: &str,
    alg: SignatureAlg,
) -> bool {
    verify_inbound(out_sum, inv_id, custom_fields, provided, result_secret, alg)
}

/// Verifies a user-redirect ("success") notification with the payment
/// secret. Never mutates anything; a mismatch is just `false`.
pub fn verify_success_signature(
    out_sum: &str,
    inv_id: i32,
    custom_fields: &BTreeMap<String, String>,
    provided: &str,
    payment_secret: &str,
    alg: SignatureAlg,
) -> bool {
    verify_inbound(
        out_sum,
        inv_id,
        custom_fields,
        provided,
        payment_secret,
        alg,
    )
}

/// Signature for the operation-status query (`login:inv_id` + secret).
pub fn status_request_signature(
    merchant_login: &str,
    inv_id: i32,
    secret: &str,
    alg: SignatureAlg,
) -> String {
    seal(alg, &format!("{merchant_login}:{inv_id}"), "", secret)
}

fn token_signing_key(merchant_login: &str, secret: &str) -> String {
    // The token APIs key their MAC with base64(login:secret), not the
    // raw secret. This derivation is part of the protocol.
    STANDARD.encode(format!("{merchant_login}:{secret}"))
}

/// Builds the three-part `header.payload.signature` token used by the
/// token-based creation and refund APIs. Resembles a standard signed
/// token but the key derivation is the gateway's own.
pub fn build_signed_token(
    payload: &Value,
    merchant_login: &str,
    secret: &str,
    alg: SignatureAlg,
) -> String {
    let header = serde_json::json!({ "typ": "JWT", "alg": alg.token_alg_name() });

    let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string());
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload.to_string());
    let message = format!("{header_b64}.{payload_b64}");

    let key = token_signing_key(merchant_login, secret);
    let signature = hmac_hex(alg, key.as_bytes(), message.as_bytes());
    let signature_b64 = URL_SAFE_NO_PAD.encode(hex::decode(signature).expect("hex we produced"));

    format!("{message}.{signature_b64}")
}

/// Decodes a token without verifying it. The counterparty signs its
/// notifications with a certificate this system does not hold, so
/// decode-only is the accepted trust boundary; consumers treat the
/// payload as lower-trust input and lean on the idempotent state machine
/// to contain a forged message.
pub fn decode_signed_token(token: &str) -> Result<DecodedToken, SignatureError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(SignatureError::MalformedToken);
    }

    let decode = |segment: &str| -> Result<Value, SignatureError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|_| SignatureError::MalformedToken)?;
        serde_json::from_slice(&bytes).map_err(|_| SignatureError::MalformedToken)
    };

    Ok(DecodedToken {
        header: decode(segments[0])?,
        payload: decode(segments[1])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LOGIN: &str = "workshop-merchant";
    const PAYMENT_SECRET: &str = "payment-secret-one";
    const RESULT_SECRET: &str = "result-secret-two";

    fn custom(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn md5_request_signature_matches_known_value() {
        // md5("login:10.00:5:secret")
        let signature = sign_payment_request(
            "login",
            "10.00",
            5,
            None,
            &BTreeMap::new(),
            "secret",
            SignatureAlg::Md5,
        );
        let expected = hex::encode(Md5::digest(b"login:10.00:5:secret"));
        assert_eq!(signature, expected);
    }

    #[test]
    fn result_verification_round_trips_for_every_algorithm() {
        let algs = [
            SignatureAlg::Md5,
            SignatureAlg::Sha1,
            SignatureAlg::Sha256,
            SignatureAlg::Sha384,
            SignatureAlg::Sha512,
            SignatureAlg::Ripemd160,
        ];
        let fields = custom(&[("Shp_booking", "17")]);

        for alg in algs {
            let before = "1000.00:42".to_string();
            let signature = seal(alg, &before, ":17", RESULT_SECRET);
            assert!(
                verify_result_signature("1000.00", 42, &fields, &signature, RESULT_SECRET, alg),
                "round trip failed for {}",
                alg.as_str()
            );
        }
    }

    #[test]
    fn flipping_any_byte_breaks_verification() {
        let fields = custom(&[("Shp_booking", "17")]);
        let signature = seal(SignatureAlg::Md5, "1000.00:42", ":17", RESULT_SECRET);

        for position in 0..signature.len() {
            let mut tampered = signature.clone().into_bytes();
            tampered[position] = if tampered[position] == b'0' { b'1' } else { b'0' };
            let tampered = String::from_utf8(tampered).unwrap();
            assert!(
                !verify_result_signature(
                    "1000.00",
                    42,
                    &fields,
                    &tampered,
                    RESULT_SECRET,
                    SignatureAlg::Md5
                ),
                "tampered byte {position} still verified"
            );
        }
    }

    #[test]
    fn verification_is_case_insensitive() {
        let signature = seal(SignatureAlg::Md5, "10.00:7", "", RESULT_SECRET).to_uppercase();
        assert!(verify_result_signature(
            "10.00",
            7,
            &BTreeMap::new(),
            &signature,
            RESULT_SECRET,
            SignatureAlg::Md5
        ));
    }

    #[test]
    fn result_and_success_secrets_are_not_interchangeable() {
        let signature = seal(SignatureAlg::Md5, "10.00:7", "", RESULT_SECRET);
        assert!(verify_result_signature(
            "10.00",
            7,
            &BTreeMap::new(),
            &signature,
            RESULT_SECRET,
            SignatureAlg::Md5
        ));
        assert!(!verify_success_signature(
            "10.00",
            7,
            &BTreeMap::new(),
            &signature,
            PAYMENT_SECRET,
            SignatureAlg::Md5
        ));
    }

    #[test]
    fn inbound_base_joins_custom_values_only_in_key_order() {
        let fields = custom(&[("Shp_zeta", "two"), ("Shp_alpha", "one")]);
        // Keys never enter the base string, values follow key order.
        let expected = hex::encode(Md5::digest(
            format!("10.00:7:{RESULT_SECRET}:one:two").as_bytes(),
        ));
        assert!(verify_result_signature(
            "10.00",
            7,
            &fields,
            &expected,
            RESULT_SECRET,
            SignatureAlg::Md5
        ));
    }

    #[test]
    fn outbound_custom_fields_carry_keys_and_follow_the_secret() {
        let fields = custom(&[("Shp_seat", "3")]);
        let signature = sign_payment_request(
            "login",
            "10.00",
            5,
            None,
            &fields,
            "secret",
            SignatureAlg::Md5,
        );
        let expected = hex::encode(Md5::digest(b"login:10.00:5:secret:Shp_seat=3"));
        assert_eq!(signature, expected);
    }

    #[test]
    fn receipt_enters_the_base_string_encoded() {
        let encoded = urlencoding::encode("{\"sno\":\"usn_income\"}").into_owned();
        let signature = sign_payment_request(
            "login",
            "10.00",
            5,
            Some(&encoded),
            &BTreeMap::new(),
            "secret",
            SignatureAlg::Md5,
        );
        let expected = hex::encode(Md5::digest(
            format!("login:10.00:5:{encoded}:secret").as_bytes(),
        ));
        assert_eq!(signature, expected);
    }

    #[test]
    fn token_has_three_segments_and_decodes_back() {
        let payload = json!({ "invId": 42, "state": "OK" });
        let token = build_signed_token(&payload, LOGIN, PAYMENT_SECRET, SignatureAlg::Sha256);
        assert_eq!(token.split('.').count(), 3);

        let decoded = decode_signed_token(&token).unwrap();
        assert_eq!(decoded.payload, payload);
        assert_eq!(decoded.header["alg"], "SHA256");
        assert_eq!(decoded.header["typ"], "JWT");
    }

    #[test]
    fn token_signature_uses_base64_login_secret_key() {
        let payload = json!({ "invId": 1 });
        let token = build_signed_token(&payload, LOGIN, PAYMENT_SECRET, SignatureAlg::Sha256);
        let segments: Vec<&str> = token.split('.').collect();

        let key = STANDARD.encode(format!("{LOGIN}:{PAYMENT_SECRET}"));
        let message = format!("{}.{}", segments[0], segments[1]);
        let expected_hex = hmac_hex(SignatureAlg::Sha256, key.as_bytes(), message.as_bytes());
        let expected = URL_SAFE_NO_PAD.encode(hex::decode(expected_hex).unwrap());
        assert_eq!(segments[2], expected);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert_eq!(
            decode_signed_token("one.two"),
            Err(SignatureError::MalformedToken)
        );
        assert_eq!(
            decode_signed_token("a.b.c.d"),
            Err(SignatureError::MalformedToken)
        );
        assert_eq!(
            decode_signed_token("!!.??.%%"),
            Err(SignatureError::MalformedToken)
        );
    }

    #[test]
    fn status_signature_covers_login_and_invoice_id() {
        let signature =
            status_request_signature("login", 42, RESULT_SECRET, SignatureAlg::Md5);
        let expected = hex::encode(Md5::digest(format!("login:42:{RESULT_SECRET}").as_bytes()));
        assert_eq!(signature, expected);
    }
}
