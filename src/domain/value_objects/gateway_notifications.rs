use std::collections::BTreeMap;

/// Custom pass-through fields carry this prefix to keep them apart from
/// the gateway's standard fields. They participate in signatures.
pub const CUSTOM_FIELD_PREFIX: &str = "Shp_";

pub const FIELD_OUT_SUM: &str = "OutSum";
pub const FIELD_INV_ID: &str = "InvId";
pub const FIELD_SIGNATURE: &str = "SignatureValue";
pub const FIELD_TOKEN: &str = "token";

/// An inbound gateway notification before classification: just the field
/// map, parsed from either a form-urlencoded or a JSON body.
#[derive(Debug, Clone, Default)]
pub struct RawNotification {
    pub fields: BTreeMap<String, String>,
}

impl RawNotification {
    pub fn from_fields(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Custom pass-through fields, already sorted by key (BTreeMap order).
    pub fn custom_fields(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .filter(|(key, _)| key.starts_with(CUSTOM_FIELD_PREFIX))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Fields of a server-to-server payment confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationFields {
    pub out_sum: String,
    pub inv_id: i32,
    pub signature: String,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub custom_fields: BTreeMap<String, String>,
}

/// Closed set of inbound notification shapes, decided once at the
/// boundary by ordered structural predicates instead of ad-hoc field
/// sniffing spread through the handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    /// `{token: "a.b.c"}` — the signed-token confirmation variant.
    SignedToken(String),
    /// Classic confirmation callback with `OutSum`/`InvId`/`SignatureValue`.
    Confirmation(ConfirmationFields),
    /// Anything else; acknowledged with a diagnostic, never an error.
    Unknown,
}

impl NotificationKind {
    pub fn classify(raw: &RawNotification) -> NotificationKind {
        if let Some(token) = raw.get(FIELD_TOKEN) {
            return NotificationKind::SignedToken(token.to_string());
        }

        let out_sum = raw.get(FIELD_OUT_SUM);
        let inv_id = raw.get(FIELD_INV_ID).and_then(|v| v.parse::<i32>().ok());
        let signature = raw.get(FIELD_SIGNATURE);

        match (out_sum, inv_id, signature) {
            (Some(out_sum), Some(inv_id), Some(signature)) => {
                NotificationKind::Confirmation(ConfirmationFields {
                    out_sum: out_sum.to_string(),
                    inv_id,
                    signature: signature.to_string(),
                    payment_method: raw.get("PaymentMethod").map(str::to_string),
                    payment_reference: raw.get("OperationId").map(str::to_string),
                    custom_fields: raw.custom_fields(),
                })
            }
            _ => NotificationKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawNotification {
        RawNotification::from_fields(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn token_field_wins_over_everything_else() {
        let notification = raw(&[
            ("token", "a.b.c"),
            ("OutSum", "10.00"),
            ("InvId", "7"),
            ("SignatureValue", "deadbeef"),
        ]);
        assert_eq!(
            NotificationKind::classify(&notification),
            NotificationKind::SignedToken("a.b.c".to_string())
        );
    }

    #[test]
    fn complete_confirmation_fields_classify_as_confirmation() {
        let notification = raw(&[
            ("OutSum", "1000.00"),
            ("InvId", "42"),
            ("SignatureValue", "abc123"),
            ("Shp_booking", "77"),
        ]);
        match NotificationKind::classify(&notification) {
            NotificationKind::Confirmation(fields) => {
                assert_eq!(fields.out_sum, "1000.00");
                assert_eq!(fields.inv_id, 42);
                assert_eq!(fields.custom_fields.len(), 1);
                assert_eq!(fields.custom_fields["Shp_booking"], "77");
            }
            other => panic!("expected confirmation, got {:?}", other),
        }
    }

    #[test]
    fn missing_or_malformed_fields_classify_as_unknown() {
        let missing_signature = raw(&[("OutSum", "10.00"), ("InvId", "7")]);
        assert_eq!(
            NotificationKind::classify(&missing_signature),
            NotificationKind::Unknown
        );

        let bad_inv_id = raw(&[
            ("OutSum", "10.00"),
            ("InvId", "not-a-number"),
            ("SignatureValue", "abc"),
        ]);
        assert_eq!(
            NotificationKind::classify(&bad_inv_id),
            NotificationKind::Unknown
        );
    }

    #[test]
    fn custom_fields_are_sorted_by_key() {
        let notification = raw(&[
            ("Shp_zeta", "2"),
            ("Shp_alpha", "1"),
            ("OutSum", "10.00"),
        ]);
        let keys: Vec<_> = notification.custom_fields().into_keys().collect();
        assert_eq!(keys, vec!["Shp_alpha", "Shp_zeta"]);
    }
}
