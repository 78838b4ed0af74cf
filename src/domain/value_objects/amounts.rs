/// Invoice amounts are stored as integer minor units (two decimal
/// places). The gateway transmits decimal strings like "1000.00", so all
/// parsing and formatting lives here and nowhere else.

/// Parses a gateway amount string into minor units. Accepts up to two
/// fractional digits; anything else is rejected.
pub fn parse_amount_minor(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (whole, frac) = match trimmed.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (trimmed, ""),
    };

    if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole: i64 = whole.parse().ok()?;
    let frac_minor: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };

    whole.checked_mul(100)?.checked_add(frac_minor)
}

/// Formats minor units as the two-decimal string the gateway expects.
pub fn format_amount(minor: i64) -> String {
    format!("{}.{:02}", minor / 100, minor % 100)
}

/// The gateway rounds some amounts on its side; anything within one
/// minor unit (0.01) is considered a match.
pub fn amounts_match(expected_minor: i64, confirmed_minor: i64) -> bool {
    (expected_minor - confirmed_minor).abs() <= 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_fractional_amounts() {
        assert_eq!(parse_amount_minor("1000"), Some(100_000));
        assert_eq!(parse_amount_minor("1000.00"), Some(100_000));
        assert_eq!(parse_amount_minor("999.5"), Some(99_950));
        assert_eq!(parse_amount_minor("0.01"), Some(1));
    }

    #[test]
    fn rejects_malformed_amounts() {
        assert_eq!(parse_amount_minor(""), None);
        assert_eq!(parse_amount_minor("."), None);
        assert_eq!(parse_amount_minor("10.123"), None);
        assert_eq!(parse_amount_minor("-5.00"), None);
        assert_eq!(parse_amount_minor("1,000.00"), None);
    }

    #[test]
    fn formats_two_decimals() {
        assert_eq!(format_amount(100_000), "1000.00");
        assert_eq!(format_amount(99_950), "999.50");
        assert_eq!(format_amount(1), "0.01");
    }

    #[test]
    fn tolerance_is_one_minor_unit() {
        assert!(amounts_match(100_000, 100_000));
        assert!(amounts_match(100_000, 100_001));
        assert!(amounts_match(100_000, 99_999));
        assert!(!amounts_match(100_000, 100_002));
        assert!(!amounts_match(100_000, 99_950));
    }
}
