// Format-tolerant value comparison. Displayed values rarely match raw
// storage bytes: currency symbols, thousands separators, K/M/B suffixes,
// percent signs, parenthetical negatives, display rounding.

use serde_json::Value;

/// Relative tolerance for numeric comparison, absorbing display rounding.
pub const RELATIVE_TOLERANCE: f64 = 0.01;

/// Parse a display-formatted number: `$1,234.50`, `1M`, `45.5%`, `(100)`.
pub fn parse_display_number(raw: &str) -> Option<f64> {
    let mut s = raw.trim();
    if s.is_empty() {
        return None;
    }

    // Parenthesized values are accounting-style negatives.
    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') {
        negative = true;
        s = s[1..s.len() - 1].trim();
    }

    let mut cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',' | ' ' | '_'))
        .collect();

    if cleaned.ends_with('%') {
        cleaned.pop();
    }

    let mut multiplier = 1.0;
    if let Some(last) = cleaned.chars().last() {
        match last.to_ascii_uppercase() {
            'K' => multiplier = 1e3,
            'M' => multiplier = 1e6,
            'B' => multiplier = 1e9,
            _ => {}
        }
        if multiplier != 1.0 {
            cleaned.pop();
        }
    }

    let value: f64 = cleaned.trim().parse().ok()?;
    let value = value * multiplier;
    Some(if negative { -value } else { value })
}

/// Numeric equality within [`RELATIVE_TOLERANCE`].
pub fn numbers_match(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    let denom = a.abs().max(b.abs());
    if denom == 0.0 {
        return true;
    }
    (a - b).abs() / denom <= RELATIVE_TOLERANCE
}

/// Case-insensitive substring comparison, either direction.
pub fn strings_match(expected: &str, actual: &str) -> bool {
    let e = expected.trim().to_lowercase();
    let a = actual.trim().to_lowercase();
    if e.is_empty() || a.is_empty() {
        return e == a;
    }
    e == a || a.contains(&e) || e.contains(&a)
}

/// Compare an expected value against displayed text: numeric when both
/// sides parse as numbers, substring otherwise.
pub fn values_match(expected: &Value, actual: &str) -> bool {
    let expected_text = value_to_text(expected);
    match (
        parse_display_number(&expected_text),
        parse_display_number(actual),
    ) {
        (Some(e), Some(a)) => numbers_match(e, a),
        _ => strings_match(&expected_text, actual),
    }
}

pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_currency_and_separators() {
        assert!(values_match(&json!(1234.5), "$1,234.50"));
    }

    #[test]
    fn test_magnitude_suffix() {
        assert!(values_match(&json!(1000000), "1M"));
        assert!(values_match(&json!(2500), "2.5K"));
    }

    #[test]
    fn test_percent_sign() {
        assert!(values_match(&json!(45.5), "45.5%"));
    }

    #[test]
    fn test_parenthetical_negative() {
        // (100) is -100: must not match positive 100, must match -100.
        assert!(!values_match(&json!(100), "(100)"));
        assert!(values_match(&json!(-100), "(100)"));
    }

    #[test]
    fn test_relative_tolerance_boundary() {
        // 10 vs 10.2 is ~2% apart, outside the 1% tolerance.
        assert!(!values_match(&json!(10), "10.2"));
        assert!(values_match(&json!(10), "10.05"));
    }

    #[test]
    fn test_string_fallback_substring() {
        assert!(values_match(&json!("Widget"), "Deluxe Widget Pro"));
        assert!(values_match(&json!("widget"), "WIDGET"));
        assert!(!values_match(&json!("widget"), "gadget"));
    }

    #[test]
    fn test_zero_values() {
        assert!(values_match(&json!(0), "0"));
        assert!(values_match(&json!(0), "$0.00"));
    }

    #[test]
    fn test_parse_display_number_rejects_text() {
        assert!(parse_display_number("pending").is_none());
        assert!(parse_display_number("").is_none());
    }
}
