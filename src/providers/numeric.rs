//! Numeric coercion for provider payload fields.
//!
//! Providers disagree on how they encode prices: some send JSON numbers,
//! some send strings with thousands separators (`"1,234,500"`), some send
//! nothing at all. Every adapter routes fields through [`coerce`] before
//! comparing or storing them.

use serde_json::Value;

/// Convert a payload field into an `f64`.
///
/// Never fails: absent or malformed input yields `0.0`, the "no value"
/// sentinel. Non-finite results also collapse to `0.0`.
pub fn coerce(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_leading_number(&s.replace(',', "")),
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// Coerce an optional field, treating a missing field as absent.
pub fn coerce_opt(value: Option<&Value>) -> f64 {
    value.map(coerce).unwrap_or(0.0)
}

/// The value if it is usable (finite and > 0).
pub fn positive(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Parse the longest leading decimal prefix of `s` (after trimming), so
/// `"12.5 USD"` reads as `12.5`. Returns `0.0` if no digits lead.
fn parse_leading_number(s: &str) -> f64 {
    let s = s.trim();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;

    for (i, c) in s.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '+' | '-' if seen_exp && s[..i].ends_with(|ch: char| ch == 'e' || ch == 'E') => {}
            '0'..='9' => {
                seen_digit = true;
                end = i + 1;
                continue;
            }
            '.' if !seen_dot && !seen_exp => seen_dot = true,
            'e' | 'E' if seen_digit && !seen_exp => seen_exp = true,
            _ => break,
        }
    }

    if !seen_digit {
        return 0.0;
    }
    s[..end].parse::<f64>().unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
