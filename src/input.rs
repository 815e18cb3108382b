// Amount entry rules for the view layer.
// The reducer stores whatever it is given, so these checks are the only
// thing standing between a keyboard and a NaN in the ledger.

use crate::error::InputError;

/// Whether `text` may stay in the amount field while the user is typing.
///
/// Accepts an empty field, a lone minus sign (start of a debit), or anything
/// that reads as a finite number once spaces are removed.
pub fn accepts_amount_input(text: &str) -> bool {
    text.is_empty() || text == "-" || leading_number(&strip_spaces(text)).is_some()
}

/// Turn the amount field into a ledger amount.
pub fn parse_amount(text: &str) -> Result<f64, InputError> {
    let cleaned = strip_spaces(text);
    if cleaned.is_empty() {
        return Err(InputError::EmptyAmount);
    }

    leading_number(&cleaned).ok_or_else(|| InputError::InvalidAmount(text.to_string()))
}

fn strip_spaces(text: &str) -> String {
    text.chars().filter(|c| *c != ' ').collect()
}

/// Parse the longest numeric prefix, so partially typed input like `12.` or
/// `1e` still counts as the number typed so far.
fn leading_number(text: &str) -> Option<f64> {
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = text.as_bytes();

    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'0'..=b'9' => {
                seen_digit = true;
                end = i + 1;
            }
            b'+' | b'-' if i == 0 => {}
            b'+' | b'-' if seen_exp && matches!(bytes[i - 1], b'e' | b'E') => {}
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if seen_digit && !seen_exp => seen_exp = true,
            _ => break,
        }
    }

    if !seen_digit {
        return None;
    }

    text[..end].parse::<f64>().ok().filter(|n| n.is_finite())
}
