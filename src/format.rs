use chrono::{DateTime, Utc};

const UNITS: [(&str, i64); 6] = [
    ("year", 365 * 24 * 3600),
    ("month", 30 * 24 * 3600),
    ("day", 24 * 3600),
    ("hour", 3600),
    ("minute", 60),
    ("second", 1),
];

/// Describe `time` relative to `now`: "3 hours ago", "in 2 days", "just now".
/// Text that is not RFC 3339 is returned as-is.
pub fn format_relative(time: &str, now: DateTime<Utc>) -> String {
    let parsed = match DateTime::parse_from_rfc3339(time) {
        Ok(parsed) => parsed.with_timezone(&Utc),
        Err(_) => return time.to_string(),
    };

    let delta = now.signed_duration_since(parsed).num_seconds();
    let magnitude = delta.abs();
    if magnitude < 1 {
        return "just now".to_string();
    }

    // "second" always matches once magnitude >= 1
    let (unit, size) = UNITS
        .iter()
        .find(|(_, size)| magnitude >= *size)
        .copied()
        .unwrap_or(("second", 1));
    let count = magnitude / size;
    let plural = if count == 1 { "" } else { "s" };

    if delta > 0 {
        format!("{} {}{} ago", count, unit, plural)
    } else {
        format!("in {} {}{}", count, unit, plural)
    }
}

/// Signed amount with two decimals, e.g. `+100.00` / `-30.00`
pub fn format_amount(amount: f64) -> String {
    if amount.is_nan() {
        return "NaN".to_string();
    }
    format!("{:+.2}", amount)
}
