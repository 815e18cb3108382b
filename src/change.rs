use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Deserializer, Serialize};

/// A single ledger entry.
/// Positive amounts are credits, negative amounts are debits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    #[serde(deserialize_with = "amount_or_nan")]
    pub amount: f64,
    pub description: String,
    /// ISO-8601 timestamp, kept as text so stored blobs round-trip verbatim
    pub time: String,
    pub id: i64,
}

/// A change as supplied by the caller: everything except the id,
/// which the reducer assigns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChange {
    #[serde(deserialize_with = "amount_or_nan")]
    pub amount: f64,
    pub description: String,
    pub time: String,
}

/// Ordered sequence of changes, most recent first.
pub type Ledger = Vec<Change>;

impl NewChange {
    /// Build a change stamped with the current local time
    pub fn now(amount: f64, description: impl Into<String>) -> Self {
        Self {
            amount,
            description: description.into(),
            time: now_iso(),
        }
    }

    pub fn with_id(self, id: i64) -> Change {
        Change {
            amount: self.amount,
            description: self.description,
            time: self.time,
            id,
        }
    }
}

/// serde_json writes non-finite floats as `null`; read them back as NaN so a
/// stored ledger holding one stays loadable.
fn amount_or_nan<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Current local time with offset, e.g. `2024-05-01T10:30:00.123+02:00`
pub fn now_iso() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// Sum of all amounts. Derived on demand, never stored.
pub fn balance(changes: &[Change]) -> f64 {
    changes.iter().map(|c| c.amount).sum()
}

/// Highest id present, or 0 for an empty ledger
pub fn max_id(changes: &[Change]) -> i64 {
    changes.iter().map(|c| c.id).fold(0, i64::max)
}

/// Serialize a ledger to the JSON document stored by the backend
pub fn to_json(changes: &[Change]) -> serde_json::Result<String> {
    serde_json::to_string(changes)
}

/// Parse a stored JSON document back into a ledger
pub fn from_json(blob: &str) -> serde_json::Result<Ledger> {
    serde_json::from_str(blob)
}
