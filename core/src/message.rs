// Immutable message envelope carried through topics
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Data envelope with byte, text and numeric views of the same payload
///
/// `text` is always derived from `payload` and `numeric` from `text`, whichever
/// constructor is used. A payload that does not parse as a number carries
/// `f64::NAN`; callers doing arithmetic must check [`Message::is_numeric`].
#[derive(Clone, Debug, Serialize)]
pub struct Message {
    payload: Vec<u8>,
    text: String,
    numeric: f64,
    created_at: DateTime<Utc>,
}

impl Message {
    pub fn from_bytes(payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        let text = String::from_utf8_lossy(&payload).into_owned();
        let numeric = parse_numeric(&text);
        Self {
            payload,
            text,
            numeric,
            created_at: Utc::now(),
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }

    pub fn from_f64(value: f64) -> Self {
        Self::from_text(&format_numeric(value))
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Numeric view, `NaN` when the text is not a number
    pub fn numeric(&self) -> f64 {
        self.numeric
    }

    /// Numeric view as an option, `None` when the text is not a number
    pub fn as_f64(&self) -> Option<f64> {
        self.is_numeric().then_some(self.numeric)
    }

    pub fn is_numeric(&self) -> bool {
        !self.numeric.is_nan()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl From<f64> for Message {
    fn from(value: f64) -> Self {
        Self::from_f64(value)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::from_text(text)
    }
}

impl From<Vec<u8>> for Message {
    fn from(payload: Vec<u8>) -> Self {
        Self::from_bytes(payload)
    }
}

fn parse_numeric(text: &str) -> f64 {
    text.trim().parse::<f64>().unwrap_or(f64::NAN)
}

// Debug formatting keeps the fractional part ("5.0" rather than "5"), so a
// whole number survives a text round-trip looking like a floating point value.
fn format_numeric(value: f64) -> String {
    format!("{:?}", value)
}
