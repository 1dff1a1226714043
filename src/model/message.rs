//! Raw fetched messages and the summaries derived from them.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One message as fetched over IMAP.
///
/// Immutable once fetched; the engine only reads from it.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// 1-based IMAP sequence number inside the selected folder.
    pub sequence: u32,

    /// Server-side arrival time (`INTERNALDATE`), if the server sent one.
    pub arrival: Option<DateTime<FixedOffset>>,

    /// Full RFC 5322 message bytes.
    pub data: Vec<u8>,
}

/// One message record as returned by the HTTP mail API.
///
/// The record is kept verbatim (field order included) so that it can be
/// exported exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiRecord(pub Map<String, Value>);

impl ApiRecord {
    /// `subject` field, empty when absent or null.
    pub fn subject(&self) -> &str {
        self.0.get("subject").and_then(Value::as_str).unwrap_or("")
    }

    /// Sender address from `from.emailAddress.address`.
    pub fn sender_address(&self) -> Option<&str> {
        self.email_address()?.get("address")?.as_str()
    }

    /// Sender display text: `Name <address>`, or whichever half is present.
    pub fn sender(&self) -> String {
        let name = self
            .email_address()
            .and_then(|e| e.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("");
        match (name.is_empty(), self.sender_address()) {
            (false, Some(addr)) if !addr.eq_ignore_ascii_case(name) => format!("{name} <{addr}>"),
            (_, Some(addr)) => addr.to_string(),
            (false, None) => name.to_string(),
            (true, None) => String::new(),
        }
    }

    /// Raw `receivedDateTime` string.
    pub fn received_raw(&self) -> Option<&str> {
        self.0.get("receivedDateTime").and_then(Value::as_str)
    }

    /// Parsed `receivedDateTime`.
    pub fn received(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(self.received_raw()?).ok()
    }

    /// Short plain-text preview of the body, when selected.
    pub fn body_preview(&self) -> Option<&str> {
        self.0
            .get("bodyPreview")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    fn email_address(&self) -> Option<&Map<String, Value>> {
        self.0.get("from")?.get("emailAddress")?.as_object()
    }
}

/// Human-readable header fields of one message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSummary {
    /// Decoded subject (empty when absent).
    pub subject: String,

    /// Decoded sender (empty when absent).
    pub sender: String,

    /// Arrival time as reported by the server.
    pub arrival: Option<DateTime<FixedOffset>>,

    /// IMAP sequence number; `None` for API records.
    pub sequence: Option<u32>,
}

impl MessageSummary {
    /// Build a summary from an API record.
    pub fn from_record(record: &ApiRecord) -> Self {
        Self {
            subject: record.subject().to_string(),
            sender: record.sender(),
            arrival: record.received(),
            sequence: None,
        }
    }

    /// Case-insensitive substring test against the subject.
    pub fn subject_contains(&self, keyword: &str) -> bool {
        self.subject
            .to_lowercase()
            .contains(&keyword.to_lowercase())
    }
}

/// A message chosen by a selector: its summary plus the bytes it came from.
#[derive(Debug, Clone)]
pub struct SelectedMessage {
    pub summary: MessageSummary,
    pub raw: RawMessage,
}
