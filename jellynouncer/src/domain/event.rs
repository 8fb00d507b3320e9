//! Library change events from the upstream media server.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::media::ContentKind;

/// What happened to an item upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum LibraryEventKind {
    Added,
    Deleted,
}

/// A single change event, with the raw payload kept for deletion notices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEvent {
    pub kind: LibraryEventKind,
    pub item_id: String,
    pub raw_payload: Value,
}

impl LibraryEvent {
    pub fn added(item_id: impl Into<String>, raw_payload: Value) -> Self {
        Self {
            kind: LibraryEventKind::Added,
            item_id: item_id.into(),
            raw_payload,
        }
    }

    pub fn deleted(item_id: impl Into<String>, raw_payload: Value) -> Self {
        Self {
            kind: LibraryEventKind::Deleted,
            item_id: item_id.into(),
            raw_payload,
        }
    }
}

/// Item name carried in a raw webhook payload.
pub fn payload_name(payload: &Value) -> Option<&str> {
    payload.get("Name").and_then(Value::as_str)
}

/// Item kind carried in a raw webhook payload.
pub fn payload_kind(payload: &Value) -> Option<ContentKind> {
    payload
        .get("ItemType")
        .and_then(Value::as_str)
        .map(ContentKind::parse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_accessors() {
        let payload = json!({"Name": "Heat", "ItemType": "Movie"});
        assert_eq!(payload_name(&payload), Some("Heat"));
        assert_eq!(payload_kind(&payload), Some(ContentKind::Movie));
        assert_eq!(payload_name(&json!({})), None);
    }
}
