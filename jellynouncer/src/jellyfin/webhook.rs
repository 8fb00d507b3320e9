//! Payloads posted by the Jellyfin webhook plugin.

use serde_json::Value;

use crate::domain::LibraryEvent;

/// What to do with one webhook body.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookDisposition {
    Event(LibraryEvent),
    MissingItemId,
    /// Any `NotificationType` other than item added / deleted.
    Unsupported(Option<String>),
}

/// `NotificationType` of the payload, if any.
pub fn notification_type(payload: &Value) -> Option<&str> {
    payload.get("NotificationType").and_then(Value::as_str)
}

/// Map a webhook body onto a library event.
pub fn classify(payload: Value) -> WebhookDisposition {
    let item_id = match payload.get("ItemId").and_then(Value::as_str) {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        _ => return WebhookDisposition::MissingItemId,
    };

    match notification_type(&payload) {
        Some("ItemAdded") => WebhookDisposition::Event(LibraryEvent::added(item_id, payload)),
        Some("ItemDeleted") => WebhookDisposition::Event(LibraryEvent::deleted(item_id, payload)),
        other => WebhookDisposition::Unsupported(other.map(str::to_string)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LibraryEventKind;
    use serde_json::json;

    #[test]
    fn test_added_and_deleted() {
        let payload = json!({"NotificationType": "ItemAdded", "ItemId": "a1", "Name": "Heat"});
        match classify(payload.clone()) {
            WebhookDisposition::Event(event) => {
                assert_eq!(event.kind, LibraryEventKind::Added);
                assert_eq!(event.item_id, "a1");
                assert_eq!(event.raw_payload, payload);
            }
            other => panic!("unexpected {:?}", other),
        }

        let payload = json!({"NotificationType": "ItemDeleted", "ItemId": "a1"});
        assert!(matches!(
            classify(payload),
            WebhookDisposition::Event(LibraryEvent { kind: LibraryEventKind::Deleted, .. })
        ));
    }

    #[test]
    fn test_ignored_payloads() {
        assert_eq!(
            classify(json!({"NotificationType": "ItemAdded"})),
            WebhookDisposition::MissingItemId
        );
        assert_eq!(
            classify(json!({"NotificationType": "ItemAdded", "ItemId": " "})),
            WebhookDisposition::MissingItemId
        );
        assert_eq!(
            classify(json!({"NotificationType": "PlaybackStart", "ItemId": "a1"})),
            WebhookDisposition::Unsupported(Some("PlaybackStart".to_string()))
        );
        assert_eq!(
            classify(json!({"ItemId": "a1"})),
            WebhookDisposition::Unsupported(None)
        );
    }
}
