//! Queue entries.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{ChangeSet, ContentKind, ItemSnapshot, NotificationCategory};

/// One notification waiting for (or undergoing) delivery.
#[derive(Debug, Clone)]
pub struct NotificationEntry {
    pub destination: String,
    pub category: NotificationCategory,
    pub item_id: String,
    pub item_name: String,
    pub kind: Option<ContentKind>,
    /// Present for new items and upgrades.
    pub item: Option<ItemSnapshot>,
    /// Present for upgrades.
    pub changes: Option<ChangeSet>,
    /// Upstream payload that announced a deletion.
    pub raw_payload: Option<Value>,
    pub enqueued_at: DateTime<Utc>,
}

impl NotificationEntry {
    pub fn new_item(destination: impl Into<String>, item: ItemSnapshot) -> Self {
        Self {
            destination: destination.into(),
            category: NotificationCategory::NewItem,
            item_id: item.id.clone(),
            item_name: item.display_title(),
            kind: Some(item.kind),
            item: Some(item),
            changes: None,
            raw_payload: None,
            enqueued_at: Utc::now(),
        }
    }

    pub fn upgrade(destination: impl Into<String>, item: ItemSnapshot, changes: ChangeSet) -> Self {
        Self {
            category: NotificationCategory::Upgrade,
            changes: Some(changes),
            ..Self::new_item(destination, item)
        }
    }

    /// Deletion notice built from the last known snapshot, falling back to the
    /// upstream payload when the item was never stored.
    pub fn deletion(
        destination: impl Into<String>,
        item_id: impl Into<String>,
        snapshot: Option<ItemSnapshot>,
        raw_payload: Value,
    ) -> Self {
        let item_id = item_id.into();
        let item_name = snapshot
            .as_ref()
            .map(ItemSnapshot::display_title)
            .or_else(|| crate::domain::payload_name(&raw_payload).map(str::to_string))
            .unwrap_or_else(|| item_id.clone());
        let kind = snapshot
            .as_ref()
            .map(|s| s.kind)
            .or_else(|| crate::domain::payload_kind(&raw_payload));

        Self {
            destination: destination.into(),
            category: NotificationCategory::Deletion,
            item_id,
            item_name,
            kind,
            item: snapshot,
            changes: None,
            raw_payload: Some(raw_payload),
            enqueued_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deletion_falls_back_to_payload() {
        let entry = NotificationEntry::deletion(
            "default",
            "42",
            None,
            json!({"Name": "Heat", "ItemType": "Movie"}),
        );
        assert_eq!(entry.item_name, "Heat");
        assert_eq!(entry.kind, Some(ContentKind::Movie));

        let bare = NotificationEntry::deletion("default", "42", None, json!({}));
        assert_eq!(bare.item_name, "42");
        assert_eq!(bare.kind, None);
    }
}
