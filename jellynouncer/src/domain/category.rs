//! Notification categories.

use serde::{Deserialize, Serialize};

/// Semantic category decided for a library change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    NewItem,
    Upgrade,
    Deletion,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewItem => "new_item",
            Self::Upgrade => "upgrade",
            Self::Deletion => "deletion",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new_item" => Some(Self::NewItem),
            "upgrade" => Some(Self::Upgrade),
            "deletion" => Some(Self::Deletion),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
