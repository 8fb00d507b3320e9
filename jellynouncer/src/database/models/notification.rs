//! Notification log database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::NotificationCategory;

/// Delivery status recorded for a notification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Row of the append-only `notifications` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationLogDbModel {
    pub id: i64,
    pub category: String,
    pub item_id: String,
    pub item_name: String,
    pub destination: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub sent_at: Option<i64>,
}

impl NotificationLogDbModel {
    pub fn status(&self) -> Option<NotificationStatus> {
        NotificationStatus::parse(&self.status)
    }

    pub fn category(&self) -> Option<NotificationCategory> {
        NotificationCategory::parse(&self.category)
    }
}

/// A notification attempt to be appended to the log.
#[derive(Debug, Clone)]
pub struct NewNotificationLog {
    pub category: NotificationCategory,
    pub item_id: String,
    pub item_name: String,
    /// Route key the notification was delivered to.
    pub destination: Option<String>,
    pub status: NotificationStatus,
    pub error_message: Option<String>,
}

impl NewNotificationLog {
    pub fn sent(
        category: NotificationCategory,
        item_id: impl Into<String>,
        item_name: impl Into<String>,
    ) -> Self {
        Self {
            category,
            item_id: item_id.into(),
            item_name: item_name.into(),
            destination: None,
            status: NotificationStatus::Sent,
            error_message: None,
        }
    }

    pub fn failed(
        category: NotificationCategory,
        item_id: impl Into<String>,
        item_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            status: NotificationStatus::Failed,
            error_message: Some(error.into()),
            ..Self::sent(category, item_id, item_name)
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }
}

/// Row of the `quality_changes` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QualityChangeDbModel {
    pub id: i64,
    pub item_id: String,
    pub change_type: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub is_upgrade: bool,
    pub detected_at: i64,
}
