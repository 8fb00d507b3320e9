//! Database maintenance operations.
//!
//! Periodic housekeeping:
//! - Notification log cleanup (sent rows past the retention window)
//! - `PRAGMA optimize`

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::database::{ItemStore, SqlxItemStore};

/// Configuration for the maintenance scheduler.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Interval between maintenance runs (default: 24 hours).
    pub interval: Duration,
    /// Sent notification retention period in days (default: 30).
    pub notification_retention_days: i64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60),
            notification_retention_days: 30,
        }
    }
}

/// Result of one maintenance run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub notifications_deleted: u64,
}

/// Database maintenance scheduler.
pub struct MaintenanceScheduler {
    store: SqlxItemStore,
    config: MaintenanceConfig,
    cancel: CancellationToken,
}

impl MaintenanceScheduler {
    pub fn new(store: SqlxItemStore, config: MaintenanceConfig, cancel: CancellationToken) -> Self {
        Self {
            store,
            config,
            cancel,
        }
    }

    /// Start the maintenance scheduler.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run_loop().await;
        })
    }

    /// Stop the maintenance scheduler.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    async fn run_loop(&self) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Maintenance scheduler stopped");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.run_maintenance().await {
                        tracing::error!("Maintenance error: {}", e);
                    }
                }
            }
        }
    }

    /// Run all maintenance tasks.
    pub async fn run_maintenance(&self) -> crate::Result<MaintenanceReport> {
        tracing::debug!("Starting database maintenance");

        let notifications_deleted = self
            .store
            .cleanup_old_notifications(self.config.notification_retention_days)
            .await?;
        if notifications_deleted > 0 {
            tracing::info!(
                "Cleaned up {} old notification log entries",
                notifications_deleted
            );
        }

        sqlx::query("PRAGMA optimize")
            .execute(self.store.pool())
            .await?;

        tracing::debug!("Database maintenance completed");
        Ok(MaintenanceReport {
            notifications_deleted,
        })
    }
}
