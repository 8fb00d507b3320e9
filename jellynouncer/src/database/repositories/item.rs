//! Item store repository.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::database::models::{MediaItemDbModel, NewNotificationLog, NotificationStatus};
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::domain::{ChangeSet, ItemSnapshot};
use crate::Result;

/// Aggregate counts reported by `/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_items: i64,
    pub items_by_kind: BTreeMap<String, i64>,
    pub notifications_by_status: BTreeMap<String, i64>,
    pub quality_changes: i64,
}

/// Persistence of last known item state and the notification logs.
///
/// Each call is a single statement (or a single transaction) and is atomic on
/// its own. A storage failure means the write must be assumed lost.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<ItemSnapshot>>;
    async fn get_by_path(&self, path: &str) -> Result<Option<ItemSnapshot>>;
    /// Replace the stored snapshot for `item.id` as a whole.
    async fn upsert(&self, item: &ItemSnapshot) -> Result<()>;
    /// Returns whether a row was removed.
    async fn delete(&self, id: &str) -> Result<bool>;
    async fn contains(&self, id: &str) -> Result<bool>;
    async fn log_notification(&self, record: &NewNotificationLog) -> Result<i64>;
    async fn log_quality_changes(&self, item_id: &str, changes: &ChangeSet) -> Result<()>;
    async fn get_stats(&self) -> Result<StoreStats>;
    /// Remove `sent` log rows older than `retention_days`. Returns the row count.
    async fn cleanup_old_notifications(&self, retention_days: i64) -> Result<u64>;
}

/// SQLx implementation of [`ItemStore`].
#[derive(Clone)]
pub struct SqlxItemStore {
    pool: SqlitePool,
}

impl SqlxItemStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ItemStore for SqlxItemStore {
    async fn get(&self, id: &str) -> Result<Option<ItemSnapshot>> {
        let row = sqlx::query_as::<_, MediaItemDbModel>("SELECT * FROM media_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(MediaItemDbModel::into_snapshot))
    }

    async fn get_by_path(&self, path: &str) -> Result<Option<ItemSnapshot>> {
        let row = sqlx::query_as::<_, MediaItemDbModel>(
            "SELECT * FROM media_items WHERE path = ? ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(MediaItemDbModel::into_snapshot))
    }

    async fn upsert(&self, item: &ItemSnapshot) -> Result<()> {
        let row = MediaItemDbModel::from_snapshot(item);
        retry_on_sqlite_busy("upsert_media_item", || async {
            sqlx::query(
                r#"
                INSERT INTO media_items (
                    id, name, kind, path, size, modified_at,
                    resolution, video_codec, audio_codec, hdr, audio_channels,
                    year, overview, series_name, season_number, episode_number, genres,
                    quality_hash, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    kind = excluded.kind,
                    path = excluded.path,
                    size = excluded.size,
                    modified_at = excluded.modified_at,
                    resolution = excluded.resolution,
                    video_codec = excluded.video_codec,
                    audio_codec = excluded.audio_codec,
                    hdr = excluded.hdr,
                    audio_channels = excluded.audio_channels,
                    year = excluded.year,
                    overview = excluded.overview,
                    series_name = excluded.series_name,
                    season_number = excluded.season_number,
                    episode_number = excluded.episode_number,
                    genres = excluded.genres,
                    quality_hash = excluded.quality_hash,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&row.id)
            .bind(&row.name)
            .bind(&row.kind)
            .bind(&row.path)
            .bind(row.size)
            .bind(row.modified_at)
            .bind(&row.resolution)
            .bind(&row.video_codec)
            .bind(&row.audio_codec)
            .bind(row.hdr)
            .bind(&row.audio_channels)
            .bind(row.year)
            .bind(&row.overview)
            .bind(&row.series_name)
            .bind(row.season_number)
            .bind(row.episode_number)
            .bind(&row.genres)
            .bind(&row.quality_hash)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        retry_on_sqlite_busy("delete_media_item", || async {
            let result = sqlx::query("DELETE FROM media_items WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn contains(&self, id: &str) -> Result<bool> {
        let found: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM media_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn log_notification(&self, record: &NewNotificationLog) -> Result<i64> {
        let now = now_ms();
        let sent_at = (record.status == NotificationStatus::Sent).then_some(now);

        retry_on_sqlite_busy("log_notification", || async {
            let result = sqlx::query(
                r#"
                INSERT INTO notifications (
                    category, item_id, item_name, destination, status, error_message,
                    created_at, sent_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.category.as_str())
            .bind(&record.item_id)
            .bind(&record.item_name)
            .bind(&record.destination)
            .bind(record.status.as_str())
            .bind(&record.error_message)
            .bind(now)
            .bind(sent_at)
            .execute(&self.pool)
            .await?;
            Ok(result.last_insert_rowid())
        })
        .await
    }

    async fn log_quality_changes(&self, item_id: &str, changes: &ChangeSet) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let now = now_ms();
        retry_on_sqlite_busy("log_quality_changes", || async {
            let mut tx = self.pool.begin().await?;
            for change in changes.values() {
                sqlx::query(
                    r#"
                    INSERT INTO quality_changes (
                        item_id, change_type, old_value, new_value, is_upgrade, detected_at
                    ) VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(item_id)
                .bind(change.kind.as_str())
                .bind(&change.old_value)
                .bind(&change.new_value)
                .bind(change.is_upgrade)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn get_stats(&self) -> Result<StoreStats> {
        let by_kind: Vec<(String, i64)> =
            sqlx::query_as("SELECT kind, COUNT(*) FROM media_items GROUP BY kind")
                .fetch_all(&self.pool)
                .await?;
        let by_status: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM notifications GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        let (quality_changes,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM quality_changes")
            .fetch_one(&self.pool)
            .await?;

        let items_by_kind: BTreeMap<String, i64> = by_kind.into_iter().collect();
        Ok(StoreStats {
            total_items: items_by_kind.values().sum(),
            items_by_kind,
            notifications_by_status: by_status.into_iter().collect(),
            quality_changes,
        })
    }

    async fn cleanup_old_notifications(&self, retention_days: i64) -> Result<u64> {
        let cutoff = now_ms() - retention_days.saturating_mul(24 * 60 * 60 * 1000);
        retry_on_sqlite_busy("cleanup_old_notifications", || async {
            let result =
                sqlx::query("DELETE FROM notifications WHERE status = 'sent' AND created_at < ?")
                    .bind(cutoff)
                    .execute(&self.pool)
                    .await?;
            Ok(result.rows_affected())
        })
        .await
    }
}
