//! Media item snapshot database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, now_ms, opt_ms_to_datetime};
use crate::domain::{ContentKind, ItemSnapshot, TechnicalProfile};

/// Row of the `media_items` table. One row per item id, replaced as a whole.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MediaItemDbModel {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub path: String,
    pub size: Option<i64>,
    pub modified_at: Option<i64>,

    pub resolution: Option<String>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub hdr: bool,
    pub audio_channels: Option<String>,

    pub year: Option<i32>,
    pub overview: Option<String>,
    pub series_name: Option<String>,
    pub season_number: Option<i32>,
    pub episode_number: Option<i32>,
    /// JSON array of genre names.
    pub genres: String,

    pub quality_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl MediaItemDbModel {
    pub fn from_snapshot(item: &ItemSnapshot) -> Self {
        let now = now_ms();
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            kind: item.kind.as_str().to_string(),
            path: item.path.clone(),
            size: item.size,
            modified_at: item.modified_at.map(datetime_to_ms),
            resolution: item.profile.resolution.clone(),
            video_codec: item.profile.video_codec.clone(),
            audio_codec: item.profile.audio_codec.clone(),
            hdr: item.profile.hdr,
            audio_channels: item.profile.audio_channels.clone(),
            year: item.year,
            overview: item.overview.clone(),
            series_name: item.series_name.clone(),
            season_number: item.season_number,
            episode_number: item.episode_number,
            genres: serde_json::to_string(&item.genres).unwrap_or_else(|_| "[]".to_string()),
            quality_hash: item.fingerprint().as_str().to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn into_snapshot(self) -> ItemSnapshot {
        let genres = serde_json::from_str(&self.genres).unwrap_or_else(|e| {
            tracing::warn!(item_id = %self.id, "Invalid genres column: {}", e);
            Vec::new()
        });

        ItemSnapshot {
            id: self.id,
            name: self.name,
            kind: ContentKind::parse(&self.kind),
            path: self.path,
            size: self.size,
            modified_at: opt_ms_to_datetime(self.modified_at),
            profile: TechnicalProfile {
                resolution: self.resolution,
                video_codec: self.video_codec,
                audio_codec: self.audio_codec,
                hdr: self.hdr,
                audio_channels: self.audio_channels,
            },
            year: self.year,
            overview: self.overview,
            series_name: self.series_name,
            season_number: self.season_number,
            episode_number: self.episode_number,
            genres,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_conversion_keeps_fields() {
        let mut item = ItemSnapshot::new("e1", "Pilot", ContentKind::Episode, "/tv/show/e1.mkv")
            .with_size(2048)
            .with_profile(TechnicalProfile {
                resolution: Some("1080p".to_string()),
                hdr: true,
                ..Default::default()
            });
        item.series_name = Some("Show".to_string());
        item.genres = vec!["Drama".to_string()];

        let row = MediaItemDbModel::from_snapshot(&item);
        assert_eq!(row.kind, "Episode");
        assert_eq!(row.genres, "[\"Drama\"]");
        assert_eq!(row.quality_hash, item.fingerprint().as_str());
        assert_eq!(row.into_snapshot(), item);
    }
}
