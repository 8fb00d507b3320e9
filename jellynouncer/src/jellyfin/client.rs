//! Jellyfin REST client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::domain::{ContentKind, ItemSnapshot, TechnicalProfile};
use crate::ingest::ItemFetcher;
use crate::utils::url::redact_url;
use crate::Result;

/// Extra fields requested for every item lookup.
const ITEM_FIELDS: &str = "Path,MediaStreams,ProviderIds,Overview,Genres";

/// Item types returned by a library listing.
const LIBRARY_ITEM_TYPES: &str = "Movie,Series,Episode,Audio,MusicAlbum";

/// Connection settings for one Jellyfin server.
#[derive(Debug, Clone)]
pub struct JellyfinSettings {
    pub server_url: String,
    pub api_key: String,
    pub user_id: String,
    pub timeout: Duration,
}

/// Server identity reported by `/System/Info`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerInfo {
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Thin client over the endpoints the notifier needs.
#[derive(Clone)]
pub struct JellyfinClient {
    client: Client,
    base_url: String,
    auth_header: String,
    user_id: String,
}

impl JellyfinClient {
    pub fn new(client: Client, settings: &JellyfinSettings) -> Self {
        Self {
            client,
            base_url: settings.server_url.trim_end_matches('/').to_string(),
            auth_header: format!("MediaBrowser Token=\"{}\"", settings.api_key),
            user_id: settings.user_id.clone(),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header("X-Emby-Authorization", &self.auth_header)
    }

    /// Query `/System/Info` to check that the server answers and the key works.
    pub async fn server_info(&self) -> Result<ServerInfo> {
        let response = self.get("/System/Info").send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    /// Returns `false` instead of an error so health checks can report it.
    pub async fn test_connection(&self) -> bool {
        match self.server_info().await {
            Ok(info) => {
                info!(
                    "Connected to Jellyfin server: {} v{}",
                    info.server_name.as_deref().unwrap_or("Unknown"),
                    info.version.as_deref().unwrap_or("Unknown")
                );
                true
            }
            Err(e) => {
                warn!(
                    server = %redact_url(&self.base_url),
                    "Failed to connect to Jellyfin server: {}",
                    e
                );
                false
            }
        }
    }
}

#[async_trait]
impl ItemFetcher for JellyfinClient {
    async fn fetch_item(&self, item_id: &str) -> Result<Option<ItemSnapshot>> {
        debug!(item_id = %item_id, "Fetching item from Jellyfin");
        let response = self
            .get(&format!("/Users/{}/Items/{}", self.user_id, item_id))
            .query(&[("Fields", ITEM_FIELDS), ("EnableUserData", "false")])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!(item_id = %item_id, "Item not found in Jellyfin");
            return Ok(None);
        }
        let response = response.error_for_status()?;
        let dto: ItemDto = response.json().await?;
        Ok(Some(dto.into_snapshot()))
    }

    async fn list_items(&self) -> Result<Vec<ItemSnapshot>> {
        let response = self
            .get(&format!("/Users/{}/Items", self.user_id))
            .query(&[
                ("Recursive", "true"),
                ("Fields", ITEM_FIELDS),
                ("IncludeItemTypes", LIBRARY_ITEM_TYPES),
                ("EnableUserData", "false"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let page: ItemsPage = response.json().await?;
        let items: Vec<ItemSnapshot> = page
            .items
            .into_iter()
            .map(ItemDto::into_snapshot)
            .collect();
        info!("Retrieved {} items from library", items.len());
        Ok(items)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemsPage {
    #[serde(default)]
    items: Vec<ItemDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemDto {
    id: String,
    name: String,
    #[serde(rename = "Type")]
    item_type: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    size: Option<i64>,
    #[serde(default)]
    date_modified: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    production_year: Option<i32>,
    #[serde(default)]
    genres: Option<Vec<String>>,
    #[serde(default)]
    series_name: Option<String>,
    #[serde(default)]
    parent_index_number: Option<i32>,
    #[serde(default)]
    index_number: Option<i32>,
    #[serde(default)]
    media_streams: Vec<MediaStreamDto>,
    #[serde(default)]
    media_sources: Vec<MediaSourceDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MediaSourceDto {
    #[serde(default)]
    size: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MediaStreamDto {
    #[serde(rename = "Type", default)]
    stream_type: Option<String>,
    #[serde(default)]
    codec: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    channels: Option<u32>,
    #[serde(default)]
    video_range: Option<String>,
}

impl MediaStreamDto {
    fn is(&self, stream_type: &str) -> bool {
        self.stream_type.as_deref() == Some(stream_type)
    }
}

impl ItemDto {
    fn into_snapshot(self) -> ItemSnapshot {
        let profile = derive_profile(&self.media_streams);
        let size = self
            .size
            .or_else(|| self.media_sources.iter().find_map(|s| s.size));
        let modified_at = self
            .date_modified
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let mut snapshot = ItemSnapshot::new(
            self.id,
            self.name,
            ContentKind::parse(&self.item_type),
            self.path.unwrap_or_default(),
        )
        .with_profile(profile);
        snapshot.size = size;
        snapshot.modified_at = modified_at;
        snapshot.year = self.production_year;
        snapshot.overview = self.overview;
        snapshot.series_name = self.series_name;
        snapshot.season_number = self.parent_index_number;
        snapshot.episode_number = self.index_number;
        snapshot.genres = self.genres.unwrap_or_default();
        snapshot
    }
}

/// Build the technical profile from the item's media streams.
fn derive_profile(streams: &[MediaStreamDto]) -> TechnicalProfile {
    let video = streams.iter().filter(|s| s.is("Video"));

    let resolution = video.clone().find_map(|s| match (s.width, s.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Some(resolution_class(w, h)),
        _ => None,
    });
    let video_codec = video
        .clone()
        .find_map(|s| s.codec.as_deref())
        .map(str::to_uppercase);
    let hdr = video
        .clone()
        .find_map(|s| s.video_range.as_deref())
        .is_some_and(|range| range.to_uppercase().contains("HDR"));

    let audio = streams.iter().filter(|s| s.is("Audio"));
    let audio_codec = audio
        .clone()
        .find_map(|s| s.codec.as_deref())
        .map(str::to_uppercase);
    let max_channels = audio.filter_map(|s| s.channels).max().unwrap_or(0);

    TechnicalProfile {
        resolution,
        video_codec,
        audio_codec,
        hdr,
        audio_channels: channel_class(max_channels),
    }
}

fn resolution_class(width: u32, height: u32) -> String {
    match width {
        w if w >= 3840 => "4K".to_string(),
        w if w >= 1920 => "1080p".to_string(),
        w if w >= 1280 => "720p".to_string(),
        w => format!("{}x{}", w, height),
    }
}

fn channel_class(channels: u32) -> Option<String> {
    let class = match channels {
        c if c >= 8 => "7.1",
        c if c >= 6 => "5.1",
        c if c >= 2 => "Stereo",
        1 => "Mono",
        _ => return None,
    };
    Some(class.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item_json() -> serde_json::Value {
        json!({
            "Id": "abc",
            "Name": "Pilot",
            "Type": "Episode",
            "Path": "/tv/show/s01e01.mkv",
            "DateModified": "2024-03-01T12:30:00.0000000Z",
            "ProductionYear": 2008,
            "Genres": ["Drama"],
            "SeriesName": "Show",
            "ParentIndexNumber": 1,
            "IndexNumber": 1,
            "MediaSources": [{"Size": 1_500_000_000_i64}],
            "MediaStreams": [
                {"Type": "Video", "Codec": "hevc", "Width": 3840, "Height": 2160, "VideoRange": "HDR"},
                {"Type": "Audio", "Codec": "eac3", "Channels": 6},
                {"Type": "Audio", "Codec": "aac", "Channels": 2},
                {"Type": "Subtitle", "Codec": "srt"}
            ]
        })
    }

    #[test]
    fn test_item_into_snapshot() {
        let dto: ItemDto = serde_json::from_value(item_json()).unwrap();
        let snapshot = dto.into_snapshot();

        assert_eq!(snapshot.kind, ContentKind::Episode);
        assert_eq!(snapshot.size, Some(1_500_000_000));
        assert_eq!(snapshot.season_number, Some(1));
        assert_eq!(snapshot.genres, vec!["Drama".to_string()]);
        assert!(snapshot.modified_at.is_some());
        assert_eq!(
            snapshot.profile,
            TechnicalProfile {
                resolution: Some("4K".to_string()),
                video_codec: Some("HEVC".to_string()),
                audio_codec: Some("EAC3".to_string()),
                hdr: true,
                audio_channels: Some("5.1".to_string()),
            }
        );
    }

    #[test]
    fn test_minimal_item() {
        let dto: ItemDto =
            serde_json::from_value(json!({"Id": "x", "Name": "Album", "Type": "MusicAlbum"}))
                .unwrap();
        let snapshot = dto.into_snapshot();
        assert_eq!(snapshot.kind, ContentKind::Album);
        assert_eq!(snapshot.path, "");
        assert_eq!(snapshot.profile, TechnicalProfile::default());
    }

    #[test]
    fn test_resolution_class() {
        assert_eq!(resolution_class(3840, 2160), "4K");
        assert_eq!(resolution_class(1920, 800), "1080p");
        assert_eq!(resolution_class(1280, 720), "720p");
        assert_eq!(resolution_class(720, 480), "720x480");
    }

    #[test]
    fn test_channel_class() {
        assert_eq!(channel_class(8).as_deref(), Some("7.1"));
        assert_eq!(channel_class(6).as_deref(), Some("5.1"));
        assert_eq!(channel_class(2).as_deref(), Some("Stereo"));
        assert_eq!(channel_class(1).as_deref(), Some("Mono"));
        assert_eq!(channel_class(0), None);
    }

    #[test]
    fn test_sdr_when_range_missing() {
        let streams: Vec<MediaStreamDto> = serde_json::from_value(json!([
            {"Type": "Video", "Codec": "h264", "Width": 1920, "Height": 1080, "VideoRange": "SDR"}
        ]))
        .unwrap();
        let profile = derive_profile(&streams);
        assert!(!profile.hdr);
        assert_eq!(profile.resolution.as_deref(), Some("1080p"));
        assert_eq!(profile.audio_channels, None);
    }

    #[test]
    fn test_auth_header_and_base_url() {
        let settings = JellyfinSettings {
            server_url: "http://jellyfin:8096/".to_string(),
            api_key: "secret".to_string(),
            user_id: "user".to_string(),
            timeout: Duration::from_secs(5),
        };
        let http = crate::utils::http_client::build_client(settings.timeout).unwrap();
        let client = JellyfinClient::new(http, &settings);
        assert_eq!(client.base_url, "http://jellyfin:8096");
        assert_eq!(client.auth_header, "MediaBrowser Token=\"secret\"");
    }
}
