//! Media item snapshots and their quality fingerprint.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of library content.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum::Display,
)]
pub enum ContentKind {
    Movie,
    Series,
    Episode,
    Audio,
    Album,
    /// Anything the media server reports that we do not route specifically.
    Other,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "Movie",
            Self::Series => "Series",
            Self::Episode => "Episode",
            Self::Audio => "Audio",
            Self::Album => "Album",
            Self::Other => "Other",
        }
    }

    /// Parse a stored or upstream type name. Jellyfin calls albums `MusicAlbum`.
    pub fn parse(s: &str) -> Self {
        match s {
            "Movie" => Self::Movie,
            "Series" => Self::Series,
            "Episode" => Self::Episode,
            "Audio" => Self::Audio,
            "Album" | "MusicAlbum" => Self::Album,
            _ => Self::Other,
        }
    }

    /// Webhook key this kind is routed to when routing is enabled.
    pub fn route_key(&self) -> &'static str {
        match self {
            Self::Movie => "movies",
            Self::Series | Self::Episode => "tv",
            Self::Audio | Self::Album => "music",
            Self::Other => "default",
        }
    }
}

/// Technical properties that decide whether a file changed in quality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnicalProfile {
    /// Resolution class: a named tier ("1080p", "4K") or "WxH".
    pub resolution: Option<String>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub hdr: bool,
    /// Channel class: "Mono", "Stereo", "5.1", "7.1".
    pub audio_channels: Option<String>,
}

impl TechnicalProfile {
    /// Deterministic digest over the technical fields only.
    ///
    /// Each field is written with a tag and a length prefix so that neither
    /// field order in the struct nor separator characters inside values can
    /// make two different profiles collide.
    pub fn fingerprint(&self) -> QualityFingerprint {
        let mut hasher = Sha256::new();
        write_field(&mut hasher, "resolution", self.resolution.as_deref());
        write_field(&mut hasher, "video_codec", self.video_codec.as_deref());
        write_field(&mut hasher, "audio_codec", self.audio_codec.as_deref());
        write_field(
            &mut hasher,
            "hdr",
            Some(if self.hdr { "HDR" } else { "SDR" }),
        );
        write_field(&mut hasher, "audio_channels", self.audio_channels.as_deref());
        QualityFingerprint(hex::encode(hasher.finalize()))
    }
}

fn write_field(hasher: &mut Sha256, tag: &str, value: Option<&str>) {
    hasher.update(tag.as_bytes());
    match value {
        Some(v) => {
            hasher.update(b":");
            hasher.update((v.len() as u64).to_le_bytes());
            hasher.update(v.as_bytes());
        }
        None => hasher.update(b"-"),
    }
    hasher.update(b";");
}

/// Hex-encoded SHA-256 of a [`TechnicalProfile`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityFingerprint(String);

impl QualityFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QualityFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last known state of one media item. Always stored and replaced as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: String,
    pub name: String,
    pub kind: ContentKind,
    pub path: String,
    /// File size in bytes.
    pub size: Option<i64>,
    pub modified_at: Option<DateTime<Utc>>,
    pub profile: TechnicalProfile,

    pub year: Option<i32>,
    pub overview: Option<String>,
    pub series_name: Option<String>,
    pub season_number: Option<i32>,
    pub episode_number: Option<i32>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl ItemSnapshot {
    /// Create a snapshot with only identity fields set.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: ContentKind,
        path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            path: path.into(),
            size: None,
            modified_at: None,
            profile: TechnicalProfile::default(),
            year: None,
            overview: None,
            series_name: None,
            season_number: None,
            episode_number: None,
            genres: Vec::new(),
        }
    }

    pub fn with_profile(mut self, profile: TechnicalProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn fingerprint(&self) -> QualityFingerprint {
        self.profile.fingerprint()
    }

    /// Title used in notifications, e.g. "Show S01E02 - Pilot".
    pub fn display_title(&self) -> String {
        match (self.kind, &self.series_name) {
            (ContentKind::Episode, Some(series)) => match (self.season_number, self.episode_number) {
                (Some(s), Some(e)) => format!("{} S{:02}E{:02} - {}", series, s, e, self.name),
                _ => format!("{} - {}", series, self.name),
            },
            _ => match self.year {
                Some(year) => format!("{} ({})", self.name, year),
                None => self.name.clone(),
            },
        }
    }
}
