//! Detected quality changes between two snapshots.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Dimension a change was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Resolution,
    VideoCodec,
    AudioCodec,
    Hdr,
    AudioChannels,
    FileSize,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 6] = [
        Self::Resolution,
        Self::VideoCodec,
        Self::AudioCodec,
        Self::Hdr,
        Self::AudioChannels,
        Self::FileSize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolution => "resolution",
            Self::VideoCodec => "video_codec",
            Self::AudioCodec => "audio_codec",
            Self::Hdr => "hdr",
            Self::AudioChannels => "audio_channels",
            Self::FileSize => "file_size",
        }
    }

    /// Human label used in notification fields.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Resolution => "Resolution",
            Self::VideoCodec => "Video Codec",
            Self::AudioCodec => "Audio Codec",
            Self::Hdr => "HDR",
            Self::AudioChannels => "Audio Channels",
            Self::FileSize => "File Size",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One differing field group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedChange {
    pub kind: ChangeKind,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub is_upgrade: bool,
}

impl fmt::Display for DetectedChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = if self.is_upgrade { "upgraded" } else { "changed" };
        write!(
            f,
            "{} {} from {} to {}",
            self.kind,
            direction,
            self.old_value.as_deref().unwrap_or("unknown"),
            self.new_value.as_deref().unwrap_or("unknown"),
        )
    }
}

/// Changes keyed by dimension, iterated in a fixed order.
pub type ChangeSet = BTreeMap<ChangeKind, DetectedChange>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_display() {
        let change = DetectedChange {
            kind: ChangeKind::Resolution,
            old_value: Some("720p".to_string()),
            new_value: Some("4K".to_string()),
            is_upgrade: true,
        };
        assert_eq!(change.to_string(), "resolution upgraded from 720p to 4K");
    }

    #[test]
    fn test_change_kind_serde() {
        let json = serde_json::to_string(&ChangeKind::AudioChannels).unwrap();
        assert_eq!(json, "\"audio_channels\"");
    }
}
