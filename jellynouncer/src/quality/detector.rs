//! Snapshot comparison.

use tracing::debug;

use super::hierarchy::{
    is_audio_codec_upgrade, is_channel_upgrade, is_resolution_upgrade, is_video_codec_upgrade,
};
use crate::domain::{ChangeKind, ChangeSet, DetectedChange, ItemSnapshot};

/// Size growth (in percent of the old size) reported as an implicit upgrade.
const FILE_SIZE_UPGRADE_PERCENT: i128 = 50;

/// Compare two snapshots and report every differing technical dimension.
pub fn detect_changes(old: &ItemSnapshot, new: &ItemSnapshot) -> ChangeSet {
    let mut changes = ChangeSet::new();
    let (o, n) = (&old.profile, &new.profile);

    let mut push = |kind, old_value: Option<&str>, new_value: Option<&str>, is_upgrade| {
        let change = DetectedChange {
            kind,
            old_value: old_value.map(str::to_string),
            new_value: new_value.map(str::to_string),
            is_upgrade,
        };
        debug!(item_id = %new.id, "{}", change);
        changes.insert(kind, change);
    };

    if o.resolution != n.resolution {
        let (a, b) = (o.resolution.as_deref(), n.resolution.as_deref());
        push(ChangeKind::Resolution, a, b, is_resolution_upgrade(a, b));
    }

    if o.video_codec != n.video_codec {
        let (a, b) = (o.video_codec.as_deref(), n.video_codec.as_deref());
        push(ChangeKind::VideoCodec, a, b, is_video_codec_upgrade(a, b));
    }

    if o.audio_codec != n.audio_codec {
        let (a, b) = (o.audio_codec.as_deref(), n.audio_codec.as_deref());
        push(ChangeKind::AudioCodec, a, b, is_audio_codec_upgrade(a, b));
    }

    if o.hdr != n.hdr {
        push(
            ChangeKind::Hdr,
            Some(hdr_label(o.hdr)),
            Some(hdr_label(n.hdr)),
            n.hdr && !o.hdr,
        );
    }

    if o.audio_channels != n.audio_channels {
        let (a, b) = (o.audio_channels.as_deref(), n.audio_channels.as_deref());
        push(ChangeKind::AudioChannels, a, b, is_channel_upgrade(a, b));
    }

    if let (Some(old_size), Some(new_size)) = (old.size, new.size)
        && old_size > 0
        && size_jumped(old_size, new_size)
    {
        push(
            ChangeKind::FileSize,
            Some(format_file_size(old_size).as_str()),
            Some(format_file_size(new_size).as_str()),
            true,
        );
    }

    changes
}

fn hdr_label(hdr: bool) -> &'static str {
    if hdr { "HDR" } else { "SDR" }
}

fn size_jumped(old_size: i64, new_size: i64) -> bool {
    let (old_size, new_size) = (old_size as i128, new_size as i128);
    (new_size - old_size) * 100 > old_size * FILE_SIZE_UPGRADE_PERCENT
}

/// Whether a change set warrants a notification.
pub fn is_significant(changes: &ChangeSet) -> bool {
    if changes.is_empty() {
        return false;
    }

    changes.values().any(|c| c.is_upgrade)
        || changes.len() >= 3
        || changes
            .get(&ChangeKind::Hdr)
            .is_some_and(|c| c.new_value.as_deref() == Some("HDR"))
}

/// One-line summary, upgrades first.
pub fn summarize(changes: &ChangeSet) -> String {
    if changes.is_empty() {
        return "No significant changes detected".to_string();
    }

    let (upgrades, others): (Vec<_>, Vec<_>) = changes.values().partition(|c| c.is_upgrade);
    let join = |list: &[&DetectedChange]| {
        list.iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut parts = Vec::new();
    if !upgrades.is_empty() {
        parts.push(format!("Upgrades: {}", join(&upgrades)));
    }
    if !others.is_empty() {
        parts.push(format!("Changes: {}", join(&others)));
    }
    parts.join("; ")
}

/// Human readable byte count ("1.5 GB").
pub fn format_file_size(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size.abs() < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} PB", size)
}
