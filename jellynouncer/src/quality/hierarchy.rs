//! Ordered quality tiers per dimension.

const RESOLUTION_TIERS: &[&str] = &["480p", "720p", "1080p", "4K", "8K"];
const VIDEO_CODEC_TIERS: &[&str] = &["MPEG2", "H264", "H265", "AV1"];
const AUDIO_CODEC_TIERS: &[&str] = &["MP3", "AAC", "AC3", "DTS", "TRUEHD", "ATMOS"];
const CHANNEL_TIERS: &[&str] = &["Mono", "Stereo", "5.1", "7.1"];

fn tier(tiers: &[&str], value: &str) -> Option<usize> {
    tiers.iter().position(|t| *t == value)
}

/// Resolution upgrade. Untiered values compare by the width of a "WxH" string.
pub fn is_resolution_upgrade(old: Option<&str>, new: Option<&str>) -> bool {
    let (Some(old), Some(new)) = (old, new) else {
        return false;
    };

    match (tier(RESOLUTION_TIERS, old), tier(RESOLUTION_TIERS, new)) {
        (Some(o), Some(n)) => n > o,
        _ => pixel_width(new) > pixel_width(old),
    }
}

/// Width of a "WxH" resolution string, 0 when it does not parse.
fn pixel_width(resolution: &str) -> u32 {
    resolution
        .split_once('x')
        .and_then(|(w, _)| w.trim().parse().ok())
        .unwrap_or(0)
}

/// Map common codec spellings onto the tier names.
pub fn normalize_video_codec(codec: &str) -> String {
    let upper = codec.to_ascii_uppercase();
    if upper.contains("H264") || upper.contains("AVC") {
        "H264".to_string()
    } else if upper.contains("H265") || upper.contains("HEVC") {
        "H265".to_string()
    } else if upper.contains("AV1") {
        "AV1".to_string()
    } else if upper.contains("MPEG2") {
        "MPEG2".to_string()
    } else {
        upper
    }
}

/// Video codec upgrade. Untiered codecs count as an upgrade when they differ.
pub fn is_video_codec_upgrade(old: Option<&str>, new: Option<&str>) -> bool {
    let (Some(old), Some(new)) = (old, new) else {
        return false;
    };
    let old = normalize_video_codec(old);
    let new = normalize_video_codec(new);

    match (tier(VIDEO_CODEC_TIERS, &old), tier(VIDEO_CODEC_TIERS, &new)) {
        (Some(o), Some(n)) => n > o,
        _ => old != new,
    }
}

/// Audio codec upgrade. Untiered codecs count as an upgrade when they differ.
pub fn is_audio_codec_upgrade(old: Option<&str>, new: Option<&str>) -> bool {
    let (Some(old), Some(new)) = (old, new) else {
        return false;
    };
    let old = old.to_ascii_uppercase();
    let new = new.to_ascii_uppercase();

    match (tier(AUDIO_CODEC_TIERS, &old), tier(AUDIO_CODEC_TIERS, &new)) {
        (Some(o), Some(n)) => n > o,
        _ => old != new,
    }
}

/// Channel layout upgrade. Untiered layouts are never an upgrade.
pub fn is_channel_upgrade(old: Option<&str>, new: Option<&str>) -> bool {
    let (Some(old), Some(new)) = (old, new) else {
        return false;
    };

    match (tier(CHANNEL_TIERS, old), tier(CHANNEL_TIERS, new)) {
        (Some(o), Some(n)) => n > o,
        _ => false,
    }
}
