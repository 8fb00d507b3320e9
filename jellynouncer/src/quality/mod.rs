//! Quality change detection.
//!
//! Pure comparison of two item snapshots. Each technical dimension has a fixed
//! tier order; values outside the tiers fall back to per-dimension defaults
//! instead of failing.

mod detector;
mod hierarchy;

pub use detector::{detect_changes, format_file_size, is_significant, summarize};
pub use hierarchy::normalize_video_codec;
