//! Domain types shared by the ingestion, detection and notification layers.

pub mod category;
pub mod change;
pub mod event;
pub mod media;

pub use category::NotificationCategory;
pub use change::{ChangeKind, ChangeSet, DetectedChange};
pub use event::{LibraryEvent, LibraryEventKind, payload_kind, payload_name};
pub use media::{ContentKind, ItemSnapshot, QualityFingerprint, TechnicalProfile};
