//! Event ingestion: deletion correlation, classification and library sync.

pub mod deletion;
pub mod fetcher;
pub mod locks;
pub mod processor;
pub mod sync;

pub use deletion::{ConfirmedDeletion, DeletionCorrelator};
pub use fetcher::ItemFetcher;
pub use locks::KeyedLocks;
pub use processor::{EventOutcome, EventProcessor, ProcessorConfig};
pub use sync::{LibrarySync, SyncReport};
