//! Library synchronization.
//!
//! Seeds the store with items the media server knows about but we have never
//! seen, so that later events for them classify against a real snapshot.
//! No notifications are sent for synchronized items.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::fetcher::ItemFetcher;
use super::locks::KeyedLocks;
use crate::database::ItemStore;
use crate::{Error, Result};

/// Counts from one synchronization run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub scanned: usize,
    pub inserted: usize,
    pub failed: usize,
}

/// Bulk import of unseen library items.
pub struct LibrarySync {
    store: Arc<dyn ItemStore>,
    fetcher: Arc<dyn ItemFetcher>,
    locks: KeyedLocks,
    running: AtomicBool,
}

impl LibrarySync {
    pub fn new(store: Arc<dyn ItemStore>, fetcher: Arc<dyn ItemFetcher>, locks: KeyedLocks) -> Self {
        Self {
            store,
            fetcher,
            locks,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one synchronization. Fails if another run is in progress.
    pub async fn run(&self) -> Result<SyncReport> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::Other("library sync already in progress".to_string()));
        }
        let result = self.sync_once().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn sync_once(&self) -> Result<SyncReport> {
        info!("Starting library synchronization");
        let items = self.fetcher.list_items().await?;
        let mut report = SyncReport {
            scanned: items.len(),
            ..Default::default()
        };

        for item in items {
            let _guard = self.locks.lock(&item.id).await;
            match self.store.contains(&item.id).await {
                Ok(true) => {}
                Ok(false) => match self.store.upsert(&item).await {
                    Ok(()) => report.inserted += 1,
                    Err(e) => {
                        warn!(item_id = %item.id, "Failed to store synchronized item: {}", e);
                        report.failed += 1;
                    }
                },
                Err(e) => {
                    warn!(item_id = %item.id, "Failed to look up item during sync: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Library synchronization finished: {} scanned, {} new, {} failed",
            report.scanned, report.inserted, report.failed
        );
        Ok(report)
    }

    /// Run a synchronization every `interval` until `cancel` fires.
    pub fn start_periodic(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.run().await {
                            error!("Library synchronization failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContentKind, ItemSnapshot};
    use crate::test_support::{FakeFetcher, MemoryItemStore};

    #[tokio::test]
    async fn test_sync_inserts_only_unseen_items() {
        let store = Arc::new(MemoryItemStore::default());
        let fetcher = Arc::new(FakeFetcher::default());

        let mut known = ItemSnapshot::new("1", "Known", ContentKind::Movie, "/m/1.mkv");
        store.upsert(&known).await.unwrap();
        known.name = "Changed upstream".to_string();
        fetcher.insert(known);
        fetcher.insert(ItemSnapshot::new("2", "Fresh", ContentKind::Movie, "/m/2.mkv"));

        let sync = LibrarySync::new(store.clone(), fetcher, KeyedLocks::new());
        let report = sync.run().await.unwrap();

        assert_eq!(report, SyncReport { scanned: 2, inserted: 1, failed: 0 });
        assert_eq!(store.get("1").await.unwrap().unwrap().name, "Known");
        assert!(store.get("2").await.unwrap().is_some());
        assert!(!sync.is_running());
    }

    #[tokio::test]
    async fn test_sync_propagates_listing_failure() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.fail_listing(true);
        let sync = LibrarySync::new(Arc::new(MemoryItemStore::default()), fetcher, KeyedLocks::new());

        assert!(matches!(sync.run().await, Err(Error::Fetch(_))));
        assert!(!sync.is_running());
    }
}
