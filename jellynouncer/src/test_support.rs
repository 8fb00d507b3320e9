//! In-memory collaborators for unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::database::models::NewNotificationLog;
use crate::database::{ItemStore, StoreStats};
use crate::domain::{ChangeSet, DetectedChange, ItemSnapshot};
use crate::ingest::ItemFetcher;
use crate::notification::{DeliveryOutcome, DeliveryTransport};
use crate::{Error, Result};

#[derive(Default)]
pub struct MemoryItemStore {
    items: Mutex<HashMap<String, ItemSnapshot>>,
    notifications: Mutex<Vec<NewNotificationLog>>,
    quality_changes: Mutex<Vec<(String, DetectedChange)>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryItemStore {
    pub fn notifications(&self) -> Vec<NewNotificationLog> {
        self.notifications.lock().clone()
    }

    pub fn quality_changes(&self) -> Vec<(String, DetectedChange)> {
        self.quality_changes.lock().clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `get_stats` fail, as an unreachable database would.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn get(&self, id: &str) -> Result<Option<ItemSnapshot>> {
        Ok(self.items.lock().get(id).cloned())
    }

    async fn get_by_path(&self, path: &str) -> Result<Option<ItemSnapshot>> {
        Ok(self.items.lock().values().find(|i| i.path == path).cloned())
    }

    async fn upsert(&self, item: &ItemSnapshot) -> Result<()> {
        self.check_writable()?;
        self.items.lock().insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.check_writable()?;
        Ok(self.items.lock().remove(id).is_some())
    }

    async fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.items.lock().contains_key(id))
    }

    async fn log_notification(&self, record: &NewNotificationLog) -> Result<i64> {
        self.check_writable()?;
        let mut notifications = self.notifications.lock();
        notifications.push(record.clone());
        Ok(notifications.len() as i64)
    }

    async fn log_quality_changes(&self, item_id: &str, changes: &ChangeSet) -> Result<()> {
        self.check_writable()?;
        self.quality_changes
            .lock()
            .extend(changes.values().map(|c| (item_id.to_string(), c.clone())));
        Ok(())
    }

    async fn get_stats(&self) -> Result<StoreStats> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Storage(sqlx::Error::PoolClosed));
        }
        let items = self.items.lock();
        let mut items_by_kind = BTreeMap::new();
        for item in items.values() {
            *items_by_kind.entry(item.kind.as_str().to_string()).or_insert(0) += 1;
        }
        let mut notifications_by_status = BTreeMap::new();
        for n in self.notifications.lock().iter() {
            *notifications_by_status
                .entry(n.status.as_str().to_string())
                .or_insert(0) += 1;
        }
        Ok(StoreStats {
            total_items: items.len() as i64,
            items_by_kind,
            notifications_by_status,
            quality_changes: self.quality_changes.lock().len() as i64,
        })
    }

    async fn cleanup_old_notifications(&self, _retention_days: i64) -> Result<u64> {
        Ok(0)
    }
}

/// Records every payload; answers from a script, then `Delivered`.
#[derive(Default)]
pub struct FakeTransport {
    calls: Mutex<Vec<(String, Value)>>,
    script: Mutex<VecDeque<DeliveryOutcome>>,
}

impl FakeTransport {
    pub fn scripted(outcomes: impl IntoIterator<Item = DeliveryOutcome>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(outcomes.into_iter().collect()),
        }
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl DeliveryTransport for FakeTransport {
    async fn deliver(&self, destination: &str, payload: &Value) -> DeliveryOutcome {
        self.calls
            .lock()
            .push((destination.to_string(), payload.clone()));
        self.script
            .lock()
            .pop_front()
            .unwrap_or(DeliveryOutcome::Delivered)
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    items: Mutex<BTreeMap<String, ItemSnapshot>>,
    fail_listing: AtomicBool,
}

impl FakeFetcher {
    pub fn insert(&self, item: ItemSnapshot) {
        self.items.lock().insert(item.id.clone(), item);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ItemFetcher for FakeFetcher {
    async fn fetch_item(&self, item_id: &str) -> Result<Option<ItemSnapshot>> {
        Ok(self.items.lock().get(item_id).cloned())
    }

    async fn list_items(&self) -> Result<Vec<ItemSnapshot>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::fetch("connection refused"));
        }
        Ok(self.items.lock().values().cloned().collect())
    }
}
