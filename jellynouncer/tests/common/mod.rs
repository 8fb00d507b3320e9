//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use jellynouncer::database::{DbPool, init_pool_with_size, run_migrations};
use jellynouncer::domain::{ContentKind, ItemSnapshot, TechnicalProfile};
use jellynouncer::ingest::ItemFetcher;
use jellynouncer::notification::{DeliveryOutcome, DeliveryTransport};

/// In-memory SQLite with the schema applied. A single connection keeps every
/// query on the same database.
pub async fn setup_test_db() -> DbPool {
    let pool = init_pool_with_size("sqlite::memory:", 1)
        .await
        .expect("Failed to create test pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

pub fn movie(id: &str, resolution: &str) -> ItemSnapshot {
    let mut item = ItemSnapshot::new(id, "Heat", ContentKind::Movie, format!("/movies/{id}.mkv"))
        .with_profile(TechnicalProfile {
            resolution: Some(resolution.to_string()),
            video_codec: Some("H264".to_string()),
            audio_codec: Some("AC3".to_string()),
            hdr: false,
            audio_channels: Some("5.1".to_string()),
        })
        .with_size(4_000_000_000);
    item.year = Some(1995);
    item.genres = vec!["Crime".to_string(), "Thriller".to_string()];
    item
}

#[derive(Default)]
pub struct StubFetcher {
    items: Mutex<BTreeMap<String, ItemSnapshot>>,
}

impl StubFetcher {
    pub fn set(&self, item: ItemSnapshot) {
        self.items.lock().insert(item.id.clone(), item);
    }
}

#[async_trait]
impl ItemFetcher for StubFetcher {
    async fn fetch_item(&self, item_id: &str) -> jellynouncer::Result<Option<ItemSnapshot>> {
        Ok(self.items.lock().get(item_id).cloned())
    }

    async fn list_items(&self) -> jellynouncer::Result<Vec<ItemSnapshot>> {
        Ok(self.items.lock().values().cloned().collect())
    }
}

/// Records payloads; answers from a script, then `Delivered`.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<(String, Value)>>,
    script: Mutex<VecDeque<DeliveryOutcome>>,
}

impl RecordingTransport {
    pub fn push_outcome(&self, outcome: DeliveryOutcome) {
        self.script.lock().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    /// Wait until at least `n` deliveries were attempted.
    pub async fn wait_for_calls(&self, n: usize) -> Vec<(String, Value)> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let calls = self.calls();
            if calls.len() >= n || tokio::time::Instant::now() >= deadline {
                return calls;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl DeliveryTransport for RecordingTransport {
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
