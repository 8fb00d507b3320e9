//! Deletion correlation.
//!
//! Replacing a file in the library shows up upstream as a deletion
//! immediately followed by an addition of the same item id. Deletions are
//! therefore held back for a delay window; an addition arriving inside the
//! window consumes the pending deletion, otherwise the deletion is confirmed
//! and handed to the confirmed-deletion channel exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// A deletion waiting for its delay window to elapse.
#[derive(Debug, Clone)]
pub struct PendingDeletion {
    pub item_id: String,
    pub payload: Value,
    pub arrived_at: DateTime<Utc>,
    generation: u64,
}

/// A deletion whose window elapsed without a replacing addition.
#[derive(Debug, Clone)]
pub struct ConfirmedDeletion {
    pub item_id: String,
    pub payload: Value,
    pub arrived_at: DateTime<Utc>,
}

struct CorrelatorInner {
    pending: DashMap<String, PendingDeletion>,
    delay: Duration,
    next_generation: AtomicU64,
    confirmed_tx: mpsc::UnboundedSender<ConfirmedDeletion>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

/// Holds deletions for `delay` to tell true deletions from replacements.
#[derive(Clone)]
pub struct DeletionCorrelator {
    inner: Arc<CorrelatorInner>,
}

impl DeletionCorrelator {
    /// Create a correlator and the receiving end of its confirmed deletions.
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<ConfirmedDeletion>) {
        let (confirmed_tx, confirmed_rx) = mpsc::unbounded_channel();
        let correlator = Self {
            inner: Arc::new(CorrelatorInner {
                pending: DashMap::new(),
                delay,
                next_generation: AtomicU64::new(1),
                confirmed_tx,
                cancel: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        };
        (correlator, confirmed_rx)
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Record a deletion. Returns `false` if one is already pending for
    /// `item_id`; the first deletion wins and its timer is not reset.
    pub fn add_deletion(&self, item_id: &str, payload: Value) -> bool {
        if self.inner.cancel.is_cancelled() {
            warn!(item_id = %item_id, "Deletion correlator is shut down, ignoring deletion");
            return false;
        }

        let generation = match self.inner.pending.entry(item_id.to_string()) {
            Entry::Occupied(_) => {
                debug!(item_id = %item_id, "Deletion already pending");
                return false;
            }
            Entry::Vacant(slot) => {
                let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                slot.insert(PendingDeletion {
                    item_id: item_id.to_string(),
                    payload,
                    arrived_at: Utc::now(),
                    generation,
                });
                generation
            }
        };

        debug!(item_id = %item_id, "Deletion pending for {:?}", self.inner.delay);

        let inner = self.inner.clone();
        let item_id = item_id.to_string();
        self.inner.tracker.spawn(async move {
            tokio::select! {
                _ = inner.cancel.cancelled() => {}
                _ = tokio::time::sleep(inner.delay) => inner.resolve(&item_id, generation),
            }
        });

        true
    }

    /// Remove and return the pending deletion payload for `item_id`.
    ///
    /// A `Some` result means the item was replaced, not deleted.
    pub fn check_and_consume(&self, item_id: &str) -> Option<Value> {
        self.inner.pending.remove(item_id).map(|(_, pending)| {
            info!(item_id = %item_id, "Pending deletion consumed by re-addition");
            pending.payload
        })
    }

    pub fn is_pending(&self, item_id: &str) -> bool {
        self.inner.pending.contains_key(item_id)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Cancel all timers. Deletions still pending are dropped without a
    /// notice and are logged.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;

        let dropped: Vec<String> = self
            .inner
            .pending
            .iter()
            .map(|p| p.key().clone())
            .collect();
        for item_id in &dropped {
            self.inner.pending.remove(item_id);
            warn!(item_id = %item_id, "Dropping unresolved deletion on shutdown");
        }
        if !dropped.is_empty() {
            info!("Dropped {} pending deletions on shutdown", dropped.len());
        }
    }
}

impl CorrelatorInner {
    /// Hand the deletion off if it is still the one this timer was armed for.
    fn resolve(&self, item_id: &str, generation: u64) {
        let Some((_, pending)) = self
            .pending
            .remove_if(item_id, |_, p| p.generation == generation)
        else {
            return;
        };

        info!(item_id = %item_id, "Deletion confirmed after {:?}", self.delay);
        let confirmed = ConfirmedDeletion {
            item_id: pending.item_id,
            payload: pending.payload,
            arrived_at: pending.arrived_at,
        };
        if self.confirmed_tx.send(confirmed).is_err() {
            warn!(item_id = %item_id, "Confirmed deletion dropped, no receiver");
        }
    }
}
