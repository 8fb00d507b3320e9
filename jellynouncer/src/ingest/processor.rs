//! Event classification.
//!
//! Turns upstream library events into notification decisions. All work for
//! one item id, including confirmed deletions coming back from the
//! correlator, runs under that id's lock.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::deletion::{ConfirmedDeletion, DeletionCorrelator};
use super::fetcher::ItemFetcher;
use super::locks::KeyedLocks;
use crate::Result;
use crate::database::ItemStore;
use crate::domain::{ChangeKind, LibraryEvent, LibraryEventKind};
use crate::notification::{NotificationEntry, NotificationQueue, Router};
use crate::quality::{detect_changes, is_significant, summarize};

/// Behaviour switches for classification.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Treat a name change at an unchanged path as a silent rename.
    pub filter_renames: bool,
    /// Hold deletions back to detect replace-style upgrades.
    pub filter_deletes: bool,
    /// Change kinds that count towards an upgrade decision.
    pub watched: BTreeSet<ChangeKind>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            filter_renames: true,
            filter_deletes: true,
            watched: ChangeKind::ALL.into_iter().collect(),
        }
    }
}

/// What handling an event decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum EventOutcome {
    /// First sighting of the item; a new-item notification was queued.
    NewItem,
    /// Significant quality change; an upgrade notification was queued.
    Upgraded,
    /// Known item without watched or significant changes.
    Unchanged,
    /// A pending deletion was consumed and the item came back unchanged.
    ReplacedWithoutChange,
    /// A pending deletion was consumed and the item came back changed.
    Replaced,
    /// Same file under a new name; stored without notification.
    Renamed,
    /// The media server does not know the item.
    NotFound,
    /// Deletion held back by the correlator.
    DeletionPending,
    /// A deletion for this item was already pending.
    DuplicateDeletion,
    /// Deletion dispatched right away.
    Deleted,
}

/// Classifies library events and feeds the notification queue.
pub struct EventProcessor {
    store: Arc<dyn ItemStore>,
    fetcher: Arc<dyn ItemFetcher>,
    correlator: DeletionCorrelator,
    queue: NotificationQueue,
    router: Router,
    locks: KeyedLocks,
    config: ProcessorConfig,
}

impl EventProcessor {
    pub fn new(
        store: Arc<dyn ItemStore>,
        fetcher: Arc<dyn ItemFetcher>,
        correlator: DeletionCorrelator,
        queue: NotificationQueue,
        router: Router,
        locks: KeyedLocks,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            correlator,
            queue,
            router,
            locks,
            config,
        }
    }

    pub fn correlator(&self) -> &DeletionCorrelator {
        &self.correlator
    }

    pub fn queue(&self) -> &NotificationQueue {
        &self.queue
    }

    /// [`Self::handle`] with errors logged instead of returned.
    pub async fn process(&self, event: LibraryEvent) -> Option<EventOutcome> {
        let item_id = event.item_id.clone();
        let kind = event.kind;
        match self.handle(event).await {
            Ok(outcome) => {
                debug!(item_id = %item_id, event = %kind, outcome = %outcome, "Event processed");
                Some(outcome)
            }
            Err(e) => {
                error!(item_id = %item_id, event = %kind, "Failed to process event: {}", e);
                None
            }
        }
    }

    pub async fn handle(&self, event: LibraryEvent) -> Result<EventOutcome> {
        let _guard = self.locks.lock(&event.item_id).await;
        match event.kind {
            LibraryEventKind::Added => self.handle_added(&event.item_id).await,
            LibraryEventKind::Deleted => {
                self.handle_deleted(&event.item_id, event.raw_payload)
                    .await
            }
        }
    }

    async fn handle_deleted(&self, item_id: &str, payload: Value) -> Result<EventOutcome> {
        if !self.config.filter_deletes {
            self.dispatch_deletion(item_id, payload).await?;
            return Ok(EventOutcome::Deleted);
        }

        if self.correlator.add_deletion(item_id, payload) {
            Ok(EventOutcome::DeletionPending)
        } else {
            Ok(EventOutcome::DuplicateDeletion)
        }
    }

    async fn handle_added(&self, item_id: &str) -> Result<EventOutcome> {
        let replaced = self.correlator.check_and_consume(item_id).is_some();

        let Some(item) = self.fetcher.fetch_item(item_id).await? else {
            warn!(item_id = %item_id, "Could not retrieve item from media server");
            return Ok(EventOutcome::NotFound);
        };

        // A missing path identifies nothing.
        if self.config.filter_renames
            && !item.path.trim().is_empty()
            && let Some(existing) = self.store.get_by_path(&item.path).await?
            && existing.kind == item.kind
            && existing.name != item.name
        {
            info!(
                item_id = %item.id,
                "Detected rename: {} -> {}",
                existing.name,
                item.name
            );
            if existing.id != item.id {
                self.store.delete(&existing.id).await?;
            }
            self.store.upsert(&item).await?;
            return Ok(EventOutcome::Renamed);
        }

        let outcome = match self.store.get(&item.id).await? {
            None => {
                info!(item_id = %item.id, "New {}: {}", item.kind, item.display_title());
                match self.router.resolve(item.kind) {
                    Some(destination) => {
                        self.queue
                            .enqueue(NotificationEntry::new_item(destination, item.clone()));
                    }
                    None => debug!(item_id = %item.id, "No webhook configured for {}", item.kind),
                }
                EventOutcome::NewItem
            }
            Some(existing) => {
                let mut changes = detect_changes(&existing, &item);
                changes.retain(|kind, _| self.config.watched.contains(kind));

                if changes.is_empty() {
                    debug!(item_id = %item.id, "No watched changes for {}", item.name);
                    if replaced {
                        EventOutcome::ReplacedWithoutChange
                    } else {
                        EventOutcome::Unchanged
                    }
                } else if replaced {
                    info!(
                        item_id = %item.id,
                        "Item replaced: {}",
                        summarize(&changes)
                    );
                    EventOutcome::Replaced
                } else if is_significant(&changes) {
                    info!(item_id = %item.id, "Upgrade for {}: {}", item.name, summarize(&changes));
                    if let Err(e) = self.store.log_quality_changes(&item.id, &changes).await {
                        warn!(item_id = %item.id, "Failed to log quality changes: {}", e);
                    }
                    match self.router.resolve(item.kind) {
                        Some(destination) => self.queue.enqueue(NotificationEntry::upgrade(
                            destination,
                            item.clone(),
                            changes,
                        )),
                        None => {
                            debug!(item_id = %item.id, "No webhook configured for {}", item.kind)
                        }
                    }
                    EventOutcome::Upgraded
                } else {
                    debug!(item_id = %item.id, "Changes not significant: {}", summarize(&changes));
                    EventOutcome::Unchanged
                }
            }
        };

        self.store.upsert(&item).await?;
        Ok(outcome)
    }

    /// Dispatch a deletion the correlator confirmed.
    pub async fn handle_confirmed_deletion(&self, deletion: ConfirmedDeletion) -> Result<()> {
        let _guard = self.locks.lock(&deletion.item_id).await;
        self.dispatch_deletion(&deletion.item_id, deletion.payload)
            .await
    }

    async fn dispatch_deletion(&self, item_id: &str, payload: Value) -> Result<()> {
        let snapshot = match self.store.get(item_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(item_id = %item_id, "Failed to load snapshot for deletion: {}", e);
                None
            }
        };

        match self.router.deletion_destination() {
            Some(destination) => {
                let entry = NotificationEntry::deletion(destination, item_id, snapshot, payload);
                info!(item_id = %item_id, "Deleted: {}", entry.item_name);
                self.queue.enqueue(entry);
            }
            None => debug!(item_id = %item_id, "No default webhook configured for deletions"),
        }

        self.store.delete(item_id).await?;
        Ok(())
    }

    /// Consume confirmed deletions until `cancel` fires.
    pub async fn run_confirmed_deletions(
        self: Arc<Self>,
        mut confirmed: mpsc::UnboundedReceiver<ConfirmedDeletion>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = confirmed.recv() => {
                    let Some(deletion) = next else { break };
                    let item_id = deletion.item_id.clone();
                    if let Err(e) = self.handle_confirmed_deletion(deletion).await {
                        error!(item_id = %item_id, "Failed to dispatch deletion: {}", e);
                    }
                }
            }
        }

        // Deletions confirmed before the correlator stopped still go out.
        while let Ok(deletion) = confirmed.try_recv() {
            let item_id = deletion.item_id.clone();
            if let Err(e) = self.handle_confirmed_deletion(deletion).await {
                error!(item_id = %item_id, "Failed to dispatch deletion: {}", e);
            }
        }
        debug!("Confirmed deletion consumer stopped");
    }
}
