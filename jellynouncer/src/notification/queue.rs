//! Per-destination notification queue.
//!
//! Each destination either delivers every entry on its own
//! ([`DeliveryMode::Immediate`]) or collects entries into a buffer that is
//! flushed once no new entry arrived for `delay`, or as soon as it holds
//! `max_items` entries ([`DeliveryMode::Batched`]).
//!
//! Every delivery goes through the sliding window limiter. A rate-limited
//! attempt is retried exactly once after the hint the destination returned.
//! At most one delivery per destination is in flight at any time.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::entry::NotificationEntry;
use super::rate_limiter::SlidingWindowLimiter;
use super::template::NotificationTemplate;
use super::transport::{DeliveryOutcome, DeliveryTransport};
use crate::database::{ItemStore, NewNotificationLog};
use crate::ingest::KeyedLocks;
use crate::{Error, Result};

/// How a destination groups its notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    #[default]
    Immediate,
    Batched { delay: Duration, max_items: usize },
}

impl DeliveryMode {
    pub fn batched_default() -> Self {
        Self::Batched {
            delay: Duration::from_secs(5 * 60),
            max_items: 20,
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Mode per destination key.
    pub modes: HashMap<String, DeliveryMode>,
    /// Mode for destinations without an entry in `modes`.
    pub default_mode: DeliveryMode,
    /// How long shutdown waits for in-flight deliveries before cancelling them.
    pub shutdown_grace: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            modes: HashMap::new(),
            default_mode: DeliveryMode::Immediate,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

#[derive(Default)]
struct BatchSlot {
    entries: Vec<NotificationEntry>,
    timer: Option<CancellationToken>,
    /// Bumped on every re-arm and every take; a firing timer only flushes
    /// the generation it was armed for.
    generation: u64,
}

impl BatchSlot {
    fn take(&mut self) -> Vec<NotificationEntry> {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.generation += 1;
        std::mem::take(&mut self.entries)
    }
}

struct QueueInner {
    config: QueueConfig,
    buffers: DashMap<String, BatchSlot>,
    limiter: SlidingWindowLimiter,
    transport: Arc<dyn DeliveryTransport>,
    template: Arc<dyn NotificationTemplate>,
    store: Arc<dyn ItemStore>,
    in_flight: KeyedLocks,
    tracker: TaskTracker,
    /// Cancels debounce timers.
    timers: CancellationToken,
    /// Cancels deliveries still waiting for a slot or a retry.
    deliveries: CancellationToken,
    closed: AtomicBool,
}

/// Batching and delivery scheduling in front of a [`DeliveryTransport`].
#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<QueueInner>,
}

impl NotificationQueue {
    pub fn new(
        config: QueueConfig,
        limiter: SlidingWindowLimiter,
        transport: Arc<dyn DeliveryTransport>,
        template: Arc<dyn NotificationTemplate>,
        store: Arc<dyn ItemStore>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                config,
                buffers: DashMap::new(),
                limiter,
                transport,
                template,
                store,
                in_flight: KeyedLocks::new(),
                tracker: TaskTracker::new(),
                timers: CancellationToken::new(),
                deliveries: CancellationToken::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn mode_for(&self, destination: &str) -> DeliveryMode {
        self.inner.mode_for(destination)
    }

    /// Queue `entry` for its destination. Never blocks.
    pub fn enqueue(&self, entry: NotificationEntry) {
        if self.inner.closed.load(Ordering::SeqCst) {
            warn!(
                destination = %entry.destination,
                item_id = %entry.item_id,
                "Notification queue is shut down, dropping {} notification",
                entry.category
            );
            return;
        }

        match self.inner.mode_for(&entry.destination) {
            DeliveryMode::Immediate => {
                let destination = entry.destination.clone();
                self.inner.spawn_delivery(destination, vec![entry]);
            }
            DeliveryMode::Batched { delay, max_items } => {
                self.inner.append(entry, delay, max_items);
            }
        }
    }

    /// Deliver whatever `destination` has buffered now. Returns the entry count.
    pub fn flush(&self, destination: &str) -> usize {
        let batch = match self.inner.buffers.get_mut(destination) {
            Some(mut slot) if !slot.entries.is_empty() => slot.take(),
            _ => return 0,
        };
        let count = batch.len();
        self.inner.spawn_delivery(destination.to_string(), batch);
        count
    }

    /// Entries buffered for `destination`.
    pub fn pending(&self, destination: &str) -> usize {
        self.inner
            .buffers
            .get(destination)
            .map(|slot| slot.entries.len())
            .unwrap_or(0)
    }

    /// Entries buffered across all destinations.
    pub fn pending_total(&self) -> usize {
        self.inner
            .buffers
            .iter()
            .map(|slot| slot.entries.len())
            .sum()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stop timers, flush every buffer and wait for in-flight deliveries.
    ///
    /// Deliveries still running after the grace period are cancelled; their
    /// entries are logged as failed.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.timers.cancel();

        let destinations: Vec<String> = self
            .inner
            .buffers
            .iter()
            .map(|slot| slot.key().clone())
            .collect();
        for destination in destinations {
            let flushed = self.flush(&destination);
            if flushed > 0 {
                info!(
                    destination = %destination,
                    "Flushing {} buffered notifications on shutdown",
                    flushed
                );
            }
        }

        self.inner.tracker.close();
        let grace = self.inner.config.shutdown_grace;
        if tokio::time::timeout(grace, self.inner.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                "Deliveries still pending after {:?}, cancelling remaining work",
                grace
            );
            self.inner.deliveries.cancel();
            self.inner.tracker.wait().await;
        }
        debug!("Notification queue shut down");
    }
}

impl QueueInner {
    fn mode_for(&self, destination: &str) -> DeliveryMode {
        self.config
            .modes
            .get(destination)
            .copied()
            .unwrap_or(self.config.default_mode)
    }

    fn spawn_delivery(self: &Arc<Self>, destination: String, entries: Vec<NotificationEntry>) {
        let inner = self.clone();
        self.tracker.spawn(async move {
            inner.deliver(&destination, entries).await;
        });
    }

    fn append(self: &Arc<Self>, entry: NotificationEntry, delay: Duration, max_items: usize) {
        let destination = entry.destination.clone();

        // Append and timer re-arm happen under the same shard guard.
        let mut slot = self.buffers.entry(destination.clone()).or_default();
        slot.entries.push(entry);

        if slot.entries.len() >= max_items.max(1) {
            let batch = slot.take();
            drop(slot);
            debug!(destination = %destination, "Batch full, flushing {} notifications", batch.len());
            self.spawn_delivery(destination, batch);
            return;
        }

        if let Some(timer) = slot.timer.take() {
            timer.cancel();
        }
        slot.generation += 1;
        let generation = slot.generation;
        let token = self.timers.child_token();
        slot.timer = Some(token.clone());
        let buffered = slot.entries.len();
        drop(slot);

        debug!(
            destination = %destination,
            "Buffered notification ({} pending), flushing in {:?}",
            buffered,
            delay
        );

        let inner = self.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => inner.flush_generation(&destination, generation),
            }
        });
    }

    fn flush_generation(self: &Arc<Self>, destination: &str, generation: u64) {
        let batch = {
            let Some(mut slot) = self.buffers.get_mut(destination) else {
                return;
            };
            if slot.generation != generation || slot.entries.is_empty() {
                return;
            }
            slot.take()
        };
        debug!(destination = %destination, "Batch delay elapsed, flushing {} notifications", batch.len());
        self.spawn_delivery(destination.to_string(), batch);
    }

    async fn deliver(&self, destination: &str, entries: Vec<NotificationEntry>) {
        let result = self.attempt(destination, &entries).await;

        match &result {
            Ok(()) => info!(
                destination = %destination,
                "Delivered {} notification(s)",
                entries.len()
            ),
            Err(e) => warn!(
                destination = %destination,
                "Failed to deliver {} notification(s): {}",
                entries.len(),
                e
            ),
        }

        for entry in &entries {
            let record = match &result {
                Ok(()) => NewNotificationLog::sent(entry.category, &entry.item_id, &entry.item_name),
                Err(e) => NewNotificationLog::failed(
                    entry.category,
                    &entry.item_id,
                    &entry.item_name,
                    e.to_string(),
                ),
            }
            .with_destination(destination);

            if let Err(e) = self.store.log_notification(&record).await {
                warn!(item_id = %entry.item_id, "Failed to log notification: {}", e);
            }
        }
    }

    async fn attempt(&self, destination: &str, entries: &[NotificationEntry]) -> Result<()> {
        let payload = self.template.render(entries)?;

        let _sending = tokio::select! {
            _ = self.deliveries.cancelled() => return Err(Error::Cancelled),
            guard = self.in_flight.lock(destination) => guard,
        };
        self.limiter
            .wait_for_slot(destination, &self.deliveries)
            .await?;
        match self.transport.deliver(destination, &payload).await {
            DeliveryOutcome::Delivered => return Ok(()),
            DeliveryOutcome::Failed(reason) => return Err(Error::Delivery(reason)),
            DeliveryOutcome::RateLimited { retry_after } => {
                warn!(
                    destination = %destination,
                    "Rate limited by destination, retrying once in {:?}",
                    retry_after
                );
                tokio::select! {
                    _ = self.deliveries.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(retry_after) => {}
                }
            }
        }

        self.limiter
            .wait_for_slot(destination, &self.deliveries)
            .await?;
        match self.transport.deliver(destination, &payload).await {
            DeliveryOutcome::Delivered => Ok(()),
            DeliveryOutcome::RateLimited { retry_after } => Err(Error::RateLimited { retry_after }),
            DeliveryOutcome::Failed(reason) => Err(Error::Delivery(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::NotificationStatus;
    use crate::domain::{ContentKind, ItemSnapshot};
    use crate::notification::rate_limiter::RateLimitConfig;
    use crate::notification::template::DiscordEmbedTemplate;
    use crate::test_support::{FakeTransport, MemoryItemStore};

    fn entry(destination: &str, id: &str) -> NotificationEntry {
        NotificationEntry::new_item(
            destination,
            ItemSnapshot::new(id, format!("Item {}", id), ContentKind::Movie, format!("/m/{}.mkv", id)),
        )
    }

    fn queue(
        modes: &[(&str, DeliveryMode)],
        transport: Arc<FakeTransport>,
        store: Arc<MemoryItemStore>,
    ) -> NotificationQueue {
        queue_with_limit(modes, transport, store, RateLimitConfig::default())
    }

    fn queue_with_limit(
        modes: &[(&str, DeliveryMode)],
        transport: Arc<FakeTransport>,
        store: Arc<MemoryItemStore>,
        limit: RateLimitConfig,
    ) -> NotificationQueue {
        NotificationQueue::new(
            QueueConfig {
                modes: modes.iter().map(|(k, m)| (k.to_string(), *m)).collect(),
                ..Default::default()
            },
            SlidingWindowLimiter::new(limit),
            transport,
            Arc::new(DiscordEmbedTemplate::default()),
            store,
        )
    }

    fn batched(delay_secs: u64, max_items: usize) -> DeliveryMode {
        DeliveryMode::Batched {
            delay: Duration::from_secs(delay_secs),
            max_items,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_delivers_each_entry() {
        let transport = Arc::new(FakeTransport::default());
        let store = Arc::new(MemoryItemStore::default());
        let queue = queue(&[], transport.clone(), store.clone());

        queue.enqueue(entry("movies", "1"));
        queue.enqueue(entry("movies", "2"));
        queue.shutdown().await;

        assert_eq!(transport.calls().len(), 2);
        let logged = store.notifications();
        assert_eq!(logged.len(), 2);
        assert!(logged.iter().all(|n| n.status == NotificationStatus::Sent));
        assert!(logged.iter().all(|n| n.destination.as_deref() == Some("movies")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_debounces_into_one_delivery() {
        let transport = Arc::new(FakeTransport::default());
        let store = Arc::new(MemoryItemStore::default());
        let queue = queue(&[("tv", batched(300, 20))], transport.clone(), store.clone());

        queue.enqueue(entry("tv", "1"));
        tokio::time::sleep(Duration::from_secs(120)).await;
        queue.enqueue(entry("tv", "2"));
        tokio::time::sleep(Duration::from_secs(120)).await;
        queue.enqueue(entry("tv", "3"));

        // 240s after the first entry: the re-armed timer has not fired.
        assert!(transport.calls().is_empty());
        assert_eq!(queue.pending("tv"), 3);

        tokio::time::sleep(Duration::from_secs(301)).await;

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["embeds"].as_array().unwrap().len(), 3);
        assert_eq!(queue.pending("tv"), 0);
        assert_eq!(store.notifications().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_flushes_at_max_items() {
        let transport = Arc::new(FakeTransport::default());
        let store = Arc::new(MemoryItemStore::default());
        let queue = queue(&[("tv", batched(300, 2))], transport.clone(), store.clone());

        queue.enqueue(entry("tv", "1"));
        queue.enqueue(entry("tv", "2"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(transport.calls().len(), 1);
        assert_eq!(queue.pending("tv"), 0);

        // The cancelled timer must not deliver an empty or duplicate batch.
        tokio::time::sleep(Duration::from_secs(400)).await;
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending_batches() {
        let transport = Arc::new(FakeTransport::default());
        let store = Arc::new(MemoryItemStore::default());
        let queue = queue(
            &[("tv", batched(300, 20)), ("music", batched(300, 20))],
            transport.clone(),
            store.clone(),
        );

        queue.enqueue(entry("tv", "1"));
        queue.enqueue(entry("music", "2"));
        queue.shutdown().await;

        assert_eq!(transport.calls().len(), 2);
        assert_eq!(queue.pending_total(), 0);

        // Entries after shutdown are dropped.
        queue.enqueue(entry("tv", "3"));
        assert_eq!(queue.pending("tv"), 0);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_retried_once() {
        let transport = Arc::new(FakeTransport::scripted([DeliveryOutcome::RateLimited {
            retry_after: Duration::from_secs(2),
        }]));
        let store = Arc::new(MemoryItemStore::default());
        let queue = queue(&[], transport.clone(), store.clone());

        queue.enqueue(entry("movies", "1"));
        queue.shutdown().await;

        assert_eq!(transport.calls().len(), 2);
        assert_eq!(store.notifications()[0].status, NotificationStatus::Sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_rate_limit_is_failure() {
        let limited = DeliveryOutcome::RateLimited {
            retry_after: Duration::from_secs(1),
        };
        let transport = Arc::new(FakeTransport::scripted([limited.clone(), limited]));
        let store = Arc::new(MemoryItemStore::default());
        let queue = queue(&[], transport.clone(), store.clone());

        queue.enqueue(entry("movies", "1"));
        queue.shutdown().await;

        assert_eq!(transport.calls().len(), 2);
        let logged = store.notifications();
        assert_eq!(logged[0].status, NotificationStatus::Failed);
        assert!(logged[0].error_message.as_deref().unwrap().contains("rate limited"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_not_retried() {
        let transport = Arc::new(FakeTransport::scripted([DeliveryOutcome::Failed(
            "HTTP 500".to_string(),
        )]));
        let store = Arc::new(MemoryItemStore::default());
        let queue = queue(&[], transport.clone(), store.clone());

        queue.enqueue(entry("movies", "1"));
        queue.shutdown().await;

        assert_eq!(transport.calls().len(), 1);
        assert_eq!(store.notifications()[0].status, NotificationStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_gates_deliveries() {
        let transport = Arc::new(FakeTransport::default());
        let store = Arc::new(MemoryItemStore::default());
        let queue = queue_with_limit(
            &[],
            transport.clone(),
            store.clone(),
            RateLimitConfig {
                max_requests: 2,
                window: Duration::from_secs(60),
            },
        );

        for i in 0..3 {
            queue.enqueue(entry("movies", &i.to_string()));
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.calls().len(), 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.calls().len(), 3);
    }

    /// Counts overlapping deliveries; each takes one second.
    #[derive(Default)]
    struct SlowTransport {
        active: std::sync::atomic::AtomicUsize,
        max_active: std::sync::atomic::AtomicUsize,
        delivered: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DeliveryTransport for SlowTransport {
        async fn deliver(&self, _destination: &str, _payload: &serde_json::Value) -> DeliveryOutcome {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.delivered.fetch_add(1, Ordering::SeqCst);
            DeliveryOutcome::Delivered
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_delivery_in_flight_per_destination() {
        let transport = Arc::new(SlowTransport::default());
        let queue = NotificationQueue::new(
            QueueConfig::default(),
            SlidingWindowLimiter::default(),
            transport.clone(),
            Arc::new(DiscordEmbedTemplate::default()),
            Arc::new(MemoryItemStore::default()),
        );

        for i in 0..4 {
            queue.enqueue(entry("movies", &i.to_string()));
        }
        queue.enqueue(entry("tv", "5"));
        queue.shutdown().await;

        assert_eq!(transport.delivered.load(Ordering::SeqCst), 5);
        // "tv" may overlap with "movies", never "movies" with itself.
        assert_eq!(transport.max_active.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_waiters_after_grace() {
        let transport = Arc::new(FakeTransport::default());
        let store = Arc::new(MemoryItemStore::default());
        let queue = queue_with_limit(
            &[],
            transport.clone(),
            store.clone(),
            RateLimitConfig {
                max_requests: 1,
                window: Duration::from_secs(3600),
            },
        );

        queue.enqueue(entry("movies", "1"));
        queue.enqueue(entry("movies", "2"));
        queue.shutdown().await;

        assert_eq!(transport.calls().len(), 1);
        let statuses: Vec<_> = store.notifications().iter().map(|n| n.status).collect();
        assert!(statuses.contains(&NotificationStatus::Sent));
        assert!(statuses.contains(&NotificationStatus::Failed));
    }
}
