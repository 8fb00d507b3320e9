//! API route modules.

pub mod health;
pub mod library;
pub mod logging;
pub mod webhook;

use axum::Router;

use crate::api::server::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(webhook::router())
        .merge(library::router())
        .nest("/health", health::router())
        .nest("/logging", logging::router())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_state {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::api::server::AppState;
    use crate::ingest::{DeletionCorrelator, EventProcessor, KeyedLocks, LibrarySync, ProcessorConfig};
    use crate::notification::{
        DiscordEmbedTemplate, NotificationQueue, QueueConfig, Router, SlidingWindowLimiter,
    };
    use crate::test_support::{FakeFetcher, FakeTransport, MemoryItemStore};

    pub struct TestApp {
        pub state: AppState,
        pub store: Arc<MemoryItemStore>,
        pub fetcher: Arc<FakeFetcher>,
        pub transport: Arc<FakeTransport>,
    }

    pub fn test_app() -> TestApp {
        let store = Arc::new(MemoryItemStore::default());
        let fetcher = Arc::new(FakeFetcher::default());
        let transport = Arc::new(FakeTransport::default());
        let locks = KeyedLocks::new();
        let queue = NotificationQueue::new(
            QueueConfig::default(),
            SlidingWindowLimiter::default(),
            transport.clone(),
            Arc::new(DiscordEmbedTemplate::default()),
            store.clone(),
        );
        let (correlator, _confirmed) = DeletionCorrelator::new(Duration::from_secs(30));
        let processor = Arc::new(EventProcessor::new(
            store.clone(),
            fetcher.clone(),
            correlator,
            queue,
            Router::new(["default"], true),
            locks.clone(),
            ProcessorConfig::default(),
        ));
        let library_sync = Arc::new(LibrarySync::new(store.clone(), fetcher.clone(), locks));
        TestApp {
            state: AppState::new(processor, store.clone(), library_sync),
            store,
            fetcher,
            transport,
        }
    }
}
