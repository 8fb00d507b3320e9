//! Per-destination sliding window rate limiting.
//!
//! Each destination keeps the timestamps of its admitted requests within the
//! last window. A request is admitted while fewer than `max_requests` fall
//! inside the window.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{Error, Result};

/// Smallest pause between two admission attempts.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(5);
/// Largest pause between two admission attempts.
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for the sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(60),
        }
    }
}

/// Sliding window limiter keyed by destination.
#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
    windows: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    config: RateLimitConfig,
}

impl SlidingWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Try to admit one request for `destination` now.
    ///
    /// A refused request leaves the window untouched.
    pub fn acquire(&self, destination: &str) -> bool {
        self.try_admit(destination).is_none()
    }

    /// Admit or report how long until the oldest entry leaves the window.
    fn try_admit(&self, destination: &str) -> Option<Duration> {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let window = windows.entry(destination.to_string()).or_default();

        while let Some(&oldest) = window.front() {
            if now.duration_since(oldest) >= self.config.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() < self.config.max_requests {
            window.push_back(now);
            return None;
        }

        let until_free = window
            .front()
            .map(|&oldest| self.config.window.saturating_sub(now.duration_since(oldest)))
            .unwrap_or(MIN_POLL_INTERVAL);
        Some(until_free)
    }

    /// Wait until a request for `destination` is admitted.
    ///
    /// # Cancel Safety
    ///
    /// The lock is only held inside the synchronous admission check, never
    /// across the sleep, so dropping this future leaves the window consistent.
    /// Returns [`Error::Cancelled`] when `cancel` fires first.
    pub async fn wait_for_slot(&self, destination: &str, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let Some(until_free) = self.try_admit(destination) else {
                return Ok(());
            };

            let pause = until_free.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
            trace!(destination = %destination, wait = ?pause, "rate limited");

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Number of admissions currently inside the window.
    pub fn in_window(&self, destination: &str) -> usize {
        let now = Instant::now();
        self.windows
            .lock()
            .get(destination)
            .map(|w| {
                w.iter()
                    .filter(|&&t| now.duration_since(t) < self.config.window)
                    .count()
            })
            .unwrap_or(0)
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
