//! Delivery transport seam.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The destination asked us to back off.
    RateLimited { retry_after: Duration },
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Sends rendered payloads to a destination.
///
/// Implementations make exactly one attempt per call; retrying is the
/// queue's job.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn deliver(&self, destination: &str, payload: &Value) -> DeliveryOutcome;
}
