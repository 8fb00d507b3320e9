//! Notification delivery.
//!
//! Entries produced by the event processor flow through the
//! [`NotificationQueue`], which batches per destination, gates every send on
//! the [`SlidingWindowLimiter`], renders through a [`NotificationTemplate`]
//! and hands the payload to a [`DeliveryTransport`].

pub mod discord;
pub mod entry;
pub mod queue;
pub mod rate_limiter;
pub mod routing;
pub mod template;
pub mod transport;

pub use discord::DiscordTransport;
pub use entry::NotificationEntry;
pub use queue::{DeliveryMode, NotificationQueue, QueueConfig};
pub use rate_limiter::{RateLimitConfig, SlidingWindowLimiter};
pub use routing::Router;
pub use template::{DiscordEmbedTemplate, NotificationTemplate};
pub use transport::{DeliveryOutcome, DeliveryTransport};
