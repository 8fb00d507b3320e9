//! Jellyfin integration: item lookups and webhook payloads.

pub mod client;
pub mod webhook;

pub use client::{JellyfinClient, JellyfinSettings, ServerInfo};
pub use webhook::{WebhookDisposition, classify};
