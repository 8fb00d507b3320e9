//! jellynouncer library crate.
//!
//! Watches a Jellyfin library through its webhook plugin and announces new
//! items, quality upgrades and deletions on Discord.

pub mod api;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod jellyfin;
pub mod logging;
pub mod notification;
pub mod quality;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
