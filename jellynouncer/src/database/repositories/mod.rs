//! Repository layer for database access.

pub mod item;

pub use crate::database::models::NewNotificationLog;
pub use item::*;
