//! Database models for jellynouncer.
//!
//! These models map directly to the database schema and handle
//! serialization/deserialization of JSON fields.

pub mod media_item;
pub mod notification;

pub use media_item::*;
pub use notification::*;
