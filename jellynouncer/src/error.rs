//! Application-wide error types.

use std::time::Duration;

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Persistence I/O failure. The write must be assumed not to have happened.
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Upstream item lookup failed.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// The delivery transport rejected or failed a notification.
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// The destination kept reporting rate limiting after the single retry.
    #[error("Delivery rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Duration },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A suspended operation was interrupted by shutdown.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    /// Whether this error came from the persistence layer.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Migration(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Fetch(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("MediaItem", "abc");
        assert_eq!(err.to_string(), "Entity not found: MediaItem with id abc");

        let err = Error::delivery("HTTP 500");
        assert_eq!(err.to_string(), "Delivery error: HTTP 500");
    }

    #[test]
    fn test_is_storage() {
        assert!(Error::Storage(sqlx::Error::RowNotFound).is_storage());
        assert!(!Error::Cancelled.is_storage());
    }
}
