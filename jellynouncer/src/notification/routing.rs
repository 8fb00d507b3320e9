//! Destination selection.

use std::collections::HashSet;

use crate::domain::ContentKind;

/// Key of the catch-all destination.
pub const DEFAULT_DESTINATION: &str = "default";

/// Maps content kinds to enabled destination keys.
#[derive(Debug, Clone, Default)]
pub struct Router {
    enabled: HashSet<String>,
    routing_enabled: bool,
}

impl Router {
    pub fn new<I, S>(enabled: I, routing_enabled: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enabled: enabled.into_iter().map(Into::into).collect(),
            routing_enabled,
        }
    }

    /// Destination for an item of `kind`, falling back to the default
    /// destination. `None` when nothing suitable is enabled.
    pub fn resolve(&self, kind: ContentKind) -> Option<&str> {
        if self.routing_enabled
            && let Some(key) = self.enabled.get(kind.route_key())
        {
            return Some(key.as_str());
        }
        self.default_destination()
    }

    /// Deletions always go to the default destination.
    pub fn deletion_destination(&self) -> Option<&str> {
        self.default_destination()
    }

    fn default_destination(&self) -> Option<&str> {
        self.enabled.get(DEFAULT_DESTINATION).map(String::as_str)
    }

    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.enabled.iter().map(String::as_str)
    }
}
