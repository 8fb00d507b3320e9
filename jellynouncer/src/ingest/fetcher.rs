//! Upstream item lookup seam.

use async_trait::async_trait;

use crate::Result;
use crate::domain::ItemSnapshot;

/// Authoritative item details from the media server.
#[async_trait]
pub trait ItemFetcher: Send + Sync {
    /// `Ok(None)` when the server does not know the item.
    async fn fetch_item(&self, item_id: &str) -> Result<Option<ItemSnapshot>>;

    /// Every item in the library, for bulk synchronization.
    async fn list_items(&self) -> Result<Vec<ItemSnapshot>>;
}
