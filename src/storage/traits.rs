//! Collaborator traits for persisted artwork and ownership counts

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::ArtworkResult;
use crate::storage::ids::ArtworkId;
use crate::usage_cache::UsageCount;

/// Blob storage for downloaded artwork, keyed by artwork id.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous content.
    ///
    /// Must be atomic: a failed or cancelled write leaves nothing readable
    /// under `key`.
    async fn put(&self, key: &ArtworkId, data: Bytes, cancel: &CancellationToken)
        -> ArtworkResult<()>;

    /// Delete the content under `key`.
    ///
    /// Returns Ok(true) if deleted, Ok(false) if it didn't exist. `Cancelled`
    /// may only be returned if nothing was removed.
    async fn delete(&self, key: &ArtworkId, cancel: &CancellationToken) -> ArtworkResult<bool>;

    /// Check if content exists under `key`
    async fn exists(&self, key: &ArtworkId) -> bool;
}

/// Authoritative source of "how many owners reference this artwork",
/// typically the local album/artist database.
#[async_trait]
pub trait UsageCountProvider: Send + Sync {
    async fn usage_count(&self, key: &ArtworkId) -> ArtworkResult<UsageCount>;
}
