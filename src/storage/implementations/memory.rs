//! In-memory collaborator implementations

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

use crate::error::{ArtworkError, ArtworkResult};
use crate::storage::ids::ArtworkId;
use crate::storage::traits::{ContentStore, UsageCountProvider};
use crate::usage_cache::UsageCount;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory content store for testing and embedding
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    contents: Mutex<HashMap<ArtworkId, Bytes>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ArtworkId) -> Option<Bytes> {
        lock(&self.contents).get(key).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.contents).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.contents).is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(
        &self,
        key: &ArtworkId,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> ArtworkResult<()> {
        if cancel.is_cancelled() {
            return Err(ArtworkError::Cancelled);
        }
        lock(&self.contents).insert(*key, data);
        Ok(())
    }

    async fn delete(&self, key: &ArtworkId, cancel: &CancellationToken) -> ArtworkResult<bool> {
        if cancel.is_cancelled() {
            return Err(ArtworkError::Cancelled);
        }
        Ok(lock(&self.contents).remove(key).is_some())
    }

    async fn exists(&self, key: &ArtworkId) -> bool {
        lock(&self.contents).contains_key(key)
    }
}

/// Map-backed usage count provider; unknown artwork reports zero owners.
#[derive(Debug, Default)]
pub struct StaticUsageCountProvider {
    counts: Mutex<HashMap<ArtworkId, UsageCount>>,
    calls: AtomicUsize,
}

impl StaticUsageCountProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counts(counts: impl IntoIterator<Item = (ArtworkId, UsageCount)>) -> Self {
        Self {
            counts: Mutex::new(counts.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_count(&self, key: ArtworkId, count: UsageCount) {
        lock(&self.counts).insert(key, count);
    }

    /// How many times the provider has been queried.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UsageCountProvider for StaticUsageCountProvider {
    async fn usage_count(&self, key: &ArtworkId) -> ArtworkResult<UsageCount> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.counts).get(key).copied().unwrap_or(0))
    }
}
