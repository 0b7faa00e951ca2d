//! Best-effort in-memory cache of asset usage counts
//!
//! A count is cached only while it is positive. Zero evicts the entry, so the
//! next access goes back to the authoritative provider instead of trusting a
//! stale zero.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::ArtworkResult;

/// Number of owners referencing an asset.
pub type UsageCount = u64;

#[derive(Debug)]
pub struct UsageCountCache<K> {
    counts: Mutex<HashMap<K, UsageCount>>,
}

impl<K> Default for UsageCountCache<K>
where
    K: Eq + Hash + Clone + Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> UsageCountCache<K>
where
    K: Eq + Hash + Clone + Display,
{
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, UsageCount>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached count for `key`, or fetch it with `fetch` and cache
    /// the result.
    ///
    /// The lock is not held while `fetch` runs.
    pub async fn get<F, Fut>(&self, key: &K, fetch: F) -> ArtworkResult<UsageCount>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ArtworkResult<UsageCount>>,
    {
        if let Some(count) = self.peek(key) {
            return Ok(count);
        }

        tracing::trace!(key = %key, "Checking usage count");
        let count = fetch().await?;
        tracing::trace!(key = %key, count, "Fetched usage count");
        self.set(key, count);
        Ok(count)
    }

    /// Store `count` for `key`; zero evicts the entry instead.
    pub fn set(&self, key: &K, count: UsageCount) {
        let mut counts = self.lock();
        if count == 0 {
            if counts.remove(key).is_some() {
                tracing::trace!(key = %key, "Removing usage count cache");
            }
        } else {
            tracing::trace!(key = %key, count, "Caching usage count");
            counts.insert(key.clone(), count);
        }
    }

    /// Cached count without consulting the provider.
    pub fn peek(&self, key: &K) -> Option<UsageCount> {
        self.lock().get(key).copied().filter(|count| *count > 0)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
