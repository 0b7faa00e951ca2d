//! Reference-counted per-key execution channels
//!
//! The registry maps a key to a lazily created serial lane (a
//! [`SerialTaskQueue`] with concurrency 1) and counts how many logical callers
//! currently hold it. A channel exists exactly while its count is above zero;
//! the last release removes it and disposes the underlying queue.
//!
//! The registry never submits work itself. Callers pair each `retain` with one
//! `release` around exactly one submitted operation, either by hand or through
//! a [`ChannelLease`].

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::task_queue::SerialTaskQueue;

struct ChannelEntry {
    queue: SerialTaskQueue,
    refcount: usize,
}

/// Registry of refcounted serial channels keyed by `K`.
///
/// Cloning yields another handle to the same registry. All bookkeeping runs
/// under one mutex and never awaits.
pub struct ChannelRegistry<K> {
    channels: Arc<Mutex<HashMap<K, ChannelEntry>>>,
}

impl<K> Clone for ChannelRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
        }
    }
}

impl<K> Default for ChannelRegistry<K>
where
    K: Eq + Hash + Clone + Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> ChannelRegistry<K>
where
    K: Eq + Hash + Clone + Display,
{
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, ChannelEntry>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the live channel for `key`, creating it with refcount 1 when
    /// absent, otherwise bumping its refcount.
    pub fn retain(&self, key: &K) -> SerialTaskQueue {
        let mut channels = self.lock();
        match channels.get_mut(key) {
            Some(entry) => {
                entry.refcount += 1;
                tracing::trace!(key = %key, refcount = entry.refcount, "Retaining channel");
                entry.queue.clone()
            }
            None => {
                tracing::trace!(key = %key, "Creating channel");
                let queue = SerialTaskQueue::serial();
                channels.insert(
                    key.clone(),
                    ChannelEntry {
                        queue: queue.clone(),
                        refcount: 1,
                    },
                );
                queue
            }
        }
    }

    /// Drop one reference to `key`'s channel, tearing it down at zero.
    ///
    /// Releasing a key with no channel is a no-op that logs a warning.
    pub fn release(&self, key: &K) {
        let torn_down = {
            let mut channels = self.lock();
            match channels.get_mut(key) {
                Some(entry) if entry.refcount > 1 => {
                    entry.refcount -= 1;
                    tracing::trace!(key = %key, refcount = entry.refcount, "Releasing channel");
                    None
                }
                Some(_) => {
                    tracing::trace!(key = %key, "Removing channel");
                    channels.remove(key).map(|entry| entry.queue)
                }
                None => {
                    tracing::warn!(key = %key, "No channel to release");
                    None
                }
            }
        };

        // Disposal drops queued jobs, which may release other keys, so it
        // runs outside the registry lock.
        if let Some(queue) = torn_down {
            queue.dispose();
        }
    }

    /// Retain `key` and return a guard that releases it when dropped.
    pub fn lease(&self, key: K) -> ChannelLease<K> {
        let queue = self.retain(&key);
        ChannelLease {
            registry: self.clone(),
            key,
            queue,
        }
    }

    /// Current refcount of `key`, or `None` if it has no channel.
    pub fn refcount(&self, key: &K) -> Option<usize> {
        self.lock().get(key).map(|entry| entry.refcount)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().contains_key(key)
    }

    /// Number of live channels.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// One retained reference to a channel.
///
/// Dropping the lease releases the reference. Drop runs at a deterministic
/// point (end of scope, or when the future owning it completes or is
/// dropped), so every exit path of an operation releases exactly once.
pub struct ChannelLease<K>
where
    K: Eq + Hash + Clone + Display,
{
    registry: ChannelRegistry<K>,
    key: K,
    queue: SerialTaskQueue,
}

impl<K> ChannelLease<K>
where
    K: Eq + Hash + Clone + Display,
{
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The serial lane this lease keeps alive.
    pub fn queue(&self) -> &SerialTaskQueue {
        &self.queue
    }
}

impl<K> Drop for ChannelLease<K>
where
    K: Eq + Hash + Clone + Display,
{
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}
