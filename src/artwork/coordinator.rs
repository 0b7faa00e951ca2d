//! Artwork coordinator - reference-counted download and removal
//!
//! Every mutation of an artwork's usage count runs on that artwork's serial
//! channel, so for one artwork the count read-modify-write never interleaves,
//! while different artworks proceed in parallel.
//!
//! Per artwork the flow is: lease the channel, submit the operation, and let
//! the lease go when the operation completes, fails or is cancelled.

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::artwork::events::ArtworkEvent;
use crate::channel_registry::{ChannelLease, ChannelRegistry};
use crate::download::Downloader;
use crate::error::{ArtworkError, ArtworkResult};
use crate::storage::ids::ArtworkId;
use crate::storage::traits::{ContentStore, UsageCountProvider};
use crate::task_queue::TaskHandle;
use crate::usage_cache::{UsageCount, UsageCountCache};

const EVENT_CAPACITY: usize = 64;

/// Shared state touched by operations running on artwork channels.
struct CoordinatorInner {
    downloader: Arc<dyn Downloader>,
    store: Arc<dyn ContentStore>,
    usage_provider: Arc<dyn UsageCountProvider>,
    usage_counts: UsageCountCache<ArtworkId>,
    events: broadcast::Sender<ArtworkEvent>,
}

impl CoordinatorInner {
    async fn fetch_usage_count(&self, artwork: &ArtworkId) -> ArtworkResult<UsageCount> {
        self.usage_counts
            .get(artwork, || self.usage_provider.usage_count(artwork))
            .await
    }

    fn commit(&self, artwork: &ArtworkId, usage_count: UsageCount, event: ArtworkEvent) {
        self.usage_counts.set(artwork, usage_count);
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn use_or_download(
        &self,
        artwork: ArtworkId,
        locator: &str,
        cancel: &CancellationToken,
    ) -> ArtworkResult<UsageCount> {
        let usage_count = self.fetch_usage_count(&artwork).await?;
        let Some(new_usage_count) = usage_count.checked_add(1) else {
            tracing::error!(artwork = %artwork, count = usage_count, "Usage count overflow");
            return Err(ArtworkError::CountOverflow(artwork.to_string()));
        };
        tracing::debug!(artwork = %artwork, count = new_usage_count, "Incremented usage count");

        if new_usage_count > 1 {
            self.commit(
                &artwork,
                new_usage_count,
                ArtworkEvent::Used {
                    artwork,
                    usage_count: new_usage_count,
                },
            );
            return Ok(new_usage_count);
        }

        tracing::debug!(artwork = %artwork, locator, "Downloading artwork...");
        let data = self
            .downloader
            .download(locator, cancel)
            .await
            .inspect_err(|e| {
                tracing::error!(artwork = %artwork, error = %e, "Artwork could not be downloaded");
            })?;
        tracing::info!(artwork = %artwork, bytes = data.len(), "Artwork has been downloaded");

        self.store
            .put(&artwork, data, cancel)
            .await
            .inspect_err(|e| {
                tracing::error!(artwork = %artwork, error = %e, "Artwork could not be stored");
            })?;
        tracing::info!(artwork = %artwork, "Artwork has been stored");

        self.commit(
            &artwork,
            new_usage_count,
            ArtworkEvent::Downloaded {
                artwork,
                usage_count: new_usage_count,
            },
        );
        Ok(new_usage_count)
    }

    /// Runs to completion once started: the only exit on cancellation is
    /// before the store has been touched.
    async fn release_or_remove(
        &self,
        artwork: ArtworkId,
        cancel: &CancellationToken,
    ) -> ArtworkResult<UsageCount> {
        let usage_count = self.fetch_usage_count(&artwork).await?;
        if usage_count == 0 {
            tracing::warn!(artwork = %artwork, "Release requested for artwork without owners");
            return Err(ArtworkError::NotFound(artwork.to_string()));
        }
        if cancel.is_cancelled() {
            return Err(ArtworkError::Cancelled);
        }

        let new_usage_count = usage_count - 1;
        tracing::debug!(artwork = %artwork, count = new_usage_count, "Decremented usage count");

        if new_usage_count > 0 {
            self.commit(
                &artwork,
                new_usage_count,
                ArtworkEvent::Released {
                    artwork,
                    usage_count: new_usage_count,
                },
            );
            return Ok(new_usage_count);
        }

        tracing::info!(artwork = %artwork, "Deleting artwork...");
        match self.store.delete(&artwork, cancel).await {
            Ok(true) => tracing::info!(artwork = %artwork, "Artwork has been deleted"),
            Ok(false) => tracing::debug!(artwork = %artwork, "Artwork was not stored"),
            // Nothing was removed, so nothing is committed either
            Err(ArtworkError::Cancelled) => return Err(ArtworkError::Cancelled),
            Err(e) => {
                tracing::warn!(artwork = %artwork, error = %e, "Could not delete artwork");
            }
        }

        self.commit(&artwork, 0, ArtworkEvent::Removed { artwork });
        Ok(0)
    }
}

/// Race-free "use or download" / "release or remove" over a content store.
///
/// Both operations return a [`TaskHandle`] resolving to the new usage count.
/// Dropping or cancelling the handle abandons the operation; no count change
/// is committed unless the operation completes. A removal that has started
/// deleting is the exception and always completes.
pub struct ArtworkCoordinator {
    inner: Arc<CoordinatorInner>,
    channels: ChannelRegistry<ArtworkId>,
}

impl ArtworkCoordinator {
    pub fn new(
        downloader: Arc<dyn Downloader>,
        store: Arc<dyn ContentStore>,
        usage_provider: Arc<dyn UsageCountProvider>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(CoordinatorInner {
                downloader,
                store,
                usage_provider,
                usage_counts: UsageCountCache::new(),
                events,
            }),
            channels: ChannelRegistry::new(),
        }
    }

    /// Register one more owner of `artwork`, downloading it from `locator`
    /// if this is the first.
    ///
    /// Resolves to the new usage count. A failed download or write is
    /// returned as-is and leaves the usage count untouched.
    pub fn use_or_download(
        &self,
        artwork: ArtworkId,
        locator: impl Into<String>,
    ) -> TaskHandle<UsageCount> {
        let locator = locator.into();
        self.submit(artwork, true, move |inner, cancel| async move {
            let result = inner.use_or_download(artwork, &locator, &cancel).await;
            if matches!(result, Err(ArtworkError::Cancelled)) {
                tracing::debug!(artwork = %artwork, "Use / download cancelled");
            }
            result
        })
    }

    /// Drop one owner of `artwork`, deleting the stored artwork when none
    /// remain.
    ///
    /// Resolves to the new usage count. Deletion failures are logged and do
    /// not prevent the decrement.
    ///
    /// Cancelling takes effect only until the stored artwork is touched. A
    /// removal whose delete has begun always commits the decrement, and the
    /// handle then resolves to the committed count.
    pub fn release_or_remove(&self, artwork: ArtworkId) -> TaskHandle<UsageCount> {
        self.submit(artwork, false, move |inner, cancel| async move {
            let result = inner.release_or_remove(artwork, &cancel).await;
            if matches!(result, Err(ArtworkError::Cancelled)) {
                tracing::debug!(artwork = %artwork, "Release / remove cancelled");
            }
            result
        })
    }

    fn submit<F, Fut>(
        &self,
        artwork: ArtworkId,
        interruptible: bool,
        operation: F,
    ) -> TaskHandle<UsageCount>
    where
        F: FnOnce(Arc<CoordinatorInner>, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ArtworkResult<UsageCount>> + Send + 'static,
    {
        let lease: ChannelLease<ArtworkId> = self.channels.lease(artwork);
        let queue = lease.queue().clone();
        let inner = Arc::clone(&self.inner);

        let run = move |cancel: CancellationToken| async move {
            let result = operation(inner, cancel).await;
            // Every count mutation is done; the channel may go away now.
            drop(lease);
            result
        };
        if interruptible {
            queue.submit(run)
        } else {
            queue.submit_to_completion(run)
        }
    }

    /// Subscribe to committed artwork changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ArtworkEvent> {
        self.inner.events.subscribe()
    }

    /// Cached usage count, without consulting the provider.
    pub fn cached_usage_count(&self, artwork: &ArtworkId) -> Option<UsageCount> {
        self.inner.usage_counts.peek(artwork)
    }

    /// Number of artworks with an operation queued or running.
    pub fn active_channels(&self) -> usize {
        self.channels.len()
    }

    /// Outstanding operations holding `artwork`'s channel.
    pub fn channel_refcount(&self, artwork: &ArtworkId) -> Option<usize> {
        self.channels.refcount(artwork)
    }
}
