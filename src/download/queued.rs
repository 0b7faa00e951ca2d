//! Concurrency-limited downloader

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use config::Settings;

use crate::download::Downloader;
use crate::error::{ArtworkError, ArtworkResult};
use crate::task_queue::SerialTaskQueue;

/// Wraps a downloader so that at most `max_concurrent` requests are in flight.
///
/// Excess requests wait in submission order. Implements [`Downloader`] itself,
/// so it can stand in for the wrapped downloader anywhere.
pub struct QueuedDownloader {
    target: Arc<dyn Downloader>,
    queue: SerialTaskQueue,
}

impl QueuedDownloader {
    pub fn new(target: Arc<dyn Downloader>, max_concurrent: usize) -> Self {
        Self {
            target,
            queue: SerialTaskQueue::new(max_concurrent),
        }
    }

    /// Limit image requests to `settings.max_concurrent_image_requests`.
    pub fn for_images(target: Arc<dyn Downloader>, settings: &Settings) -> Self {
        Self::new(target, settings.max_concurrent_image_requests)
    }

    /// Limit song requests to `settings.max_concurrent_song_requests`.
    pub fn for_songs(target: Arc<dyn Downloader>, settings: &Settings) -> Self {
        Self::new(target, settings.max_concurrent_song_requests)
    }

    pub fn max_concurrent(&self) -> usize {
        self.queue.max_concurrent()
    }

    /// Number of requests currently in flight.
    pub fn running(&self) -> usize {
        self.queue.running()
    }

    /// Observe the in-flight request count.
    pub fn watch_running(&self) -> watch::Receiver<usize> {
        self.queue.watch_running()
    }
}

#[async_trait]
impl Downloader for QueuedDownloader {
    async fn download(&self, locator: &str, cancel: &CancellationToken) -> ArtworkResult<Bytes> {
        let target = Arc::clone(&self.target);
        let request = locator.to_string();
        let mut handle = self
            .queue
            .submit(move |token| async move { target.download(&request, &token).await });

        // Dropping `handle` on the cancel path cancels the queued request.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(locator, "Queued download cancelled");
                Err(ArtworkError::Cancelled)
            }
            result = &mut handle => result,
        }
    }
}

impl Drop for QueuedDownloader {
    fn drop(&mut self) {
        self.queue.dispose();
    }
}
