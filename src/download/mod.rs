//! Remote artwork fetching
//!
//! The transport itself is supplied by the embedder through [`Downloader`].
//! [`QueuedDownloader`] throttles any downloader through a bounded task queue.

mod queued;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::ArtworkResult;

pub use queued::QueuedDownloader;

/// Fetches the bytes behind a locator (usually an image URL).
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `locator`. Implementations should stop early once `cancel`
    /// fires; callers may also simply drop the returned future.
    async fn download(&self, locator: &str, cancel: &CancellationToken) -> ArtworkResult<Bytes>;
}
