#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use pony_core::{
    ArtworkCoordinator, ArtworkError, ArtworkId, ArtworkResult, ContentStore, Downloader,
    MemoryContentStore, StaticUsageCountProvider, UsageCount, UsageCountProvider,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Downloader that serves `artwork:<locator>` bytes and records traffic.
///
/// A gated downloader parks requests for one locator until `open_gate`.
#[derive(Default)]
pub struct TestDownloader {
    downloads: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    failure: Mutex<Option<ArtworkError>>,
    gated_locator: Option<String>,
    gate: CancellationToken,
    started: Notify,
}

impl TestDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(locator: &str) -> Self {
        Self {
            gated_locator: Some(locator.to_string()),
            ..Self::default()
        }
    }

    pub fn fail_with(&self, error: ArtworkError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn open_gate(&self) {
        self.gate.cancel();
    }

    /// Wait until a gated request has started.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for TestDownloader {
    async fn download(&self, locator: &str, cancel: &CancellationToken) -> ArtworkResult<Bytes> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = async {
            if self.gated_locator.as_deref() == Some(locator) {
                self.started.notify_one();
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ArtworkError::Cancelled),
                    _ = self.gate.cancelled() => {}
                }
            } else {
                tokio::task::yield_now().await;
            }

            if let Some(error) = self.failure.lock().unwrap().clone() {
                return Err(error);
            }
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from(format!("artwork:{locator}")))
        }
        .await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Memory store whose deletes always fail.
#[derive(Default)]
pub struct UndeletableStore {
    pub inner: MemoryContentStore,
}

#[async_trait]
impl ContentStore for UndeletableStore {
    async fn put(
        &self,
        key: &ArtworkId,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> ArtworkResult<()> {
        self.inner.put(key, data, cancel).await
    }

    async fn delete(&self, _key: &ArtworkId, _cancel: &CancellationToken) -> ArtworkResult<bool> {
        Err(ArtworkError::storage("permission denied"))
    }

    async fn exists(&self, key: &ArtworkId) -> bool {
        self.inner.exists(key).await
    }
}

/// Memory store whose deletes remove the content, then park until
/// `finish_delete`.
#[derive(Default)]
pub struct SlowDeleteStore {
    pub inner: MemoryContentStore,
    delete_started: Notify,
    gate: CancellationToken,
}

impl SlowDeleteStore {
    pub async fn wait_delete_started(&self) {
        self.delete_started.notified().await;
    }

    pub fn finish_delete(&self) {
        self.gate.cancel();
    }
}

#[async_trait]
impl ContentStore for SlowDeleteStore {
    async fn put(
        &self,
        key: &ArtworkId,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> ArtworkResult<()> {
        self.inner.put(key, data, cancel).await
    }

    async fn delete(&self, key: &ArtworkId, cancel: &CancellationToken) -> ArtworkResult<bool> {
        let removed = self.inner.delete(key, cancel).await?;
        self.delete_started.notify_one();
        self.gate.cancelled().await;
        Ok(removed)
    }

    async fn exists(&self, key: &ArtworkId) -> bool {
        self.inner.exists(key).await
    }
}

pub struct Harness {
    pub coordinator: ArtworkCoordinator,
    pub downloader: Arc<TestDownloader>,
    pub store: Arc<MemoryContentStore>,
    pub provider: Arc<StaticUsageCountProvider>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(TestDownloader::new(), [])
    }

    pub fn with(
        downloader: TestDownloader,
        counts: impl IntoIterator<Item = (ArtworkId, UsageCount)>,
    ) -> Self {
        let downloader = Arc::new(downloader);
        let store = Arc::new(MemoryContentStore::new());
        let provider = Arc::new(StaticUsageCountProvider::with_counts(counts));
        let coordinator = ArtworkCoordinator::new(
            Arc::clone(&downloader) as Arc<dyn Downloader>,
            Arc::clone(&store) as Arc<dyn ContentStore>,
            Arc::clone(&provider) as Arc<dyn UsageCountProvider>,
        );
        Self {
            coordinator,
            downloader,
            store,
            provider,
        }
    }
}
