mod common;

use common::{Harness, SlowDeleteStore, TestDownloader, UndeletableStore};
use pony_core::{
    ArtworkCoordinator, ArtworkError, ArtworkEvent, ArtworkId, ContentStore, Downloader,
    FsContentStore, NetworkFailure, QueuedDownloader, StaticUsageCountProvider,
};
use std::sync::Arc;

const LOCATOR: &str = "https://images.example.com/cover.png";

#[tokio::test]
async fn test_concurrent_uses_download_once() {
    let h = Harness::new();
    let artwork = ArtworkId::new(1);

    let first = h.coordinator.use_or_download(artwork, LOCATOR);
    let second = h.coordinator.use_or_download(artwork, LOCATOR);
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first, Ok(1));
    assert_eq!(second, Ok(2));
    assert_eq!(h.downloader.downloads(), 1);
    assert_eq!(h.provider.calls(), 1);
    assert!(h.store.exists(&artwork).await);
}

#[tokio::test]
async fn test_use_then_release_removes_and_redownloads() {
    let h = Harness::new();
    let artwork = ArtworkId::new(2);

    assert_eq!(h.coordinator.use_or_download(artwork, LOCATOR).await, Ok(1));
    assert_eq!(h.coordinator.release_or_remove(artwork).await, Ok(0));
    assert!(!h.store.exists(&artwork).await);
    assert_eq!(h.coordinator.cached_usage_count(&artwork), None);

    assert_eq!(h.coordinator.use_or_download(artwork, LOCATOR).await, Ok(1));
    assert_eq!(h.downloader.downloads(), 2);
    assert!(h.store.exists(&artwork).await);
}

#[tokio::test]
async fn test_first_use_with_zero_owners_stores_artwork() {
    let h = Harness::with(TestDownloader::new(), [(ArtworkId::new(3), 0)]);
    let artwork = ArtworkId::new(3);

    assert_eq!(h.coordinator.use_or_download(artwork, LOCATOR).await, Ok(1));
    assert_eq!(
        h.store.get(&artwork).unwrap().as_ref(),
        format!("artwork:{LOCATOR}").as_bytes()
    );

    assert_eq!(h.coordinator.use_or_download(artwork, LOCATOR).await, Ok(2));
    assert_eq!(h.downloader.downloads(), 1);
}

#[tokio::test]
async fn test_existing_owners_skip_download() {
    let artwork = ArtworkId::new(4);
    let h = Harness::with(TestDownloader::new(), [(artwork, 3)]);

    assert_eq!(h.coordinator.use_or_download(artwork, LOCATOR).await, Ok(4));
    assert_eq!(h.downloader.downloads(), 0);
    assert_eq!(h.coordinator.cached_usage_count(&artwork), Some(4));
}

#[tokio::test]
async fn test_releases_down_to_zero_remove_artwork() {
    let artwork = ArtworkId::new(5);
    let h = Harness::with(TestDownloader::new(), [(artwork, 2)]);
    h.store
        .put(&artwork, "png".into(), &Default::default())
        .await
        .unwrap();

    assert_eq!(h.coordinator.release_or_remove(artwork).await, Ok(1));
    assert!(h.store.exists(&artwork).await);
    assert_eq!(h.coordinator.release_or_remove(artwork).await, Ok(0));
    assert!(!h.store.exists(&artwork).await);
}

#[tokio::test]
async fn test_release_without_owners_is_not_found() {
    let h = Harness::new();
    let artwork = ArtworkId::new(6);

    let result = h.coordinator.release_or_remove(artwork).await;
    assert_eq!(result, Err(ArtworkError::NotFound(artwork.to_string())));
    assert_eq!(h.coordinator.active_channels(), 0);
}

#[tokio::test]
async fn test_distinct_artworks_do_not_block_each_other() {
    let h = Harness::with(TestDownloader::gated("slow"), []);
    let slow = ArtworkId::new(7);
    let fast = ArtworkId::new(8);

    let slow_handle = h.coordinator.use_or_download(slow, "slow");
    h.downloader.wait_started().await;

    assert_eq!(h.coordinator.use_or_download(fast, "fast").await, Ok(1));
    assert_eq!(h.coordinator.active_channels(), 1);

    h.downloader.open_gate();
    assert_eq!(slow_handle.await, Ok(1));
    assert_eq!(h.coordinator.active_channels(), 0);
}

#[tokio::test]
async fn test_cancel_before_start_leaves_no_trace() {
    let h = Harness::with(TestDownloader::gated(LOCATOR), []);
    let artwork = ArtworkId::new(9);

    let first = h.coordinator.use_or_download(artwork, LOCATOR);
    h.downloader.wait_started().await;

    let second = h.coordinator.use_or_download(artwork, LOCATOR);
    assert_eq!(h.coordinator.channel_refcount(&artwork), Some(2));

    second.cancel();
    assert_eq!(second.await, Err(ArtworkError::Cancelled));
    assert_eq!(h.coordinator.channel_refcount(&artwork), Some(1));

    h.downloader.open_gate();
    assert_eq!(first.await, Ok(1));
    assert_eq!(h.downloader.downloads(), 1);
    assert_eq!(h.coordinator.cached_usage_count(&artwork), Some(1));
    assert_eq!(h.coordinator.active_channels(), 0);
}

#[tokio::test]
async fn test_cancel_during_download_commits_nothing() {
    let h = Harness::with(TestDownloader::gated(LOCATOR), []);
    let artwork = ArtworkId::new(10);

    let handle = h.coordinator.use_or_download(artwork, LOCATOR);
    h.downloader.wait_started().await;
    handle.cancel();

    assert_eq!(handle.await, Err(ArtworkError::Cancelled));
    assert_eq!(h.downloader.downloads(), 0);
    assert!(!h.store.exists(&artwork).await);
    assert_eq!(h.coordinator.cached_usage_count(&artwork), None);
    assert_eq!(h.coordinator.active_channels(), 0);
}

#[tokio::test]
async fn test_cancelled_removal_keeps_artwork() {
    let h = Harness::with(TestDownloader::gated(LOCATOR), []);
    let artwork = ArtworkId::new(11);

    let using = h.coordinator.use_or_download(artwork, LOCATOR);
    h.downloader.wait_started().await;

    let removal = h.coordinator.release_or_remove(artwork);
    drop(removal);

    h.downloader.open_gate();
    assert_eq!(using.await, Ok(1));
    assert!(h.store.exists(&artwork).await);
    assert_eq!(h.coordinator.cached_usage_count(&artwork), Some(1));
    assert_eq!(h.coordinator.active_channels(), 0);
}

#[tokio::test]
async fn test_failed_download_leaves_count_untouched() {
    let h = Harness::new();
    let artwork = ArtworkId::new(12);
    h.downloader.fail_with(NetworkFailure::Offline.into());

    let result = h.coordinator.use_or_download(artwork, LOCATOR).await;
    assert_eq!(result, Err(ArtworkError::Network(NetworkFailure::Offline)));
    assert_eq!(h.coordinator.cached_usage_count(&artwork), None);
    assert!(!h.store.exists(&artwork).await);

    h.downloader.recover();
    assert_eq!(h.coordinator.use_or_download(artwork, LOCATOR).await, Ok(1));
}

#[tokio::test]
async fn test_failed_delete_still_decrements() {
    let artwork = ArtworkId::new(13);
    let store = Arc::new(UndeletableStore::default());
    let coordinator = ArtworkCoordinator::new(
        Arc::new(TestDownloader::new()),
        Arc::clone(&store) as Arc<dyn ContentStore>,
        Arc::new(StaticUsageCountProvider::new()),
    );

    assert_eq!(coordinator.use_or_download(artwork, LOCATOR).await, Ok(1));
    assert_eq!(coordinator.release_or_remove(artwork).await, Ok(0));
    assert!(store.exists(&artwork).await);
    assert_eq!(coordinator.cached_usage_count(&artwork), None);
}

#[tokio::test]
async fn test_cancel_mid_delete_still_commits_decrement() {
    let artwork = ArtworkId::new(17);
    let downloader = Arc::new(TestDownloader::new());
    let store = Arc::new(SlowDeleteStore::default());
    let coordinator = ArtworkCoordinator::new(
        Arc::clone(&downloader) as Arc<dyn Downloader>,
        Arc::clone(&store) as Arc<dyn ContentStore>,
        Arc::new(StaticUsageCountProvider::new()),
    );

    assert_eq!(coordinator.use_or_download(artwork, LOCATOR).await, Ok(1));

    let removal = coordinator.release_or_remove(artwork);
    store.wait_delete_started().await;
    removal.cancel();
    store.finish_delete();

    // The artwork is already gone, so the decrement must stick
    assert_eq!(removal.await, Ok(0));
    assert_eq!(coordinator.cached_usage_count(&artwork), None);
    assert_eq!(coordinator.active_channels(), 0);

    assert_eq!(coordinator.use_or_download(artwork, LOCATOR).await, Ok(1));
    assert_eq!(downloader.downloads(), 2);
    assert!(store.exists(&artwork).await);
}

#[tokio::test]
async fn test_dropped_removal_mid_delete_still_commits_decrement() {
    let artwork = ArtworkId::new(18);
    let store = Arc::new(SlowDeleteStore::default());
    let coordinator = ArtworkCoordinator::new(
        Arc::new(TestDownloader::new()),
        Arc::clone(&store) as Arc<dyn ContentStore>,
        Arc::new(StaticUsageCountProvider::new()),
    );
    let mut events = coordinator.subscribe();

    assert_eq!(coordinator.use_or_download(artwork, LOCATOR).await, Ok(1));
    let removal = coordinator.release_or_remove(artwork);
    store.wait_delete_started().await;
    drop(removal);
    store.finish_delete();

    assert!(matches!(events.recv().await, Ok(ArtworkEvent::Downloaded { .. })));
    assert_eq!(events.recv().await.unwrap(), ArtworkEvent::Removed { artwork });
    assert!(!store.exists(&artwork).await);
}

#[tokio::test]
async fn test_usage_count_overflow_is_an_error() {
    let artwork = ArtworkId::new(19);
    let h = Harness::with(TestDownloader::new(), [(artwork, u64::MAX)]);
    let mut events = h.coordinator.subscribe();

    let result = h.coordinator.use_or_download(artwork, LOCATOR).await;
    assert_eq!(result, Err(ArtworkError::CountOverflow(artwork.to_string())));
    assert_eq!(h.downloader.downloads(), 0);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_events_follow_committed_changes() {
    let h = Harness::new();
    let artwork = ArtworkId::new(14);
    let mut events = h.coordinator.subscribe();

    h.coordinator.use_or_download(artwork, LOCATOR).await.unwrap();
    h.coordinator.use_or_download(artwork, LOCATOR).await.unwrap();
    h.coordinator.release_or_remove(artwork).await.unwrap();
    h.coordinator.release_or_remove(artwork).await.unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        ArtworkEvent::Downloaded {
            artwork,
            usage_count: 1
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        ArtworkEvent::Used {
            artwork,
            usage_count: 2
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        ArtworkEvent::Released {
            artwork,
            usage_count: 1
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        ArtworkEvent::Removed { artwork }
    );
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_failed_use_emits_no_event() {
    let h = Harness::new();
    let mut events = h.coordinator.subscribe();
    h.downloader.fail_with(NetworkFailure::Timeout.into());

    assert!(h
        .coordinator
        .use_or_download(ArtworkId::new(15), LOCATOR)
        .await
        .is_err());
    assert!(events.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queued_downloader_bounds_parallel_downloads() {
    let target = Arc::new(TestDownloader::new());
    let coordinator = ArtworkCoordinator::new(
        Arc::new(QueuedDownloader::new(Arc::clone(&target) as Arc<dyn Downloader>, 3)),
        Arc::new(pony_core::MemoryContentStore::new()),
        Arc::new(StaticUsageCountProvider::new()),
    );

    let handles: Vec<_> = (0..20)
        .map(|i| coordinator.use_or_download(ArtworkId::new(100 + i), format!("cover/{i}")))
        .collect();
    for handle in handles {
        assert_eq!(handle.await, Ok(1));
    }

    assert_eq!(target.downloads(), 20);
    assert!(target.max_in_flight() <= 3);
}

#[tokio::test]
async fn test_filesystem_store_round_trip() {
    let root = std::env::temp_dir().join(format!("pony_artwork_{}", uuid::Uuid::new_v4()));
    let store = Arc::new(FsContentStore::new(root.clone()));
    let coordinator = ArtworkCoordinator::new(
        Arc::new(TestDownloader::new()),
        Arc::clone(&store) as Arc<dyn ContentStore>,
        Arc::new(StaticUsageCountProvider::new()),
    );
    let artwork = ArtworkId::new(16);

    assert_eq!(coordinator.use_or_download(artwork, LOCATOR).await, Ok(1));
    assert!(store.path_for(&artwork).exists());

    assert_eq!(coordinator.release_or_remove(artwork).await, Ok(0));
    assert!(!store.path_for(&artwork).exists());

    std::fs::remove_dir_all(&root).ok();
}
