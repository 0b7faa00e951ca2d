//! Reference-counted artwork download and cache coordination
//!
//! This crate provides:
//! - **Scheduling**: `SerialTaskQueue`, a FIFO bounded-concurrency task queue
//! - **Per-key serialization**: `ChannelRegistry`, refcounted serial channels
//! - **Counts**: `UsageCountCache`, a best-effort cache over a count provider
//! - **Coordination**: `ArtworkCoordinator`, race-free use/download and
//!   release/remove of artwork
//! - **Collaborators**: `Downloader`, `ContentStore` and `UsageCountProvider`
//!   traits with memory and filesystem implementations
//!
//! # Example
//!
//! ```ignore
//! use pony_core::{ArtworkCoordinator, ArtworkId};
//!
//! let coordinator = ArtworkCoordinator::new(downloader, store, usage_provider);
//! let usage_count = coordinator.use_or_download(ArtworkId::new(123), url).await?;
//! ```
pub mod artwork;
pub mod channel_registry;
pub mod download;
pub mod error;
pub mod logging;
pub mod storage;
pub mod task_queue;
pub mod usage_cache;

pub use artwork::{ArtworkCoordinator, ArtworkEvent};
pub use channel_registry::{ChannelLease, ChannelRegistry};
pub use download::{Downloader, QueuedDownloader};
pub use error::{ArtworkError, ArtworkResult, NetworkFailure};
pub use storage::{
    ArtworkId, ContentStore, FsContentStore, MemoryContentStore, StaticUsageCountProvider,
    UsageCountProvider,
};
pub use task_queue::{SerialTaskQueue, TaskHandle};
pub use usage_cache::{UsageCount, UsageCountCache};
