//! Storage collaborators for artwork coordination
//!
//! The coordinator talks to two traits:
//!
//! - `ContentStore` - persisted artwork blobs keyed by `ArtworkId`
//! - `UsageCountProvider` - the authoritative owner count for an artwork
//!
//! Implementations are provided for memory (`MemoryContentStore`,
//! `StaticUsageCountProvider`) and the filesystem (`FsContentStore`).

pub mod ids;
pub mod implementations;
pub mod traits;

pub use ids::ArtworkId;
pub use implementations::{FsContentStore, MemoryContentStore, StaticUsageCountProvider};
pub use traits::{ContentStore, UsageCountProvider};
