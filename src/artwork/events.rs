use crate::storage::ids::ArtworkId;
use crate::usage_cache::UsageCount;

/// Committed artwork state changes, broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtworkEvent {
    /// First owner: the artwork was fetched and stored.
    Downloaded {
        artwork: ArtworkId,
        usage_count: UsageCount,
    },
    /// Another owner started using already stored artwork.
    Used {
        artwork: ArtworkId,
        usage_count: UsageCount,
    },
    /// An owner let go; others still reference the artwork.
    Released {
        artwork: ArtworkId,
        usage_count: UsageCount,
    },
    /// Last owner let go and the stored artwork was removed.
    Removed { artwork: ArtworkId },
}

impl ArtworkEvent {
    pub fn artwork(&self) -> ArtworkId {
        match self {
            ArtworkEvent::Downloaded { artwork, .. }
            | ArtworkEvent::Used { artwork, .. }
            | ArtworkEvent::Released { artwork, .. }
            | ArtworkEvent::Removed { artwork } => *artwork,
        }
    }
}
