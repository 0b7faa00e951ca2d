//! Artwork usage tracking
//!
//! `ArtworkCoordinator` downloads artwork on first use and removes it on last
//! release. `ArtworkEvent`s report each committed change to subscribers.

mod coordinator;
mod events;

pub use coordinator::ArtworkCoordinator;
pub use events::ArtworkEvent;
