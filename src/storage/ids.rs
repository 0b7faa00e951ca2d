//! Type-safe identifier for ownable artwork

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an artwork asset, as assigned by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtworkId(i64);

impl ArtworkId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner numeric value
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ArtworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ArtworkId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<ArtworkId> for i64 {
    fn from(id: ArtworkId) -> i64 {
        id.0
    }
}
