//! Error types for artwork coordination.

use std::fmt;
use thiserror::Error;

/// Why a network operation did not produce a payload.
///
/// All kinds are non-retriable from the coordinator's point of view; retry
/// policy belongs to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkFailure {
    Offline,
    Timeout,
    Cancelled,
    Other(String),
}

impl fmt::Display for NetworkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkFailure::Offline => write!(f, "offline"),
            NetworkFailure::Timeout => write!(f, "timed out"),
            NetworkFailure::Cancelled => write!(f, "request cancelled"),
            NetworkFailure::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Errors surfaced by the task queue, the coordinator and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtworkError {
    #[error("network failure: {0}")]
    Network(NetworkFailure),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The caller abandoned the operation. No side effects were committed.
    #[error("operation cancelled")]
    Cancelled,

    #[error("task queue has been disposed")]
    QueueDisposed,

    /// The operation panicked; its queue slot was freed regardless.
    #[error("operation panicked: {0}")]
    Panicked(String),

    #[error("usage count overflow: {0}")]
    CountOverflow(String),
}

impl ArtworkError {
    /// True only for caller-initiated cancellation, never for real failures.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ArtworkError::Cancelled)
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        ArtworkError::Storage(msg.into())
    }
}

impl From<NetworkFailure> for ArtworkError {
    fn from(failure: NetworkFailure) -> Self {
        ArtworkError::Network(failure)
    }
}

impl From<std::io::Error> for ArtworkError {
    fn from(err: std::io::Error) -> Self {
        ArtworkError::Storage(err.to_string())
    }
}

/// Result type for artwork operations.
pub type ArtworkResult<T> = std::result::Result<T, ArtworkError>;
