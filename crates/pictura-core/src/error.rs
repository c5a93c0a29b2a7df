use thiserror::Error;
use uuid::Uuid;

use crate::GenerationStatus;

/// Record and blob store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// No live record with this id
    #[error("generation '{0}' not found")]
    NotFound(Uuid),

    /// A record with this id already exists
    #[error("generation '{0}' already exists")]
    Duplicate(Uuid),

    /// Filesystem error
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Encoding or decoding a stored document failed
    #[error("storage serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Attempted to move a record along a transition its lifecycle forbids
#[derive(Debug, Error)]
#[error("generation '{id}' cannot move from {from} to {to}")]
pub struct TransitionError {
    pub id: Uuid,
    pub from: GenerationStatus,
    pub to: GenerationStatus,
}
