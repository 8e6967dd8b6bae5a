use std::path::PathBuf;

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("key length {actual} exceeds the {max}-byte limit")]
    KeyTooLong { actual: usize, max: usize },

    #[error("invalid key: {reason}")]
    InvalidKey { reason: &'static str },

    #[error("snapshot corrupted at {path:?}: {reason}")]
    SnapshotCorrupted { path: PathBuf, reason: String },

    #[error("data directory unusable at {path:?}: {source}")]
    DataDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl StoreError {
    /// True for errors caused by the caller's arguments rather than the
    /// store itself. The RPC layer maps these to `InvalidArgument`.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            StoreError::KeyTooLong { .. } | StoreError::InvalidKey { .. }
        )
    }
}
