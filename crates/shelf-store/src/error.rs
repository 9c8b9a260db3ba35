use std::path::PathBuf;

use shelf_types::ItemId;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A batch write was refused; no part of it was applied.
    #[error("write to item {id} failed: {reason}")]
    WriteFailed { id: ItemId, reason: String },

    /// Attribute keys must be non-empty.
    #[error("empty attribute key for item {0}")]
    EmptyKey(ItemId),

    /// No further item ids can be allocated.
    #[error("item id space exhausted")]
    IdSpaceExhausted,

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot file exists but cannot be decoded.
    #[error("corrupt snapshot {path}: {reason}")]
    CorruptSnapshot { path: PathBuf, reason: String },

    /// Internal lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
