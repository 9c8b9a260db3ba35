use shelf_store::StoreError;

use crate::registry::BrowseId;

/// Errors reported by a [`Source`](crate::Source).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SourceError {
    /// Malformed id, wrong parent, or an item that does not exist.
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    /// The browse skip count reached past the end of the results.
    #[error("browse result failed: skip exceeds the number of results")]
    BrowseResultFailed,

    /// The underlying store rejected a read or write.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// No active browse request has this id.
    #[error("browse request {0} not found")]
    NotFound(BrowseId),

    /// Browse parameters were rejected before anything was scheduled.
    #[error("invalid browse request: {0}")]
    InvalidRequest(String),

    /// Every browse request id has been handed out.
    #[error("browse request ids exhausted")]
    RequestIdsExhausted,

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<StoreError> for SourceError {
    fn from(e: StoreError) -> Self {
        Self::StorageFailure(e.to_string())
    }
}

/// Result alias for source operations.
pub type SourceResult<T> = Result<T, SourceError>;
