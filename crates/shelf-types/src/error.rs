use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("object id {id} does not belong to source {expected}")]
    ForeignObjectId { id: String, expected: String },

    #[error("value codec error: {0}")]
    Codec(String),
}
