use thiserror::Error;

/// Errors produced while parsing filter and sort expressions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("filter syntax error at offset {offset}: {reason}")]
    FilterSyntax { offset: usize, reason: String },

    #[error("filter nesting depth {depth} exceeds maximum of {max}")]
    FilterTooDeep { depth: usize, max: usize },

    #[error("invalid sort term {0:?}")]
    InvalidSortTerm(String),
}

pub type QueryResult<T> = Result<T, QueryError>;
