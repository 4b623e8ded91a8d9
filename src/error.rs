//! Error types for the aggregation processor

use thiserror::Error;

/// Result type alias for aggregator operations
pub type Result<T> = std::result::Result<T, QueryError>;

/// Main error type for the aggregation processor
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Unknown aggregate function: {0}")]
    UnknownFunction(String),

    #[error("Arity mismatch: {func} expects {expected} input column(s), got {actual}")]
    ArityMismatch {
        func: String,
        expected: usize,
        actual: usize,
    },

    #[error("Type error: {0}")]
    TypeMismatch(String),

    #[error("Column index {index} out of range for {context} (input has {arity} columns)")]
    ColumnOutOfRange {
        index: usize,
        arity: usize,
        context: String,
    },

    #[error("Invalid aggregator spec: {0}")]
    InvalidSpec(String),

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Resources exhausted: {0}")]
    ResourcesExhausted(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueryError {
    /// True for errors raised while building an aggregator, before any row
    /// has been read.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            QueryError::UnknownFunction(_)
                | QueryError::ArityMismatch { .. }
                | QueryError::TypeMismatch(_)
                | QueryError::ColumnOutOfRange { .. }
                | QueryError::InvalidSpec(_)
        )
    }
}
