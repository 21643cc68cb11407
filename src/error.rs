//! Error types for model-based tabular compression.

use thiserror::Error;

/// Error variants for compression and decompression.
#[derive(Debug, Error)]
pub enum Error {
    /// A branch sub-interval was empty, inverted, or extended past one.
    #[error("invalid probability interval: [{low}, {high}) in 1/65536 units")]
    InvalidProbability {
        /// Lower bound of the rejected sub-interval.
        low: u32,
        /// Upper bound of the rejected sub-interval.
        high: u32,
    },

    /// The schema or column configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// The declared predictors form a cycle.
    #[error("cyclic predictor declaration involving column {0}")]
    CyclicPredictors(usize),

    /// A tuple did not have one value per schema column.
    #[error("tuple has {found} values, schema expects {expected}")]
    TupleShape {
        /// Number of schema columns.
        expected: usize,
        /// Number of values supplied.
        found: usize,
    },

    /// A value's variant does not match its column type.
    #[error("column {column}: expected {expected} value")]
    TypeMismatch {
        /// Offending column.
        column: usize,
        /// Name of the expected type.
        expected: &'static str,
    },

    /// The value cannot be represented by its column's model.
    #[error("column {column}: {reason}")]
    Unencodable {
        /// Offending column.
        column: usize,
        /// Why encoding failed.
        reason: String,
    },

    /// The compressed stream is inconsistent with its own model dictionary.
    #[error("corrupt stream: {0}")]
    Corrupt(String),

    /// The compressed stream ended in the middle of a value.
    #[error("unexpected end of compressed stream")]
    Truncated,

    /// A driver method was called in the wrong stage.
    #[error("invalid call: {0}")]
    Stage(&'static str),

    /// An I/O error occurred while reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for compression operations.
pub type Result<T> = std::result::Result<T, Error>;
