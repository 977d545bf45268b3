//! Error types for statistics extraction, evaluation and row group fetches

use thiserror::Error;

use crate::value::ValueKind;

/// Result type for footer extraction
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;

/// Errors that can occur while building a [`FileIndex`](crate::FileIndex) from a file footer
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Footer missing, truncated, or not decodable
    #[error("Corrupt footer in {file_id}: {reason}")]
    Corrupt { file_id: String, reason: String },

    /// Column whose physical/logical type has no ordered value mapping
    #[error("Unsupported column {column} in {file_id}: no orderable statistics for {physical_type}")]
    Unsupported {
        file_id: String,
        column: String,
        physical_type: String,
    },

    /// Object store failure while reading footer bytes
    #[error("I/O error reading {file_id}: {source}")]
    Io {
        file_id: String,
        #[source]
        source: object_store::Error,
    },
}

impl ExtractError {
    pub(crate) fn corrupt(file_id: &str, reason: impl Into<String>) -> Self {
        ExtractError::Corrupt {
            file_id: file_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Violations of the [`FileIndex`](crate::FileIndex) shape invariants
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("Row group count mismatch: declared {declared}, found {actual}")]
    CountMismatch { declared: u32, actual: usize },

    #[error("Row group at position {position} has id {found}")]
    OutOfOrder { position: usize, found: u32 },

    /// NaN or infinite float bound, which has no JSON encoding
    #[error("Non-finite bound for {column} in row group {row_group_id}")]
    NonFiniteBound { row_group_id: u32, column: String },
}

/// Non-fatal problems found while evaluating a predicate against statistics.
///
/// The affected clause is treated as keep for the row group.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Type mismatch on {column} in row group {row_group_id}: statistics are {expected}, clause value is {actual}")]
    TypeMismatch {
        row_group_id: u32,
        column: String,
        expected: ValueKind,
        actual: ValueKind,
    },
}

/// Errors from parsing the `column=value;...` predicate grammar
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredicateParseError {
    #[error("Empty predicate")]
    Empty,

    #[error("Empty clause at position {0}")]
    EmptyClause(usize),

    #[error("Clause '{0}' has no comparison operator")]
    MissingOperator(String),

    #[error("Clause '{0}' has no column name")]
    MissingColumn(String),

    #[error("Clause '{0}' has no value")]
    MissingValue(String),

    #[error("Invalid literal '{literal}': {reason}")]
    InvalidLiteral { literal: String, reason: String },
}

/// Result type for row group fetches
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Errors that can occur while reading surviving row groups
#[derive(Error, Debug)]
pub enum FetchError {
    /// Error reading or decoding the Parquet file
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Error evaluating the residual predicate
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Object store error
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// Residual predicate references a column the file does not have
    #[error("Unknown column in residual predicate: {0}")]
    UnknownColumn(String),

    /// Residual literal cannot be compared with the column's data type
    #[error("Cannot compare column {column} of type {data_type} with {actual} literal")]
    TypeMismatch {
        column: String,
        data_type: String,
        actual: ValueKind,
    },

    /// Requested row group does not exist in the file
    #[error("Row group {row_group_id} out of range (file has {row_group_count})")]
    RowGroupOutOfRange {
        row_group_id: u32,
        row_group_count: usize,
    },
}
