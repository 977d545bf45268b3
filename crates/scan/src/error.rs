use rgindex::{ExtractError, FetchError};
use storage::StoreError;
use thiserror::Error;

/// Failure of the work for a single file
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("Index store error: {0}")]
    Store(#[from] StoreError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The scan was cancelled before this file produced a result
    #[error("Cancelled")]
    Cancelled,

    /// The task for this file panicked
    #[error("Worker failed: {0}")]
    WorkerFailed(String),
}

/// Aggregate outcome of a scan with failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("{failed} of {total} files failed")]
    PartialFailure { failed: usize, total: usize },

    #[error("All {total} files failed")]
    AllFailed { total: usize },
}
