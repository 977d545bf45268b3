//! Parallel per-file scans over a dataset: indexing, pruning, querying and streaming.

pub mod error;
pub mod orchestrator;
pub mod pipeline;

pub use error::{OrchestratorError, ScanError};
pub use orchestrator::{
    CancelHandle, CancelPolicy, FileResult, ScanOptions, ScanOrchestrator, ScanReport, ScanSummary,
};
pub use pipeline::{
    index_dataset, prune_dataset, query_dataset, stream_dataset, FileBatches, IndexOutcome,
    PruneOutcome, QueryOutput, QueryStream, ScanContext,
};
