//! # rgindex
//!
//! Statistics-based row group pruning for Parquet files.
//!
//! This crate provides:
//! - Extraction of per-row-group column statistics from Parquet footers
//! - A serializable [`FileIndex`] model of those statistics
//! - Conservative evaluation of conjunctive predicates (`Keep` unless provably empty)
//! - Fetching surviving row groups with a row-level residual filter
//!
//! ## Example
//!
//! ```no_run
//! use rgindex::{evaluate, MetadataExtractor, Predicate};
//!
//! let file = std::fs::File::open("data.parquet").unwrap();
//! let index = MetadataExtractor::default().extract("data.parquet", &file).unwrap();
//!
//! let predicate: Predicate = "Year=2023;Month>=6".parse().unwrap();
//! let evaluation = evaluate(&index, &predicate);
//!
//! println!("{} of {} row groups survive",
//!          evaluation.surviving_groups().len(),
//!          index.row_group_count);
//! ```

pub mod error;
pub mod evaluate;
pub mod extract;
pub mod fetch;
pub mod model;
pub mod predicate;
pub mod value;

pub use error::{
    EvaluationError, ExtractError, ExtractResult, FetchError, FetchResult, IndexError,
    PredicateParseError,
};
pub use evaluate::{decide, evaluate, Evaluation};
pub use extract::{read_footer, ExtractOptions, MetadataExtractor};
pub use fetch::{ResidualPredicate, RowGroupFetcher};
pub use model::{ColumnStats, FileIndex, PruneDecision, RowGroupStats};
pub use predicate::{Clause, Comparison, Predicate};
pub use value::{Value, ValueKind};
