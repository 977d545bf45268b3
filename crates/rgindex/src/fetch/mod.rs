//! Reads surviving row groups from object storage
//!
//! Pruning decisions select which row groups are decoded; the residual
//! predicate then drops non-matching rows inside them while decoding.

mod residual;

pub use residual::ResidualPredicate;

use std::collections::BTreeSet;
use std::sync::Arc;

use arrow::array::RecordBatch;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use object_store::path::Path;
use object_store::ObjectStore;
use parquet::arrow::arrow_reader::RowFilter;
use parquet::arrow::async_reader::ParquetObjectReader;
use parquet::arrow::ParquetRecordBatchStreamBuilder;
use tracing::debug;

use crate::error::{FetchError, FetchResult};
use crate::predicate::Predicate;

/// Default number of rows per decoded batch
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Streams record batches for a chosen set of row groups
#[derive(Clone)]
pub struct RowGroupFetcher {
    store: Arc<dyn ObjectStore>,
    batch_size: usize,
}

impl RowGroupFetcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Opens `location` and streams the rows of `groups` that satisfy `residual`.
    ///
    /// Groups are read in ascending id order. An empty group set yields an
    /// empty stream without touching the object.
    pub async fn fetch(
        &self,
        location: &Path,
        groups: &BTreeSet<u32>,
        residual: &Predicate,
    ) -> FetchResult<BoxStream<'static, FetchResult<RecordBatch>>> {
        if groups.is_empty() {
            return Ok(stream::empty().boxed());
        }

        let reader = ParquetObjectReader::new(Arc::clone(&self.store), location.clone());
        let builder = ParquetRecordBatchStreamBuilder::new(reader).await?;

        let row_group_count = builder.metadata().num_row_groups();
        if let Some(&out_of_range) = groups.iter().find(|&&id| id as usize >= row_group_count) {
            return Err(FetchError::RowGroupOutOfRange {
                row_group_id: out_of_range,
                row_group_count,
            });
        }

        let row_groups: Vec<usize> = groups.iter().map(|&id| id as usize).collect();
        let mut builder = builder
            .with_row_groups(row_groups)
            .with_batch_size(self.batch_size);

        if !residual.is_empty() {
            let predicate =
                ResidualPredicate::try_new(residual, builder.parquet_schema(), builder.schema())?;
            debug!(
                location = %location,
                columns = ?predicate.columns(),
                "Applying residual row filter"
            );
            builder = builder.with_row_filter(RowFilter::new(vec![Box::new(predicate)]));
        }

        debug!(
            location = %location,
            row_groups = groups.len(),
            total_row_groups = row_group_count,
            "Fetching row groups"
        );

        let stream = builder.build()?;
        Ok(stream.map_err(FetchError::from).boxed())
    }
}
