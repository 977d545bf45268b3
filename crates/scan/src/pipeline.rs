//! Dataset-level pipelines built on the orchestrator
//!
//! - `index_dataset`: discover data files, extract footers, save indexes
//! - `prune_dataset`: load indexes, check they are current, evaluate a predicate
//! - `query_dataset`: prune, then read the surviving row groups of all files
//!   concurrently, buffering each file's batches
//! - `stream_dataset`: prune, then stream matching batches file by file

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use arrow::array::RecordBatch;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use object_store::path::Path;
use object_store::ObjectStore;
use rgindex::{
    evaluate, EvaluationError, ExtractOptions, MetadataExtractor, Predicate, RowGroupFetcher,
};
use storage::{
    create_object_store, DataFileDiscovery, IndexLayout, IndexStore, SourceVersion, StoreResult,
};
use tracing::{debug, info};

use crate::error::{OrchestratorError, ScanError};
use crate::orchestrator::{ScanOptions, ScanOrchestrator, ScanReport, ScanSummary};

/// Everything a pipeline needs, passed explicitly
#[derive(Debug, Clone)]
pub struct ScanContext {
    store: Arc<dyn ObjectStore>,
    index_store: IndexStore,
    discovery: DataFileDiscovery,
    extractor: MetadataExtractor,
    orchestrator: ScanOrchestrator,
    batch_size: usize,
}

impl ScanContext {
    /// Context with the default `metadata` layout and `.parquet` suffix
    pub fn new(store: Arc<dyn ObjectStore>, options: ScanOptions) -> Self {
        let layout = IndexLayout::default();
        Self {
            index_store: IndexStore::new(Arc::clone(&store), layout.clone()),
            discovery: DataFileDiscovery::new(Arc::clone(&store), ".parquet", layout),
            extractor: MetadataExtractor::default(),
            orchestrator: ScanOrchestrator::new(options),
            batch_size: rgindex::fetch::DEFAULT_BATCH_SIZE,
            store,
        }
    }

    /// Builds the object store and every component from configuration
    pub fn from_config(config: &config::Config) -> StoreResult<Self> {
        let store = create_object_store(&config.storage)?;
        Ok(Self::with_store(store, config))
    }

    /// Like [`from_config`](Self::from_config) with an existing store
    pub fn with_store(store: Arc<dyn ObjectStore>, config: &config::Config) -> Self {
        let layout = IndexLayout::new(config.scan.index_dir.clone());
        Self {
            index_store: IndexStore::new(Arc::clone(&store), layout.clone()),
            discovery: DataFileDiscovery::new(
                Arc::clone(&store),
                config.scan.data_suffix.clone(),
                layout,
            ),
            extractor: MetadataExtractor::new(ExtractOptions {
                skip_unsupported_columns: config.extract.skip_unsupported_columns,
            }),
            orchestrator: ScanOrchestrator::new(ScanOptions::from_config(&config.scan)),
            batch_size: config.scan.batch_size,
            store,
        }
    }

    pub fn with_extract_options(mut self, options: ExtractOptions) -> Self {
        self.extractor = MetadataExtractor::new(options);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn index_store(&self) -> &IndexStore {
        &self.index_store
    }

    pub fn orchestrator(&self) -> &ScanOrchestrator {
        &self.orchestrator
    }
}

/// Summary of one indexed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOutcome {
    pub file_id: String,
    pub row_group_count: u32,
    pub row_count: u64,
}

/// Pruning result for one file
#[derive(Debug, Clone, PartialEq)]
pub struct PruneOutcome {
    pub file_id: String,
    pub row_group_count: u32,
    pub surviving_groups: BTreeSet<u32>,
    pub mismatches: Vec<EvaluationError>,
}

impl PruneOutcome {
    pub fn skipped(&self) -> usize {
        self.row_group_count as usize - self.surviving_groups.len()
    }
}

/// Matching rows of one file
#[derive(Debug, Clone)]
pub struct FileBatches {
    pub file_id: String,
    pub batches: Vec<RecordBatch>,
}

impl FileBatches {
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

/// Output of [`query_dataset`]: the pruning pass and the fetch pass
#[derive(Debug)]
pub struct QueryOutput {
    pub pruned: ScanReport<PruneOutcome>,
    pub fetched: ScanReport<FileBatches>,
}

impl QueryOutput {
    /// All matching batches, file by file in input order
    pub fn batches(&self) -> impl Iterator<Item = &RecordBatch> {
        self.fetched
            .successes()
            .flat_map(|(_, file)| file.batches.iter())
    }

    pub fn num_rows(&self) -> usize {
        self.fetched.successes().map(|(_, f)| f.num_rows()).sum()
    }

    /// Files that failed in either pass
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ScanError)> {
        self.pruned.failures().chain(self.fetched.failures())
    }

    /// Per-file counts over both passes; a file fails if either pass failed it
    pub fn summary(&self) -> ScanSummary {
        let pruned = self.pruned.summary();
        let fetched = self.fetched.summary();
        let failed = pruned.failed + fetched.failed;

        ScanSummary {
            total: pruned.total,
            succeeded: pruned.total - failed,
            failed,
            cancelled: pruned.cancelled + fetched.cancelled,
        }
    }

    pub fn outcome(&self) -> Result<(), OrchestratorError> {
        self.summary().outcome()
    }
}

/// Extracts and saves an index for every data file under `prefix`
pub async fn index_dataset(ctx: &ScanContext, prefix: &str) -> StoreResult<ScanReport<IndexOutcome>> {
    let files = ctx.discovery.discover(prefix).await?;
    info!(files = files.len(), prefix = prefix, "Indexing dataset");

    let ids: Vec<String> = files.iter().map(|f| f.file_id()).collect();
    let report = ctx
        .orchestrator
        .run_over(ids, |file_id| {
            let store = Arc::clone(&ctx.store);
            let index_store = ctx.index_store.clone();
            let extractor = ctx.extractor.clone();
            async move {
                let location = Path::from(file_id.as_str());
                // Recorded before reading, so a concurrent rewrite shows up as stale
                let meta = store.head(&location).await.map_err(storage::StoreError::from)?;
                let index = extractor.extract_from_store(store.as_ref(), &location).await?;
                index_store
                    .save_with_source(&file_id, &index, &SourceVersion::from(&meta))
                    .await?;

                Ok::<_, ScanError>(IndexOutcome {
                    row_group_count: index.row_group_count,
                    row_count: index.total_rows(),
                    file_id,
                })
            }
        })
        .await;

    Ok(report)
}

/// Evaluates `predicate` against every saved index under `prefix`.
///
/// A file whose data changed since it was indexed fails with
/// `StoreError::Stale` rather than being pruned on outdated statistics.
pub async fn prune_dataset(
    ctx: &ScanContext,
    prefix: &str,
    predicate: &Predicate,
) -> StoreResult<ScanReport<PruneOutcome>> {
    let ids = ctx.index_store.list(prefix).await?;
    info!(files = ids.len(), predicate = %predicate, "Pruning dataset");

    let report = ctx
        .orchestrator
        .run_over(ids, |file_id| {
            let index_store = ctx.index_store.clone();
            let predicate = predicate.clone();
            async move {
                let index = index_store.load_fresh(&file_id).await?;
                let evaluation = evaluate(&index, &predicate);

                debug!(
                    file_id = %file_id,
                    surviving = evaluation.surviving_groups().len(),
                    total = index.row_group_count,
                    "Pruned file"
                );

                Ok::<_, ScanError>(PruneOutcome {
                    row_group_count: index.row_group_count,
                    surviving_groups: evaluation.surviving_groups(),
                    mismatches: evaluation.mismatches,
                    file_id,
                })
            }
        })
        .await;

    Ok(report)
}

/// Files with at least one surviving row group, in input order
fn surviving_files(pruned: &ScanReport<PruneOutcome>) -> Vec<(String, BTreeSet<u32>)> {
    pruned
        .successes()
        .filter(|(_, outcome)| !outcome.surviving_groups.is_empty())
        .map(|(file_id, outcome)| (file_id.to_string(), outcome.surviving_groups.clone()))
        .collect()
}

/// Prunes, then fetches the rows matching `predicate` from surviving row groups.
///
/// Files are fetched concurrently and each file's batches are collected in
/// memory; use [`stream_dataset`] to consume rows without buffering.
pub async fn query_dataset(
    ctx: &ScanContext,
    prefix: &str,
    predicate: &Predicate,
) -> StoreResult<QueryOutput> {
    let pruned = prune_dataset(ctx, prefix, predicate).await?;

    let targets = surviving_files(&pruned);
    let ids: Vec<String> = targets.iter().map(|(file_id, _)| file_id.clone()).collect();
    let survivors: HashMap<String, BTreeSet<u32>> = targets.into_iter().collect();

    info!(
        files = ids.len(),
        row_groups = survivors.values().map(|g| g.len()).sum::<usize>(),
        "Fetching surviving row groups"
    );

    let survivors = Arc::new(survivors);
    let fetcher = RowGroupFetcher::new(Arc::clone(&ctx.store)).with_batch_size(ctx.batch_size);

    let fetched = ctx
        .orchestrator
        .run_over(ids, |file_id| {
            let fetcher = fetcher.clone();
            let survivors = Arc::clone(&survivors);
            let predicate = predicate.clone();
            async move {
                let groups = survivors.get(&file_id).cloned().unwrap_or_default();
                let location = Path::from(file_id.as_str());
                let batches: Vec<RecordBatch> = fetcher
                    .fetch(&location, &groups, &predicate)
                    .await?
                    .try_collect()
                    .await?;

                Ok::<_, ScanError>(FileBatches { file_id, batches })
            }
        })
        .await;

    Ok(QueryOutput { pruned, fetched })
}

/// Output of [`stream_dataset`]
pub struct QueryStream {
    pub pruned: ScanReport<PruneOutcome>,
    /// Matching batches tagged with their file id, file by file in input order.
    /// A file that cannot be read yields one error item and the stream moves on.
    pub batches: BoxStream<'static, (String, Result<RecordBatch, ScanError>)>,
}

/// Prunes, then lazily streams the rows matching `predicate`.
///
/// Only one file is open at a time and batches are decoded as the stream
/// is polled.
pub async fn stream_dataset(
    ctx: &ScanContext,
    prefix: &str,
    predicate: &Predicate,
) -> StoreResult<QueryStream> {
    let pruned = prune_dataset(ctx, prefix, predicate).await?;
    let targets = surviving_files(&pruned);
    info!(files = targets.len(), "Streaming surviving row groups");

    let fetcher = RowGroupFetcher::new(Arc::clone(&ctx.store)).with_batch_size(ctx.batch_size);
    let predicate = predicate.clone();

    let batches = stream::iter(targets)
        .then(move |(file_id, groups)| {
            let fetcher = fetcher.clone();
            let predicate = predicate.clone();
            async move {
                let location = Path::from(file_id.as_str());
                match fetcher.fetch(&location, &groups, &predicate).await {
                    Ok(batches) => batches
                        .map(move |batch| (file_id.clone(), batch.map_err(ScanError::from)))
                        .boxed(),
                    Err(e) => stream::once(async move { (file_id, Err(ScanError::from(e))) }).boxed(),
                }
            }
        })
        .flatten()
        .boxed();

    Ok(QueryStream { pruned, batches })
}
