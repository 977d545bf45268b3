//! Bounded fan-out of per-file tasks with ordered aggregation
//!
//! Workers report `(ordinal, result)` over one channel to a single
//! aggregator, which places results back into input order.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, ScanError};

/// What happens to running tasks on cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelPolicy {
    /// Stop dispatching, let running tasks finish
    #[default]
    Drain,
    /// Stop dispatching and abort running tasks
    Abort,
}

impl From<config::CancelMode> for CancelPolicy {
    fn from(mode: config::CancelMode) -> Self {
        match mode {
            config::CancelMode::Drain => CancelPolicy::Drain,
            config::CancelMode::Abort => CancelPolicy::Abort,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Maximum number of files processed at once
    pub parallelism: usize,
    pub cancel_policy: CancelPolicy,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            cancel_policy: CancelPolicy::default(),
        }
    }
}

impl ScanOptions {
    pub fn from_config(config: &config::ScanConfig) -> Self {
        Self {
            parallelism: config.effective_parallelism(),
            cancel_policy: config.cancel_policy.into(),
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_cancel_policy(mut self, cancel_policy: CancelPolicy) -> Self {
        self.cancel_policy = cancel_policy;
        self
    }
}

/// Requests cancellation of the scans run by one orchestrator
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Runs one task per file on the Tokio runtime with at most
/// `parallelism` tasks in flight.
///
/// Cancellation is sticky: once cancelled, later runs dispatch nothing.
#[derive(Debug, Clone)]
pub struct ScanOrchestrator {
    options: ScanOptions,
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl ScanOrchestrator {
    pub fn new(options: ScanOptions) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            options,
            cancel_tx: Arc::new(cancel_tx),
        }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Runs `task` for every distinct file id and returns the results in input order
    pub async fn run_over<I, T, F, Fut>(&self, file_ids: I, task: F) -> ScanReport<T>
    where
        I: IntoIterator<Item = String>,
        T: Send + 'static,
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ScanError>> + Send + 'static,
    {
        let ids = dedup_ids(file_ids);
        let total = ids.len();
        let permits = self.options.parallelism.max(1);

        info!(files = total, parallelism = permits, "Starting scan");

        let semaphore = Arc::new(Semaphore::new(permits));
        let (tx, mut rx) = mpsc::channel::<(usize, Result<T, ScanError>)>(permits);
        let mut cancel_rx = self.cancel_tx.subscribe();
        let mut cancelled = *cancel_rx.borrow_and_update();

        let mut slots: Vec<Option<Result<T, ScanError>>> = (0..total).map(|_| None).collect();
        let mut workers = JoinSet::new();
        let mut next = 0;

        loop {
            let dispatching = !cancelled && next < total;
            if !dispatching && workers.is_empty() {
                break;
            }

            tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned(), if dispatching => {
                    let Ok(permit) = permit else { break };
                    if *cancel_rx.borrow() {
                        cancelled = true;
                        continue;
                    }

                    let ordinal = next;
                    next += 1;
                    let file_id = ids[ordinal].clone();
                    debug!(file_id = %file_id, ordinal = ordinal, "Dispatching file");

                    // Building the future runs caller code too
                    let work = match std::panic::catch_unwind(AssertUnwindSafe(|| task(file_id))) {
                        Ok(work) => work,
                        Err(panic) => {
                            slots[ordinal] =
                                Some(Err(ScanError::WorkerFailed(panic_message(panic.as_ref()))));
                            continue;
                        }
                    };
                    let tx = tx.clone();
                    workers.spawn(async move {
                        let result = match AssertUnwindSafe(work).catch_unwind().await {
                            Ok(result) => result,
                            Err(panic) => Err(ScanError::WorkerFailed(panic_message(panic.as_ref()))),
                        };
                        drop(permit);
                        // Receiver lives until every worker is joined
                        let _ = tx.send((ordinal, result)).await;
                    });
                }
                Some((ordinal, result)) = rx.recv() => {
                    slots[ordinal] = Some(result);
                }
                Some(joined) = workers.join_next() => {
                    if let Err(e) = joined {
                        if !e.is_cancelled() {
                            warn!(error = %e, "Scan worker ended abnormally");
                        }
                    }
                }
                changed = cancel_rx.changed(), if !cancelled => {
                    if changed.is_ok() && *cancel_rx.borrow_and_update() {
                        cancelled = true;
                        info!(
                            dispatched = next,
                            remaining = total - next,
                            policy = ?self.options.cancel_policy,
                            "Scan cancelled"
                        );
                        if self.options.cancel_policy == CancelPolicy::Abort {
                            workers.abort_all();
                        }
                    }
                }
            }
        }

        // Workers send before finishing, so their results are already buffered
        while let Ok((ordinal, result)) = rx.try_recv() {
            slots[ordinal] = Some(result);
        }

        let entries = ids
            .into_iter()
            .zip(slots)
            .map(|(file_id, slot)| {
                let result = slot.unwrap_or_else(|| {
                    if cancelled {
                        Err(ScanError::Cancelled)
                    } else {
                        Err(ScanError::WorkerFailed("task ended without a result".to_string()))
                    }
                });
                FileResult { file_id, result }
            })
            .collect();

        let report = ScanReport { entries };
        info!("Scan finished: {}", report.summary());
        report
    }
}

/// Keeps the first occurrence of every id
fn dedup_ids(file_ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for id in file_ids {
        if seen.insert(id.clone()) {
            ids.push(id);
        } else {
            warn!(file_id = %id, "Duplicate file id ignored");
        }
    }
    ids
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Result for one file
#[derive(Debug)]
pub struct FileResult<T> {
    pub file_id: String,
    pub result: Result<T, ScanError>,
}

/// Per-file results of a scan, in input order
#[derive(Debug)]
pub struct ScanReport<T> {
    entries: Vec<FileResult<T>>,
}

impl<T> ScanReport<T> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileResult<T>> {
        self.entries.iter()
    }

    pub fn get(&self, file_id: &str) -> Option<&Result<T, ScanError>> {
        self.entries
            .iter()
            .find(|e| e.file_id == file_id)
            .map(|e| &e.result)
    }

    pub fn successes(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().filter_map(|e| match &e.result {
            Ok(value) => Some((e.file_id.as_str(), value)),
            Err(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ScanError)> {
        self.entries.iter().filter_map(|e| match &e.result {
            Ok(_) => None,
            Err(err) => Some((e.file_id.as_str(), err)),
        })
    }

    pub fn summary(&self) -> ScanSummary {
        let mut summary = ScanSummary {
            total: self.entries.len(),
            ..ScanSummary::default()
        };
        for entry in &self.entries {
            match &entry.result {
                Ok(_) => summary.succeeded += 1,
                Err(ScanError::Cancelled) => {
                    summary.failed += 1;
                    summary.cancelled += 1;
                }
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }

    /// `Ok` when no file failed
    pub fn outcome(&self) -> Result<(), OrchestratorError> {
        self.summary().outcome()
    }
}

impl<T> IntoIterator for ScanReport<T> {
    type Item = FileResult<T>;
    type IntoIter = std::vec::IntoIter<FileResult<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Counts of a finished scan; `failed` includes `cancelled`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl ScanSummary {
    pub fn outcome(&self) -> Result<(), OrchestratorError> {
        if self.failed == 0 {
            Ok(())
        } else if self.failed == self.total {
            Err(OrchestratorError::AllFailed { total: self.total })
        } else {
            Err(OrchestratorError::PartialFailure {
                failed: self.failed,
                total: self.total,
            })
        }
    }
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} files succeeded, {} failed", self.succeeded, self.failed)?;
        if self.cancelled > 0 {
            write!(f, " ({} cancelled)", self.cancelled)?;
        }
        Ok(())
    }
}
