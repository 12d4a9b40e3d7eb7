//! Concurrent fetch-extract-merge pipeline
//!
//! The pipeline runs in passes. Each pass pours the pending account ids into
//! a [`WorkQueue`], fans them out to a bounded pool of fetch workers, hands
//! staged downloads to a fixed pool of extract workers over a second queue,
//! and collects extraction failures. Failed accounts seed the next pass; a
//! pass with zero failures ends the loop and triggers the merge.
//!
//! Submodules:
//! - [`coordinator`] - pass loop, queue draining, merge hand-off
//! - [`fetcher`] - download worker (classified bounded retry)
//! - [`extractor`] - decompression/validation worker
//! - [`merger`] - header-deduplicating concatenation

mod coordinator;
mod extractor;
mod fetcher;
mod merger;

pub use merger::merge_reports;

use crate::client::{ReportQuery, ReportingApi};
use crate::config::{Config, RetryPolicy};
use crate::queue::WorkQueue;
use crate::types::AccountId;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The fetch-extract-merge pipeline
///
/// Cheap to construct; all state lives per run. The API handle is a trait
/// object so tests can drive the pipeline with a scripted in-memory API.
pub struct ReportPipeline {
    config: Arc<Config>,
    api: Arc<dyn ReportingApi>,
}

impl ReportPipeline {
    /// Create a pipeline over an API handle and configuration
    pub fn new(api: Arc<dyn ReportingApi>, config: Config) -> Self {
        Self {
            config: Arc::new(config),
            api,
        }
    }
}

/// Accounts that failed their pass and must be re-attempted
pub(crate) struct FailureCollector {
    failed: Mutex<Vec<AccountId>>,
}

impl FailureCollector {
    pub(crate) fn new() -> Self {
        Self {
            failed: Mutex::new(Vec::new()),
        }
    }

    pub(crate) async fn push(&self, account: AccountId) {
        self.failed.lock().await.push(account);
    }

    pub(crate) async fn drain(&self) -> Vec<AccountId> {
        std::mem::take(&mut *self.failed.lock().await)
    }
}

/// Everything one fetch worker needs for its pass
///
/// Workers are reused across many accounts within a pass; per-unit state
/// (the account currently in flight) stays in local variables and tracing
/// fields rather than worker-level mutable fields.
pub(crate) struct FetchContext {
    pub(crate) worker: usize,
    pub(crate) api: Arc<dyn ReportingApi>,
    pub(crate) ids: Arc<WorkQueue<AccountId>>,
    pub(crate) extract_queue: Arc<WorkQueue<AccountId>>,
    pub(crate) failures: Arc<FailureCollector>,
    pub(crate) query: ReportQuery,
    pub(crate) work_dir: PathBuf,
    pub(crate) retry: RetryPolicy,
    pub(crate) requeue_fetch_failures: bool,
}

/// Everything one extract worker needs for its pass
pub(crate) struct ExtractContext {
    pub(crate) worker: usize,
    pub(crate) extract_queue: Arc<WorkQueue<AccountId>>,
    pub(crate) failures: Arc<FailureCollector>,
    pub(crate) work_dir: PathBuf,
}

/// Number of fetch workers for a pass: never more than there is work left
pub(crate) fn fetch_worker_count(remaining: usize, max_workers: usize) -> usize {
    remaining.min(max_workers)
}
