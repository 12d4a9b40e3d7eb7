//! Pass coordination -- owns the queues, worker pools, and the retry loop
//!
//! One pass seeds the account-id queue, starts the extract pool and a bounded
//! fetch pool, and blocks on queue drains: first until every account id is
//! acknowledged (then the id queue closes and fetch workers wind down), then
//! until every staged report is acknowledged (then the extraction queue closes
//! and extract workers wind down). Pass completion is defined by "all work
//! acknowledged", not by joining worker tasks. A pass that ends with failures
//! seeds the next one; a clean pass ends the loop and the merge runs.

use super::{
    ExtractContext, FailureCollector, FetchContext, ReportPipeline, extractor, fetch_worker_count,
    fetcher, merger,
};
use crate::client::ReportQuery;
use crate::error::{Error, Result, SourceError};
use crate::queue::WorkQueue;
use crate::types::{AccountId, PassStats, PipelineSummary};
use std::path::Path;
use std::sync::Arc;

impl ReportPipeline {
    /// Run the whole pipeline: fetch and extract every account's report
    /// across as many passes as it takes, then merge into `output`
    ///
    /// Individual account failures are retried in later passes and never
    /// terminate the run. With a bounded `max_passes`, accounts still failing
    /// when the limit is hit are reported in the summary's `unresolved` list
    /// and the partial output is kept. An empty account list is fatal.
    pub async fn run(
        &self,
        accounts: Vec<AccountId>,
        query: ReportQuery,
        output: &Path,
    ) -> Result<PipelineSummary> {
        if accounts.is_empty() {
            return Err(Error::Source(SourceError::Empty));
        }
        if self.config.pipeline.max_workers == 0 {
            return Err(Error::Config {
                message: "max_workers must be at least 1".to_string(),
                key: Some("max_workers".to_string()),
            });
        }
        if self.config.pipeline.extract_workers == 0 {
            return Err(Error::Config {
                message: "extract_workers must be at least 1".to_string(),
                key: Some("extract_workers".to_string()),
            });
        }

        let work_dir = tempfile::tempdir().map_err(|e| Error::WorkDir {
            path: std::env::temp_dir(),
            reason: e.to_string(),
        })?;
        tracing::info!(
            path = %work_dir.path().display(),
            accounts = accounts.len(),
            "working directory created"
        );

        let total = accounts.len();
        let max_passes = self.config.pipeline.max_passes;
        let mut pending = accounts;
        let mut passes: Vec<PassStats> = Vec::new();
        let mut unresolved: Vec<AccountId> = Vec::new();

        loop {
            let pass = passes.len() + 1;
            let stats = self
                .run_pass(pass, pending, &query, work_dir.path())
                .await;
            let failed = stats.failed.clone();
            passes.push(stats);

            if failed.is_empty() {
                break;
            }
            if max_passes != 0 && passes.len() >= max_passes {
                tracing::warn!(
                    passes = passes.len(),
                    unresolved = failed.len(),
                    "pass limit reached, keeping partial output"
                );
                unresolved = failed;
                break;
            }
            tracing::info!(pass = pass, failed = failed.len(), "re-queuing failed accounts");
            pending = failed;
        }

        let merged = {
            let dir = work_dir.path().to_path_buf();
            let out = output.to_path_buf();
            tokio::task::spawn_blocking(move || merger::merge_reports(&dir, &out))
                .await
                .map_err(|e| Error::Merge(format!("merge task panicked: {e}")))??
        };
        tracing::info!(
            files = merged,
            passes = passes.len(),
            output = %output.display(),
            "all reports merged"
        );

        // work_dir drops here, removing staged and final per-account files
        Ok(PipelineSummary {
            accounts: total,
            passes,
            unresolved,
        })
    }

    /// Run one fetch+extract pass over `pending`
    async fn run_pass(
        &self,
        pass: usize,
        pending: Vec<AccountId>,
        query: &ReportQuery,
        work_dir: &Path,
    ) -> PassStats {
        let attempted = pending.len();
        let ids: Arc<WorkQueue<AccountId>> = Arc::new(WorkQueue::new());
        let extract_queue: Arc<WorkQueue<AccountId>> = Arc::new(WorkQueue::new());
        let failures = Arc::new(FailureCollector::new());

        for account in pending {
            ids.push(account).await;
        }

        tracing::info!(pass = pass, accounts = attempted, "starting pass");

        for worker in 0..self.config.pipeline.extract_workers {
            tokio::spawn(extractor::run_extract_worker(ExtractContext {
                worker,
                extract_queue: Arc::clone(&extract_queue),
                failures: Arc::clone(&failures),
                work_dir: work_dir.to_path_buf(),
            }));
        }

        let fetch_workers = fetch_worker_count(attempted, self.config.pipeline.max_workers);
        for worker in 0..fetch_workers {
            tokio::spawn(fetcher::run_fetch_worker(FetchContext {
                worker,
                api: Arc::clone(&self.api),
                ids: Arc::clone(&ids),
                extract_queue: Arc::clone(&extract_queue),
                failures: Arc::clone(&failures),
                query: query.clone(),
                work_dir: work_dir.to_path_buf(),
                retry: self.config.retry.clone(),
                requeue_fetch_failures: self.config.pipeline.requeue_fetch_failures,
            }));
            // Staggered startup keeps the API from seeing a thundering herd
            // of simultaneous new connections
            tokio::time::sleep(self.config.pipeline.worker_stagger).await;
        }
        tracing::info!(pass = pass, fetch_workers = fetch_workers, "worker pools started");

        // Drain, then signal end-of-work so every sibling worker winds down
        ids.join().await;
        ids.close().await;
        extract_queue.join().await;
        extract_queue.close().await;

        let mut failed = failures.drain().await;
        failed.sort();
        tracing::info!(pass = pass, failed = failed.len(), "pass complete");

        PassStats {
            pass,
            fetch_workers,
            attempted,
            failed,
        }
    }
}
