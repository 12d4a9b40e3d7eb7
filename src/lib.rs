//! # report-dl
//!
//! Large-scale multi-account reporting pipeline.
//!
//! report-dl downloads one compressed tabular report per account from a
//! remote reporting API, decompresses and validates each report, retries
//! failed accounts across passes, and merges every valid report into a single
//! output file with one header row.
//!
//! ## Design Philosophy
//!
//! - **Partial failure is normal** - one account failing never stops the run;
//!   failed accounts are re-fetched in later passes
//! - **Classified retries** - download errors carry a typed abort / retry /
//!   rate-limit class decided once at the API boundary
//! - **Bounded concurrency** - a staggered fetch pool and a small extract
//!   pool share work over acknowledged queues
//! - **Library-first** - the CLI is a thin wrapper over [`ReportPipeline`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use report_dl::{Config, HttpReportingApi, ReportPipeline, ReportQuery, ReportingApi};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let api = Arc::new(HttpReportingApi::new("credentials.json", config.http.clone()));
//!
//!     let accounts = api.list_account_ids().await?;
//!     let query = ReportQuery::new(
//!         "SELECT CampaignId, Clicks FROM CAMPAIGN_PERFORMANCE_REPORT",
//!     )?;
//!
//!     let pipeline = ReportPipeline::new(api, config);
//!     let summary = pipeline.run(accounts, query, "report.csv".as_ref()).await?;
//!     println!("merged after {} pass(es)", summary.pass_count());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Reporting API boundary (traits, credentials, HTTP implementation)
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// The fetch-extract-merge pipeline
pub mod pipeline;
/// Acknowledged MPMC work queue
pub mod queue;
/// Classified retry logic
pub mod retry;
/// Core types
pub mod types;

// Re-export commonly used types
pub use client::{Credentials, HttpReportingApi, ReportQuery, ReportSession, ReportingApi};
pub use config::{Config, HttpConfig, PipelineConfig, RetryPolicy};
pub use error::{ApiError, Error, ExtractError, Result, SourceError};
pub use pipeline::{ReportPipeline, merge_reports};
pub use queue::WorkQueue;
pub use retry::{Classify, ErrorClass, download_with_retry};
pub use types::{AccountId, PassStats, PipelineSummary};
