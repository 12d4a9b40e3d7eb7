//! Error types for report-dl
//!
//! This module provides the error handling for the library, including:
//! - The crate-level [`Error`] used by the coordinator and the CLI
//! - [`SourceError`] for account discovery failures (fatal before any pass)
//! - [`ApiError`], the typed, closed enumeration of account-level download
//!   failures, classified once at the API-client boundary
//! - [`ExtractError`] for per-account extraction failures

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for report-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for report-dl
///
/// Every variant here is initialization-class or run-terminating: account-level
/// failures never surface as `Error` -- they stay inside the pipeline's retry
/// machinery as [`ApiError`] / [`ExtractError`].
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_workers")
        key: Option<String>,
    },

    /// Credentials file could not be loaded or parsed
    #[error("credentials error: {0}")]
    Credentials(String),

    /// Account discovery failed
    #[error("account source error: {0}")]
    Source(#[from] SourceError),

    /// Query text could not be obtained
    #[error("query error: {0}")]
    Query(String),

    /// Working directory could not be created or cleared
    #[error("working directory error at {path}: {reason}")]
    WorkDir {
        /// The path that could not be used as the working directory
        path: PathBuf,
        /// The reason the working directory is unusable
        reason: String,
    },

    /// Merging per-account outputs failed
    #[error("merge error: {0}")]
    Merge(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Account discovery errors
///
/// Any of these is fatal: without a non-empty id list no pass is attempted.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The directory call was rejected for bad credentials
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The directory call succeeded but returned no account ids
    #[error("no account ids were returned")]
    Empty,

    /// The directory call kept failing after its bounded retries
    #[error("account listing unavailable: {0}")]
    Unavailable(String),
}

/// Account-level download errors, classified at the API-client boundary
///
/// The pipeline's retry policy dispatches on the error's class alone and
/// never inspects message text. Abort-class kinds are permanently invalid for
/// the account; retry-class kinds are transient; `RateLimited` carries the
/// server-requested pause.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The customer id in the request is not a valid id
    #[error("invalid customer id")]
    InvalidCustomer,

    /// The customer id is well-formed but names no account
    #[error("customer not found")]
    CustomerNotFound,

    /// The authenticated user may not read this account
    #[error("permission denied")]
    PermissionDenied,

    /// The query was rejected as malformed
    #[error("malformed query: {0}")]
    MalformedQuery(String),

    /// The reporting backend failed to produce a response
    #[error("backend error: {0}")]
    Backend(String),

    /// A network-level failure (connect, timeout, reset)
    #[error("network error: {0}")]
    Network(String),

    /// A TLS-level failure during the request
    #[error("TLS error: {0}")]
    Tls(String),

    /// The server asked the client to slow down
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Server-specified pause before the next attempt
        retry_after: Duration,
    },

    /// Anything the client could not map onto a known kind
    #[error("unknown API error: {0}")]
    Unknown(String),
}

/// Per-account extraction errors
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The decompressed report carried a header but zero data rows
    #[error("report is empty")]
    Empty,

    /// The staged file carried no rows at all, not even a header
    #[error("report has no header row")]
    MissingHeader,

    /// A row failed to parse or re-serialize
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Reading the staged file or writing the final file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
