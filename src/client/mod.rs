//! Reporting API boundary
//!
//! The pipeline talks to the remote reporting system through two seams:
//! [`ReportingApi`] (account discovery plus per-worker session setup) and
//! [`ReportSession`] (one authenticated session downloading reports). The
//! production implementation is [`HttpReportingApi`]; tests substitute
//! scripted in-memory implementations.

mod http;

pub use http::HttpReportingApi;

use crate::error::{ApiError, Error, Result, SourceError};
use crate::types::AccountId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Credentials for the remote reporting API
///
/// Loaded from a JSON file. A missing or malformed file is fatal at startup;
/// fetch workers re-read it when opening their session and retry indefinitely
/// on transient read failures.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credentials {
    /// API token identifying the caller
    pub developer_token: String,

    /// Manager account under which child accounts are listed
    #[serde(default)]
    pub manager_id: Option<String>,

    /// Endpoint override; falls back to the configured endpoint when absent
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Credentials {
    /// Load credentials from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            Error::Credentials(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&data)
            .map_err(|e| Error::Credentials(format!("cannot parse {}: {}", path.display(), e)))
    }
}

/// A validated report query
///
/// The remote API takes the query as a single line; queries read from a file
/// have their line breaks folded to spaces first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportQuery(String);

impl ReportQuery {
    /// Build a query from literal text
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Query("query text is empty".to_string()));
        }
        Ok(Self(text.to_string()))
    }

    /// Read a query from a file, folding CR/LF into spaces
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Query(format!("cannot read {}: {}", path.display(), e)))?;
        Self::new(raw.replace('\r', "").replace('\n', " "))
    }

    /// The query text as a single line
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One authenticated session against the reporting API
///
/// A fetch worker holds exactly one session for its whole lifetime and runs
/// every download through it.
#[async_trait::async_trait]
pub trait ReportSession: Send + Sync {
    /// Download one account's report, gzipped, into `dest`
    async fn download_report(
        &self,
        account: &AccountId,
        query: &ReportQuery,
        dest: &Path,
    ) -> std::result::Result<(), ApiError>;
}

/// Entry points into the remote reporting system
#[async_trait::async_trait]
pub trait ReportingApi: Send + Sync {
    /// List every account id to report on
    ///
    /// Fails with [`SourceError::Authentication`] on bad credentials and
    /// [`SourceError::Empty`] when the listing comes back empty -- both fatal.
    async fn list_account_ids(&self) -> std::result::Result<Vec<AccountId>, SourceError>;

    /// Open an authenticated session for one fetch worker
    async fn open_session(
        &self,
        worker: usize,
    ) -> std::result::Result<Arc<dyn ReportSession>, ApiError>;
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_from_literal_trims_and_rejects_empty() {
        let query = ReportQuery::new("  SELECT Id FROM report  ").unwrap();
        assert_eq!(query.as_str(), "SELECT Id FROM report");

        assert!(ReportQuery::new("   ").is_err());
    }

    #[test]
    fn query_file_folds_line_breaks_to_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("query.awql");
        std::fs::write(&path, "SELECT Id\r\nFROM report\r\nWHERE x > 1\n").unwrap();

        let query = ReportQuery::from_file(&path).unwrap();
        assert_eq!(query.as_str(), "SELECT Id FROM report WHERE x > 1");
    }

    #[test]
    fn query_file_missing_is_an_error() {
        assert!(ReportQuery::from_file(Path::new("/nonexistent/query.awql")).is_err());
    }

    #[test]
    fn credentials_load_and_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(
            &path,
            r#"{"developer_token": "tok-123", "manager_id": "999"}"#,
        )
        .unwrap();

        let creds = Credentials::load(&path).unwrap();
        assert_eq!(creds.developer_token, "tok-123");
        assert_eq!(creds.manager_id.as_deref(), Some("999"));
        assert!(creds.endpoint.is_none());
    }

    #[test]
    fn credentials_missing_file_is_fatal() {
        let err = Credentials::load(Path::new("/nonexistent/credentials.json")).unwrap_err();
        assert!(matches!(err, Error::Credentials(_)));
    }

    #[test]
    fn credentials_malformed_json_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Credentials::load(&path),
            Err(Error::Credentials(_))
        ));
    }
}
