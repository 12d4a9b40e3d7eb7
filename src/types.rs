//! Core types for report-dl

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque account identifier, supplied by the account source
///
/// Ids are treated as text even when the remote system hands out integers:
/// the pipeline only ever compares them and uses them as filename stems.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Create an account id from anything string-like
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filename of the staged (compressed) report for this account
    pub fn staged_file_name(&self) -> String {
        format!("{}.report.gz", self.0)
    }

    /// Filename of the final (extracted) report for this account
    pub fn report_file_name(&self) -> String {
        format!("{}.csv", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Outcome of one fetch+extract pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassStats {
    /// 1-based pass number
    pub pass: usize,
    /// Number of fetch workers the coordinator started for this pass
    pub fetch_workers: usize,
    /// Accounts this pass processed
    pub attempted: usize,
    /// Accounts that failed this pass and were handed to the next one
    pub failed: Vec<AccountId>,
}

/// Outcome of a whole pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Total number of accounts the run started with
    pub accounts: usize,
    /// Per-pass statistics, in pass order
    pub passes: Vec<PassStats>,
    /// Accounts still failing when the pass limit cut the retry loop short;
    /// empty on a fully successful run
    pub unresolved: Vec<AccountId>,
}

impl PipelineSummary {
    /// Number of passes the run took
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// True when every account made it into the merged output
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}
