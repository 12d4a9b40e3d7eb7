//! Configuration types for report-dl

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Pipeline behavior configuration (worker pools, pass loop)
///
/// Groups settings related to how a run schedules its fetch and extract
/// workers. Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of concurrent fetch workers per pass (default: 10)
    ///
    /// A pass never starts more workers than it has accounts left.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Number of extract workers per pass (default: 2)
    #[serde(default = "default_extract_workers")]
    pub extract_workers: usize,

    /// Delay between consecutive fetch-worker startups (default: 100 ms)
    ///
    /// Staggering avoids a thundering herd of simultaneous API connections.
    #[serde(default = "default_worker_stagger", with = "duration_millis_serde")]
    pub worker_stagger: Duration,

    /// Maximum number of passes before giving up on still-failing accounts
    /// (default: 0 = unbounded)
    ///
    /// When the limit is reached the run keeps its partial output and reports
    /// the unresolved accounts instead of looping forever.
    #[serde(default)]
    pub max_passes: usize,

    /// Requeue accounts whose download exhausted its retry budget (default: false)
    ///
    /// The baseline behavior drops such accounts for the whole run; only
    /// extraction failures are retried in later passes. Enabling this routes
    /// both failure paths through the same collector so every unresolved
    /// account is re-attempted next pass.
    #[serde(default)]
    pub requeue_fetch_failures: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            extract_workers: default_extract_workers(),
            worker_stagger: default_worker_stagger(),
            max_passes: 0,
            requeue_fetch_failures: false,
        }
    }
}

/// Retry policy for one download attempt sequence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum tries per download before the account is given up for the pass
    /// (default: 5)
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,

    /// Add random jitter to rate-limit waits (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: default_max_tries(),
            jitter: true,
        }
    }
}

/// Remote reporting API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Base URL of the reporting API
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-download I/O timeout (default: 15 minutes)
    ///
    /// Large reports stream slowly; the timeout must cover the whole body.
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download_timeout: Duration,

    /// Bounded retry count for the account directory call (default: 10)
    #[serde(default = "default_listing_tries")]
    pub listing_tries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            download_timeout: default_download_timeout(),
            listing_tries: default_listing_tries(),
        }
    }
}

/// Main configuration for a pipeline run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path to the credentials file (JSON)
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,

    /// Worker pool and pass-loop settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Per-download retry policy
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Remote API settings
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_max_workers() -> usize {
    10
}

fn default_extract_workers() -> usize {
    2
}

fn default_worker_stagger() -> Duration {
    Duration::from_millis(100)
}

fn default_max_tries() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    "https://reports.example.com/api/v2".to_string()
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_listing_tries() -> u32 {
    10
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds, for sub-second settings)
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.pipeline.max_workers, 10);
        assert_eq!(config.pipeline.extract_workers, 2);
        assert_eq!(config.pipeline.worker_stagger, Duration::from_millis(100));
        assert_eq!(config.pipeline.max_passes, 0);
        assert!(!config.pipeline.requeue_fetch_failures);
        assert_eq!(config.retry.max_tries, 5);
        assert!(config.retry.jitter);
        assert_eq!(config.http.download_timeout, Duration::from_secs(900));
        assert_eq!(config.http.listing_tries, 10);
    }

    #[test]
    fn empty_json_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.pipeline.max_workers, 10);
        assert_eq!(config.retry.max_tries, 5);
    }

    #[test]
    fn durations_round_trip_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pipeline.worker_stagger, config.pipeline.worker_stagger);
        assert_eq!(back.http.download_timeout, config.http.download_timeout);
    }

    #[test]
    fn partial_overrides_keep_other_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"pipeline": {"max_workers": 3, "max_passes": 4}}"#).unwrap();
        assert_eq!(config.pipeline.max_workers, 3);
        assert_eq!(config.pipeline.max_passes, 4);
        assert_eq!(config.pipeline.extract_workers, 2);
    }
}
