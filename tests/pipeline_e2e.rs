//! End-to-end pipeline tests against a scripted in-memory reporting API
//!
//! Each account is scripted with a sequence of per-attempt behaviors (serve a
//! gzipped report body, or fail with a classified API error); the last entry
//! repeats once the script is drained. Extraction failures are provoked with
//! header-only report bodies, which the extractor rejects as empty.

use flate2::Compression;
use flate2::write::GzEncoder;
use report_dl::{
    AccountId, ApiError, Config, Error, PipelineSummary, ReportPipeline, ReportQuery,
    ReportSession, ReportingApi, SourceError,
};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

/// One scripted download attempt
#[derive(Clone)]
enum Serve {
    /// Serve a gzipped body built from this CSV text
    Report(String),
    /// Fail the download with an abort-class error
    Abort,
}

struct ScriptedApi {
    scripts: Mutex<HashMap<AccountId, VecDeque<Serve>>>,
}

impl ScriptedApi {
    fn new(scripts: impl IntoIterator<Item = (&'static str, Vec<Serve>)>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(
                scripts
                    .into_iter()
                    .map(|(id, serves)| (AccountId::from(id), serves.into_iter().collect()))
                    .collect(),
            ),
        })
    }

    fn next_serve(&self, account: &AccountId) -> Serve {
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts
            .get_mut(account)
            .unwrap_or_else(|| panic!("no script for account {account}"));
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        }
    }

    fn ids(&self) -> Vec<AccountId> {
        let scripts = self.scripts.lock().unwrap();
        let mut ids: Vec<AccountId> = scripts.keys().cloned().collect();
        ids.sort();
        ids
    }
}

struct ScriptedSession {
    api: Arc<ScriptedApi>,
}

#[async_trait::async_trait]
impl ReportSession for ScriptedSession {
    async fn download_report(
        &self,
        account: &AccountId,
        _query: &ReportQuery,
        dest: &Path,
    ) -> Result<(), ApiError> {
        match self.api.next_serve(account) {
            Serve::Report(csv_text) => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(csv_text.as_bytes()).unwrap();
                tokio::fs::write(dest, encoder.finish().unwrap())
                    .await
                    .unwrap();
                Ok(())
            }
            Serve::Abort => Err(ApiError::PermissionDenied),
        }
    }
}

/// Arc-based wrapper so scripted sessions can share the script map
struct SharedApi(Arc<ScriptedApi>);

#[async_trait::async_trait]
impl ReportingApi for SharedApi {
    async fn list_account_ids(&self) -> Result<Vec<AccountId>, SourceError> {
        let ids = self.0.ids();
        if ids.is_empty() {
            return Err(SourceError::Empty);
        }
        Ok(ids)
    }

    async fn open_session(&self, _worker: usize) -> Result<Arc<dyn ReportSession>, ApiError> {
        Ok(Arc::new(ScriptedSession {
            api: Arc::clone(&self.0),
        }))
    }
}

fn good_report(id: &str) -> Serve {
    Serve::Report(format!("Campaign,Clicks\n{id}-row,1\n"))
}

/// A header-only body: downloads fine, fails extraction as empty
fn empty_report() -> Serve {
    Serve::Report("Campaign,Clicks\n".to_string())
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.pipeline.worker_stagger = Duration::from_millis(1);
    config
}

async fn run_pipeline(
    api: Arc<ScriptedApi>,
    config: Config,
    output: &Path,
) -> report_dl::Result<PipelineSummary> {
    let accounts = api.ids();
    let pipeline = ReportPipeline::new(Arc::new(SharedApi(api)), config);
    let query = ReportQuery::new("SELECT Campaign, Clicks FROM CAMPAIGN_REPORT")?;
    pipeline.run(accounts, query, output).await
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(String::from)
        .collect()
}

#[tokio::test]
async fn all_success_takes_one_pass_and_merges_once() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("report.csv");
    let api = ScriptedApi::new([
        ("a1", vec![good_report("a1")]),
        ("a2", vec![good_report("a2")]),
        ("a3", vec![good_report("a3")]),
    ]);

    let summary = run_pipeline(api, test_config(), &output).await.unwrap();

    assert_eq!(summary.pass_count(), 1);
    assert!(summary.is_complete());
    assert_eq!(summary.accounts, 3);

    let lines = read_lines(&output);
    assert_eq!(lines[0], "Campaign,Clicks");
    let mut rows: Vec<&str> = lines[1..].iter().map(String::as_str).collect();
    rows.sort_unstable();
    assert_eq!(rows, vec!["a1-row,1", "a2-row,1", "a3-row,1"]);
}

#[tokio::test]
async fn extraction_failures_are_retried_for_k_plus_one_passes() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("report.csv");
    // b fails extraction twice, then succeeds: 3 passes total
    let api = ScriptedApi::new([
        ("a", vec![good_report("a")]),
        ("b", vec![empty_report(), empty_report(), good_report("b")]),
    ]);

    let summary = run_pipeline(api, test_config(), &output).await.unwrap();

    assert_eq!(summary.pass_count(), 3);
    assert!(summary.is_complete());
    assert_eq!(summary.passes[0].failed, vec![AccountId::from("b")]);
    assert_eq!(summary.passes[1].failed, vec![AccountId::from("b")]);
    assert!(summary.passes[2].failed.is_empty());

    let lines = read_lines(&output);
    let mut rows: Vec<&str> = lines[1..].iter().map(String::as_str).collect();
    rows.sort_unstable();
    assert_eq!(rows, vec!["a-row,1", "b-row,1"]);
}

#[tokio::test]
async fn scenario_one_account_fails_once_then_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("report.csv");
    let api = ScriptedApi::new([
        ("A", vec![good_report("A")]),
        ("B", vec![empty_report(), good_report("B")]),
        ("C", vec![good_report("C")]),
    ]);

    let summary = run_pipeline(api, test_config(), &output).await.unwrap();

    assert_eq!(summary.pass_count(), 2);
    assert!(summary.is_complete());

    let lines = read_lines(&output);
    assert_eq!(
        lines
            .iter()
            .filter(|l| l.as_str() == "Campaign,Clicks")
            .count(),
        1,
        "exactly one header row"
    );
    let mut rows: Vec<&str> = lines[1..].iter().map(String::as_str).collect();
    rows.sort_unstable();
    assert_eq!(rows, vec!["A-row,1", "B-row,1", "C-row,1"]);
}

#[tokio::test]
async fn single_account_gets_a_single_fetch_worker() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("report.csv");
    let api = ScriptedApi::new([("only", vec![good_report("only")])]);

    let mut config = test_config();
    config.pipeline.max_workers = 10;
    let summary = run_pipeline(api, config, &output).await.unwrap();

    assert_eq!(summary.passes[0].fetch_workers, 1);
}

#[tokio::test]
async fn empty_account_set_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("report.csv");
    let api = ScriptedApi::new([("unused", vec![good_report("unused")])]);

    let pipeline = ReportPipeline::new(Arc::new(SharedApi(api)), test_config());
    let query = ReportQuery::new("SELECT Campaign FROM CAMPAIGN_REPORT").unwrap();
    let err = pipeline.run(Vec::new(), query, &output).await.unwrap_err();

    assert!(matches!(err, Error::Source(SourceError::Empty)));
    assert!(!output.exists(), "no pass means no output");
}

#[tokio::test]
async fn pass_limit_keeps_partial_output_and_reports_unresolved() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("report.csv");
    let api = ScriptedApi::new([
        ("dead", vec![empty_report()]),
        ("fine", vec![good_report("fine")]),
    ]);

    let mut config = test_config();
    config.pipeline.max_passes = 2;
    let summary = run_pipeline(api, config, &output).await.unwrap();

    assert_eq!(summary.pass_count(), 2);
    assert!(!summary.is_complete());
    assert_eq!(summary.unresolved, vec![AccountId::from("dead")]);

    let lines = read_lines(&output);
    assert_eq!(lines, vec!["Campaign,Clicks", "fine-row,1"]);
}

#[tokio::test]
async fn download_dead_account_is_dropped_silently_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("report.csv");
    // "gone" aborts every download attempt; baseline semantics drop it for
    // the whole run without any retry pass
    let api = ScriptedApi::new([
        ("gone", vec![Serve::Abort]),
        ("fine", vec![good_report("fine")]),
    ]);

    let summary = run_pipeline(api, test_config(), &output).await.unwrap();

    assert_eq!(summary.pass_count(), 1);
    assert!(summary.is_complete(), "fetch-dead accounts are not tracked");
    assert_eq!(read_lines(&output), vec!["Campaign,Clicks", "fine-row,1"]);
}

#[tokio::test]
async fn requeue_fetch_failures_unifies_both_failure_paths() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("report.csv");
    // With the unified collector, an abort on pass 1 earns a second chance
    let api = ScriptedApi::new([("flaky", vec![Serve::Abort, good_report("flaky")])]);

    let mut config = test_config();
    config.pipeline.requeue_fetch_failures = true;
    let summary = run_pipeline(api, config, &output).await.unwrap();

    assert_eq!(summary.pass_count(), 2);
    assert!(summary.is_complete());
    assert_eq!(read_lines(&output), vec!["Campaign,Clicks", "flaky-row,1"]);
}

#[tokio::test]
async fn zero_workers_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("report.csv");
    let api = ScriptedApi::new([("a", vec![good_report("a")])]);

    let mut config = test_config();
    config.pipeline.max_workers = 0;
    let err = run_pipeline(api, config, &output).await.unwrap_err();

    assert!(matches!(err, Error::Config { .. }));
}

#[tokio::test]
async fn merging_twice_is_idempotent_modulo_enumeration_order() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("1.csv"), "H,V\none,1\n").unwrap();
    std::fs::write(dir.path().join("2.csv"), "H,V\ntwo,2\n").unwrap();

    let out1 = dir.path().join("first.out");
    let out2 = dir.path().join("second.out");
    report_dl::merge_reports(dir.path(), &out1).unwrap();
    report_dl::merge_reports(dir.path(), &out2).unwrap();

    assert_eq!(std::fs::read(&out1).unwrap(), std::fs::read(&out2).unwrap());
}
