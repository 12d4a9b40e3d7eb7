//! Command-line entry point for report-dl
//!
//! Thin glue over [`ReportPipeline`]: parse flags, set up logging (console
//! when verbose, `run.log` for warnings either way), load credentials and the
//! query, discover accounts, run the pipeline. Exits non-zero only on fatal
//! initialization errors; unresolved accounts are reported but do not change
//! the exit code.

use clap::Parser;
use report_dl::{
    Config, Credentials, Error, HttpReportingApi, ReportPipeline, ReportQuery, ReportingApi,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Large-scale multi-account reporting tool
#[derive(Parser, Debug)]
#[command(name = "report-dl")]
#[command(about = "Download, extract, and merge per-account reports", version)]
#[command(group = clap::ArgGroup::new("query_source").required(true))]
struct Cli {
    /// Report query text
    #[arg(short = 'a', long = "awql", group = "query_source", value_name = "QUERY")]
    awql: Option<String>,

    /// ...or a file containing the query
    #[arg(
        short = 'q',
        long = "query-file",
        group = "query_source",
        value_name = "PATH"
    )]
    query_file: Option<PathBuf>,

    /// Path to the credentials file (JSON)
    #[arg(
        short = 't',
        long = "credentials",
        default_value = "credentials.json",
        value_name = "PATH"
    )]
    credentials: PathBuf,

    /// Merged output file
    #[arg(
        short = 'o',
        long = "output",
        default_value = "report.csv",
        value_name = "PATH"
    )]
    output: PathBuf,

    /// Maximum number of concurrent download workers
    #[arg(short = 'n', long = "num-workers", default_value_t = 10, value_name = "N")]
    num_workers: usize,

    /// Maximum number of retry passes (0 = retry failing accounts forever)
    #[arg(long = "max-passes", default_value_t = 0, value_name = "N")]
    max_passes: usize,

    /// Display activity on the console
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

/// Install the console (verbose-only) and `run.log` logging layers
fn init_logging(verbose: bool) -> report_dl::Result<()> {
    let log_file = std::fs::File::create("run.log")?;
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_filter(LevelFilter::WARN);

    let registry = tracing_subscriber::registry().with(file_layer);
    if verbose {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(LevelFilter::INFO),
            )
            .init();
    } else {
        registry.init();
    }
    Ok(())
}

async fn run(cli: Cli) -> report_dl::Result<()> {
    init_logging(cli.verbose)?;

    // Fail fast on unusable credentials; workers re-read the file later
    Credentials::load(&cli.credentials)?;

    let query = if let Some(text) = &cli.awql {
        ReportQuery::new(text.clone())?
    } else if let Some(path) = &cli.query_file {
        tracing::info!(path = %path.display(), "loading query from file");
        ReportQuery::from_file(path)?
    } else {
        // clap's group makes this unreachable, but degrade gracefully
        return Err(Error::Query(
            "either --awql or --query-file is required".to_string(),
        ));
    };

    let mut config = Config {
        credentials_path: Some(cli.credentials.clone()),
        ..Config::default()
    };
    config.pipeline.max_workers = cli.num_workers;
    config.pipeline.max_passes = cli.max_passes;

    let api = Arc::new(HttpReportingApi::new(
        cli.credentials.clone(),
        config.http.clone(),
    ));

    tracing::info!("retrieving account ids");
    let accounts = api.list_account_ids().await?;
    tracing::info!(accounts = accounts.len(), "account ids retrieved");

    let pipeline = ReportPipeline::new(api, config);
    let summary = pipeline.run(accounts, query, &cli.output).await?;

    if summary.is_complete() {
        tracing::info!(passes = summary.pass_count(), "all reports have been obtained");
        if cli.verbose {
            println!(
                "All reports obtained in {} pass(es): {}",
                summary.pass_count(),
                cli.output.display()
            );
        }
    } else {
        tracing::warn!(
            passes = summary.pass_count(),
            unresolved = summary.unresolved.len(),
            "finished with unresolved accounts"
        );
        if cli.verbose {
            println!(
                "Finished in {} pass(es); {} account(s) unresolved, see run.log",
                summary.pass_count(),
                summary.unresolved.len()
            );
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "fatal error");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
