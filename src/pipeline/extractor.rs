//! Extract worker -- decompresses and validates staged reports
//!
//! Reports stream row-by-row from the gzipped staging file through a CSV
//! reader into the final per-account file, re-serialized with the canonical
//! delimiter/quoting convention. The first row is the header and is written
//! unconditionally. Empty or corrupt reports fail the account for the pass;
//! the staged file is deleted in every case so the working directory stays
//! bounded.

use super::ExtractContext;
use crate::error::ExtractError;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Run one extract worker until the extraction queue closes
pub(crate) async fn run_extract_worker(ctx: ExtractContext) {
    while let Some(account) = ctx.extract_queue.recv().await {
        let staged = ctx.work_dir.join(account.staged_file_name());
        let dest = ctx.work_dir.join(account.report_file_name());

        let outcome =
            tokio::task::spawn_blocking(move || extract_report(&staged, &dest)).await;

        match outcome {
            Ok(Ok(rows)) => {
                tracing::info!(
                    worker = ctx.worker,
                    account = %account,
                    rows = rows,
                    "report extracted"
                );
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    worker = ctx.worker,
                    account = %account,
                    error = %e,
                    "extraction failed, account will be retried next pass"
                );
                ctx.failures.push(account.clone()).await;
            }
            Err(e) => {
                tracing::error!(
                    worker = ctx.worker,
                    account = %account,
                    error = %e,
                    "extraction task panicked, account will be retried next pass"
                );
                ctx.failures.push(account.clone()).await;
            }
        }

        ctx.extract_queue.ack();
    }

    tracing::debug!(worker = ctx.worker, "extract worker finished");
}

/// Decompress one staged report into its final file
///
/// Returns the number of data rows written. The staged input is removed
/// whether extraction succeeds or fails; the final file is removed on
/// failure.
pub(crate) fn extract_report(staged: &Path, dest: &Path) -> Result<u64, ExtractError> {
    let result = copy_rows(staged, dest);
    let _ = std::fs::remove_file(staged);
    if result.is_err() {
        let _ = std::fs::remove_file(dest);
    }
    result
}

fn copy_rows(staged: &Path, dest: &Path) -> Result<u64, ExtractError> {
    let input = File::open(staged)?;
    let decoder = GzDecoder::new(BufReader::new(input));
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(decoder);
    let mut writer = csv::Writer::from_path(dest)?;

    let mut record = csv::ByteRecord::new();
    if !reader.read_byte_record(&mut record)? {
        return Err(ExtractError::MissingHeader);
    }
    writer.write_byte_record(&record)?;

    let mut rows: u64 = 0;
    while reader.read_byte_record(&mut record)? {
        writer.write_byte_record(&record)?;
        rows += 1;
    }
    writer.flush()?;

    if rows == 0 {
        return Err(ExtractError::Empty);
    }
    Ok(rows)
}
