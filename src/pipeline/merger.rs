//! Merge step -- concatenates per-account reports into one output
//!
//! Every final per-account file carries the same header; the merge writes the
//! header of the first file encountered and only data rows from the rest.
//! Files are visited in sorted name order so a run's output is stable; data
//! rows are never deduplicated across accounts, each account's report is
//! independent.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Merge all `*.csv` files under `work_dir` into `output`
///
/// Returns the number of per-account files merged. An empty working directory
/// produces an empty output file.
pub fn merge_reports(work_dir: &Path, output: &Path) -> Result<usize> {
    let mut report_files: Vec<PathBuf> = std::fs::read_dir(work_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    report_files.sort();

    let mut writer = csv::Writer::from_path(output)
        .map_err(|e| Error::Merge(format!("cannot create {}: {}", output.display(), e)))?;

    let mut first = true;
    for path in &report_files {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(|e| Error::Merge(format!("cannot read {}: {}", path.display(), e)))?;

        let mut record = csv::ByteRecord::new();
        let mut index = 0usize;
        loop {
            let read = reader
                .read_byte_record(&mut record)
                .map_err(|e| Error::Merge(format!("bad row in {}: {}", path.display(), e)))?;
            if !read {
                break;
            }
            // Skip the header row of every file after the first
            if index > 0 || first {
                writer
                    .write_byte_record(&record)
                    .map_err(|e| Error::Merge(e.to_string()))?;
            }
            index += 1;
        }
        first = false;
    }

    writer
        .flush()
        .map_err(|e| Error::Merge(format!("cannot flush {}: {}", output.display(), e)))?;

    Ok(report_files.len())
}
