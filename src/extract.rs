//! Raw extraction of headerless delimited source files.
//!
//! Reads each file of a dataset as latin-1 text, splits lines on the
//! dataset delimiter and projects only the column positions named in the
//! column map. All values stay uninterpreted text: premature numeric
//! coercion would destroy the malformed values the curation engine must
//! later classify.

use crate::config::DatasetSpec;
use crate::error::{EtlError, Result};
use crate::models::{ColumnMap, RawBatch};
use std::path::Path;
use tracing::{debug, info, warn};

/// Read and combine all source files of a dataset into one raw batch.
///
/// Missing files are skipped with a warning; at least one file must be
/// readable or the extraction fails. Malformed lines (too few fields for
/// the column map) are skipped with a warning, never fatal. The map
/// declares no total field count, so lines with extra trailing fields
/// are accepted and only the mapped positions are read.
pub fn extract_dataset(spec: &DatasetSpec) -> Result<RawBatch> {
    let mut batch = RawBatch::new(spec.columns.names());
    let mut files_read = 0usize;

    for path in &spec.files {
        if !path.exists() {
            warn!("Source file not found: {}. Skipping.", path.display());
            continue;
        }
        info!("Reading source file: {}", path.display());
        read_file_into(path, &spec.columns, spec.delimiter, &mut batch)?;
        files_read += 1;
    }

    if files_read == 0 {
        return Err(EtlError::SourceUnavailable {
            dataset: spec.kind.name().to_string(),
        });
    }

    info!(
        "Extraction complete for '{}': {} rows combined from {} file(s)",
        spec.kind.name(),
        batch.len(),
        files_read
    );
    Ok(batch)
}

/// Append the projected rows of one file to the batch
fn read_file_into(
    path: &Path,
    columns: &ColumnMap,
    delimiter: char,
    batch: &mut RawBatch,
) -> Result<()> {
    // Legacy single-byte charset: decode the whole file as latin-1
    let bytes = std::fs::read(path)?;
    let text = encoding_rs::mem::decode_latin1(&bytes);

    let min_fields = columns.max_position() + 1;
    let mut malformed = 0usize;

    for (line_num, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(delimiter).collect();
        if fields.len() < min_fields {
            malformed += 1;
            warn!(
                "Malformed line {} in {} ({} fields, need at least {}). Skipping.",
                line_num + 1,
                path.display(),
                fields.len(),
                min_fields
            );
            continue;
        }
        let row: Vec<String> = columns
            .iter()
            .map(|(_, position)| fields[position].to_string())
            .collect();
        batch.push_row(row);
    }

    debug!(
        "Read {}: {} rows so far, {} malformed lines skipped",
        path.display(),
        batch.len(),
        malformed
    );
    Ok(())
}
