//! Curation engine: the accepted/rejected split.
//!
//! Takes one raw batch for a dataset and deterministically partitions it
//! into an accepted table (typed, repaired, enriched) and a rejected set
//! (original text, verbatim). A row is rejected if and only if a critical
//! field (identifier or acceptance date) cannot be coerced. Every other
//! defect is repaired, never fatal: auxiliary
//! numeric anomalies are assumed to be source noise, whereas a bad
//! identifier or date makes a row unjoinable and useless downstream.

use crate::config::DatasetSpec;
use crate::error::{EtlError, Result};
use crate::models::{
    COL_FECHAACEPT, COL_NUMEROIDENT, CurationStats, NUMERIC_FIELDS, RawBatch,
};
use chrono::{Datelike, NaiveDate, Utc};
use polars::prelude::*;
use std::collections::HashSet;
use tracing::{info, warn};

/// Enrichment columns appended to every accepted table, in output order
pub const ENRICHMENT_COLUMNS: &[&str] = &[
    "hora_lectura_archivo",
    "anio",
    "mes",
    "hora_procesamiento",
];

/// Result of one curation pass
#[derive(Debug)]
pub struct CurationOutcome {
    /// Typed, repaired and enriched rows, ready for the analytical store
    pub accepted: DataFrame,
    /// Rows that failed critical validation, pre-trim and pre-coercion
    pub rejected: RawBatch,
    pub stats: CurationStats,
}

/// Deduplicate, validate, repair and enrich a raw batch, splitting it
/// into accepted and rejected sets.
///
/// Fails only on structural problems: an empty column map or a batch
/// lacking a critical column. Data defects never abort the pass.
pub fn curate_and_split(batch: RawBatch, spec: &DatasetSpec) -> Result<CurationOutcome> {
    let dataset = spec.kind.name();
    if spec.columns.is_empty() {
        return Err(EtlError::EmptyColumnMap {
            dataset: dataset.to_string(),
        });
    }
    let ident_idx =
        batch
            .column_index(COL_NUMEROIDENT)
            .ok_or_else(|| EtlError::MissingCriticalColumn {
                dataset: dataset.to_string(),
                column: COL_NUMEROIDENT.to_string(),
            })?;
    let fecha_idx =
        batch
            .column_index(COL_FECHAACEPT)
            .ok_or_else(|| EtlError::MissingCriticalColumn {
                dataset: dataset.to_string(),
                column: COL_FECHAACEPT.to_string(),
            })?;

    let extraction_time = Utc::now();
    let input_rows = batch.len();
    info!("Starting curation for '{dataset}': {input_rows} input rows");

    // Exact-duplicate removal on raw text, keeping first occurrence
    let column_names: Vec<String> = batch.columns().to_vec();
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(input_rows);
    for row in batch.into_rows() {
        if seen.insert(row.clone()) {
            rows.push(row);
        }
    }
    let deduplicated_rows = rows.len();

    // Non-destructive critical coercion, then the single reject gate:
    // null identifier OR null date, nothing else.
    let mut accepted_raw: Vec<Vec<String>> = Vec::with_capacity(rows.len());
    let mut idents: Vec<i64> = Vec::new();
    let mut fechas: Vec<NaiveDate> = Vec::new();
    let mut rejected = RawBatch::new(column_names.clone());
    for row in rows {
        let ident = parse_identifier(row[ident_idx].trim());
        let fecha = parse_acceptance_date(row[fecha_idx].trim());
        match (ident, fecha) {
            (Some(ident), Some(fecha)) => {
                idents.push(ident);
                fechas.push(fecha);
                accepted_raw.push(row);
            }
            // Rejected rows keep their original pre-trim text
            _ => rejected.push_row(row),
        }
    }

    let mut repaired_values = 0usize;
    let n = accepted_raw.len();
    let mut out_columns: Vec<Column> = Vec::with_capacity(column_names.len() + 4);

    for (col_idx, name) in column_names.iter().enumerate() {
        if name == COL_NUMEROIDENT {
            out_columns.push(Column::new(name.as_str().into(), idents.clone()));
        } else if name == COL_FECHAACEPT {
            out_columns.push(date_column(name, &fechas));
        } else if NUMERIC_FIELDS.contains(&name.as_str()) {
            let mut values: Vec<f64> = Vec::with_capacity(n);
            let mut all_integral = true;
            for row in &accepted_raw {
                let value = match parse_numeric(row[col_idx].trim(), spec.decimal_separator) {
                    Some(value) => value,
                    None => {
                        repaired_values += 1;
                        0.0
                    }
                };
                if value.fract() != 0.0 {
                    all_integral = false;
                }
                values.push(value);
            }
            if all_integral {
                let narrowed: Vec<i64> = values.iter().map(|v| *v as i64).collect();
                out_columns.push(Column::new(name.as_str().into(), narrowed));
            } else {
                out_columns.push(Column::new(name.as_str().into(), values));
            }
        } else {
            let values: Vec<String> = accepted_raw
                .iter()
                .map(|row| row[col_idx].trim().to_string())
                .collect();
            out_columns.push(Column::new(name.as_str().into(), values));
        }
    }

    // Enrichment: shared extraction timestamp, date-derived year and month,
    // and the processing timestamp of this pass
    out_columns.push(datetime_column(
        ENRICHMENT_COLUMNS[0],
        extraction_time.timestamp_millis(),
        n,
    ));
    let anios: Vec<i32> = fechas.iter().map(|d| d.year()).collect();
    out_columns.push(Column::new(ENRICHMENT_COLUMNS[1].into(), anios));
    let meses: Vec<i32> = fechas.iter().map(|d| d.month() as i32).collect();
    out_columns.push(Column::new(ENRICHMENT_COLUMNS[2].into(), meses));
    out_columns.push(datetime_column(
        ENRICHMENT_COLUMNS[3],
        Utc::now().timestamp_millis(),
        n,
    ));

    let accepted = DataFrame::new(out_columns)?;

    let stats = CurationStats {
        input_rows,
        deduplicated_rows,
        accepted_rows: accepted.height(),
        rejected_rows: rejected.len(),
        repaired_values,
    };
    if stats.rejected_rows > 0 {
        warn!(
            "Curation for '{dataset}' rejected {} of {} rows on critical-field validation",
            stats.rejected_rows, stats.deduplicated_rows
        );
    }
    if repaired_values > 0 {
        warn!(
            "Curation for '{dataset}' repaired {repaired_values} invalid auxiliary values to zero"
        );
    }
    info!(
        "Curation complete for '{dataset}': {} accepted, {} rejected",
        stats.accepted_rows, stats.rejected_rows
    );

    Ok(CurationOutcome {
        accepted,
        rejected,
        stats,
    })
}

/// Coerce an identifier to an integer. Numeric but non-integral forms are
/// truncated; anything else is a null marker.
fn parse_identifier(value: &str) -> Option<i64> {
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = value.parse::<i64>() {
        return Some(parsed);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v as i64)
}

/// Coerce a DDMMYYYY date after left-zero-padding to 8 characters
fn parse_acceptance_date(value: &str) -> Option<NaiveDate> {
    if value.is_empty() {
        return None;
    }
    let padded = format!("{value:0>8}");
    NaiveDate::parse_from_str(&padded, "%d%m%Y").ok()
}

/// Coerce an auxiliary numeric field under the dataset's decimal convention
fn parse_numeric(value: &str, decimal_separator: char) -> Option<f64> {
    if value.is_empty() {
        return None;
    }
    let normalized = if decimal_separator == '.' {
        value.to_string()
    } else {
        value.replace(decimal_separator, ".")
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn epoch_days(date: &NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    (*date - epoch).num_days() as i32
}

fn date_column(name: &str, dates: &[NaiveDate]) -> Column {
    let days: Vec<i32> = dates.iter().map(epoch_days).collect();
    Int32Chunked::from_vec(name.into(), days)
        .into_date()
        .into_series()
        .into_column()
}

fn datetime_column(name: &str, timestamp_millis: i64, len: usize) -> Column {
    Int64Chunked::from_vec(name.into(), vec![timestamp_millis; len])
        .into_datetime(TimeUnit::Milliseconds, None)
        .into_series()
        .into_column()
}
