//! Core data structures for the customs ETL pipeline.
//!
//! Defines the dataset kinds, the positional column map applied during
//! extraction, the raw tabular batch exchanged between extractor and
//! curation engine, and run statistics.

use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};

/// Record identifier column; a row without a parseable value is rejected.
pub const COL_NUMEROIDENT: &str = "NUMEROIDENT";
/// Acceptance date column (DDMMYYYY, zero-padded); equally load-bearing.
pub const COL_FECHAACEPT: &str = "FECHAACEPT";

/// Declared numeric fields whose coercion failures are repaired to zero
/// instead of causing rejection.
pub const NUMERIC_FIELDS: &[&str] = &[
    "FOBUNITARIO",
    "PESOBRUTOTOTAL",
    "PESOBRUTOITEM",
    "CANTIDADBULTO",
    "NRO_EXPORTADOR",
    "CODIGOARANCEL",
];

/// The two trade-declaration datasets handled by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetKind {
    Exportaciones,
    Bultos,
}

impl DatasetKind {
    pub fn name(&self) -> &'static str {
        match self {
            DatasetKind::Exportaciones => "exportaciones",
            DatasetKind::Bultos => "bultos",
        }
    }

    /// Name of the accepted table in the analytical store
    pub fn table_name(&self) -> &'static str {
        match self {
            DatasetKind::Exportaciones => "exportaciones",
            DatasetKind::Bultos => "bultos_exportaciones",
        }
    }
}

/// Mapping from logical field name to zero-based source-file column position.
///
/// Declared order is meaningful: it defines the column order of both the
/// accepted and the rejected output. Field names must be unique within a map;
/// positions need not be contiguous or ordered.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    entries: Vec<(String, usize)>,
}

impl ColumnMap {
    pub fn new(entries: &[(&str, usize)]) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for (name, _) in entries {
            if !seen.insert(*name) {
                return Err(EtlError::configuration(format!(
                    "duplicate field name '{name}' in column map"
                )));
            }
        }
        Ok(Self {
            entries: entries
                .iter()
                .map(|(n, p)| (n.to_string(), *p))
                .collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Field names in declared order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(n, p)| (n.as_str(), *p))
    }

    /// Highest source column position referenced by the map
    pub fn max_position(&self) -> usize {
        self.entries.iter().map(|(_, p)| *p).max().unwrap_or(0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }
}

/// Uninterpreted tabular data extracted from source files.
///
/// Every value is raw text exactly as it appeared between delimiters; no
/// trimming or numeric coercion has happened yet. The curation engine needs
/// the untouched form to preserve rejected rows verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBatch {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawBatch {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Statistics for one curation pass over a dataset
#[derive(Debug, Clone, Default, Serialize)]
pub struct CurationStats {
    /// Rows received from the extractor
    pub input_rows: usize,
    /// Rows remaining after exact-duplicate removal
    pub deduplicated_rows: usize,
    /// Rows that passed the critical-field gate
    pub accepted_rows: usize,
    /// Rows routed to the provenance file
    pub rejected_rows: usize,
    /// Auxiliary numeric values that failed coercion and were defaulted to zero
    pub repaired_values: usize,
}

impl CurationStats {
    /// Accepted and rejected rows always partition the deduplicated input
    pub fn is_consistent(&self) -> bool {
        self.accepted_rows + self.rejected_rows == self.deduplicated_rows
    }
}
