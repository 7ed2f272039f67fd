//! Analytical store and provenance file persistence.
//!
//! The store is a directory of parquet files, one per table or view,
//! addressed purely by filesystem path. Tables are fully replaced on
//! every load (write to a temporary file, then rename); there is no
//! incremental merge. Rejected rows go to a delimiter-separated
//! provenance file that is truncated at run start and appended to per
//! dataset.

use crate::error::{EtlError, Result};
use crate::models::RawBatch;
use polars::prelude::*;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Typed intermediate table derived from the accepted exportaciones
pub const TABLE_DATOS_IDTY: &str = "datos_idty";
/// Daily FOB trend view
pub const VIEW_TENDENCIAS_DIARIAS: &str = "V_TENDENCIAS_DIARIAS";
/// Weekly exporter ranking view
pub const VIEW_RANKING_SEMANAL: &str = "V_RANKING_SEMANAL";
/// Average weight per package view
pub const VIEW_PESO_PROMEDIO_BULTO: &str = "V_PESO_PROMEDIO_BULTO";

/// Parquet-backed analytical store rooted at a directory
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open the store, creating the root directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Open the store for reading only; fails if it was never created
    pub fn open_existing(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(EtlError::StoreNotInitialized { path: root });
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.parquet"))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.table_path(name).exists()
    }

    /// Replace the named table with the given frame.
    ///
    /// An empty frame leaves any existing table untouched; skipping the
    /// load is a warning, not an error.
    pub fn replace_table(&self, name: &str, df: &mut DataFrame) -> Result<()> {
        if df.height() == 0 {
            warn!("No rows to load into table '{name}'. Skipping.");
            return Ok(());
        }
        let path = self.table_path(name);
        let tmp_path = self.root.join(format!(".{name}.parquet.tmp"));

        info!("Loading {} rows into table '{name}'", df.height());
        let file = File::create(&tmp_path)?;
        ParquetWriter::new(file).finish(df)?;
        std::fs::rename(&tmp_path, &path)?;
        debug!("Table '{name}' written to {}", path.display());
        Ok(())
    }

    /// Read a table eagerly
    pub fn read_table(&self, name: &str) -> Result<DataFrame> {
        let path = self.table_path(name);
        if !path.exists() {
            return Err(EtlError::TableNotFound {
                table: name.to_string(),
                path: self.root.clone(),
            });
        }
        let file = File::open(&path)?;
        Ok(ParquetReader::new(file).finish()?)
    }

    /// Lazy scan of a table for analytical queries
    pub fn scan_table(&self, name: &str) -> Result<LazyFrame> {
        Ok(self.read_table(name)?.lazy())
    }
}

/// Truncate the provenance file at the start of a run
pub fn clear_rejected(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
        info!("Removed previous rejected-records file: {}", path.display());
    }
    Ok(())
}

/// Append rejected rows to the provenance file in the dataset's original
/// delimiter, byte-for-byte as they were extracted. No header, no quoting.
pub fn append_rejected(path: &Path, rejected: &RawBatch, delimiter: char) -> Result<()> {
    if rejected.is_empty() {
        debug!("No rejected records to persist");
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    info!(
        "Appending {} rejected rows to {}",
        rejected.len(),
        path.display()
    );
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let delimiter = delimiter.to_string();
    for row in rejected.rows() {
        writeln!(file, "{}", row.join(&delimiter))?;
    }
    Ok(())
}
