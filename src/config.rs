//! Pipeline configuration.
//!
//! Builds a single immutable [`Config`] at startup from environment
//! variables (with `.env` support) and the static dataset definitions.
//! The configuration is passed by reference into every component; no
//! ambient global lookup happens anywhere else.

use crate::error::Result;
use crate::models::{ColumnMap, DatasetKind};
use std::path::{Path, PathBuf};

/// Everything the pipeline needs to know about one source dataset
#[derive(Debug, Clone)]
pub struct DatasetSpec {
    pub kind: DatasetKind,
    /// Source files, concatenated in this order
    pub files: Vec<PathBuf>,
    pub columns: ColumnMap,
    pub delimiter: char,
    /// Decimal-point character used by numeric fields in this dataset
    pub decimal_separator: char,
}

/// Immutable process configuration, constructed once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Root directory of the parquet analytical store
    pub store_dir: PathBuf,
    /// Cross-run provenance file for rejected rows
    pub rejected_path: PathBuf,
    /// Year that acceptance dates are expected to fall in (validity metric)
    pub reporting_year: i32,
    pub api_bind: String,
    pub exportaciones: DatasetSpec,
    pub bultos: DatasetSpec,
}

impl Config {
    /// Build configuration from the environment, rooted at the working directory
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let base_dir = std::env::current_dir()?;
        Self::with_base_dir(&base_dir)
    }

    /// Build configuration rooted at an explicit base directory
    pub fn with_base_dir(base_dir: &Path) -> Result<Self> {
        let data_folder = std::env::var("DATA_FOLDER").unwrap_or_else(|_| "data".to_string());
        let store_folder =
            std::env::var("STORE_FOLDER").unwrap_or_else(|_| "datawarehouse".to_string());
        let api_bind =
            std::env::var("API_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

        let data_dir = base_dir.join(data_folder);

        let exportaciones = DatasetSpec {
            kind: DatasetKind::Exportaciones,
            files: vec![
                data_dir.join("exportacionesAbril2025.txt"),
                data_dir.join("exportacionesMarzo2025.txt"),
            ],
            columns: ColumnMap::new(&[
                ("FECHAACEPT", 0),
                ("NUMEROIDENT", 1),
                ("NRO_EXPORTADOR", 28),
                ("PESOBRUTOTOTAL", 24),
                ("FOBUNITARIO", 66),
                ("PESOBRUTOITEM", 65),
                ("CODIGOARANCEL", 64),
            ])?,
            delimiter: ';',
            decimal_separator: ',',
        };

        let bultos = DatasetSpec {
            kind: DatasetKind::Bultos,
            files: vec![
                data_dir.join("bultosAbril2025.txt"),
                data_dir.join("bultosMarzo2025.txt"),
            ],
            columns: ColumnMap::new(&[
                ("NUMEROIDENT", 0),
                ("FECHAACEPT", 1),
                ("CANTIDADBULTO", 4),
            ])?,
            delimiter: ';',
            decimal_separator: '.',
        };

        Ok(Self {
            data_dir,
            store_dir: base_dir.join(store_folder),
            rejected_path: base_dir.join("rejected_records.txt"),
            reporting_year: 2025,
            api_bind,
            exportaciones,
            bultos,
        })
    }

    /// Both dataset specs in processing order (exportaciones first)
    pub fn datasets(&self) -> [&DatasetSpec; 2] {
        [&self.exportaciones, &self.bultos]
    }
}
