//! Error handling for the customs ETL pipeline.
//!
//! Provides error types with context for extraction, curation,
//! store access and query failures.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("No source files could be read for dataset '{dataset}'")]
    SourceUnavailable { dataset: String },

    #[error("Column map for dataset '{dataset}' is empty")]
    EmptyColumnMap { dataset: String },

    #[error("Dataset '{dataset}' is missing required critical column '{column}'")]
    MissingCriticalColumn { dataset: String, column: String },

    #[error("Table '{table}' not found in analytical store at {}", .path.display())]
    TableNotFound { table: String, path: PathBuf },

    #[error("Analytical store not initialized at {}; run the ETL first", .path.display())]
    StoreNotInitialized { path: PathBuf },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl EtlError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
