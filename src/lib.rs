//! ETL pipeline and query API for customs export declarations.
//!
//! Ingests raw delimited extracts of export declarations (exportaciones)
//! and their package counts (bultos), splits every batch into accepted
//! and rejected rows, loads the accepted rows into a parquet analytical
//! store, rebuilds read-optimized views, audits data quality and exposes
//! the views over HTTP.

pub mod api;
pub mod audit;
pub mod config;
pub mod curate;
pub mod error;
pub mod extract;
pub mod modeling;
pub mod models;
pub mod pipeline;
pub mod store;

pub use config::Config;
pub use error::{EtlError, Result};
