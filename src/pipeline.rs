//! End-to-end pipeline orchestration.
//!
//! One run is a full reload: extract every dataset, curate it, replace
//! its accepted table in the store, append its rejected rows to the
//! provenance file, rebuild the analytical models and audit the result.
//! The provenance file is truncated once at run start, so after a run it
//! holds exactly the rejects of that run.

use crate::audit::{self, QualityReport};
use crate::config::Config;
use crate::curate::curate_and_split;
use crate::error::Result;
use crate::extract::extract_dataset;
use crate::modeling::build_analytical_models;
use crate::models::{CurationStats, DatasetKind};
use crate::store::{self, Store};
use serde::Serialize;
use std::time::Instant;
use tracing::info;

/// Per-dataset outcome of one run
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub dataset: String,
    pub table: String,
    #[serde(flatten)]
    pub stats: CurationStats,
}

/// Outcome of one full pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub datasets: Vec<DatasetSummary>,
    pub quality: QualityReport,
    pub duration_ms: u64,
}

impl PipelineSummary {
    pub fn total_accepted(&self) -> usize {
        self.datasets.iter().map(|d| d.stats.accepted_rows).sum()
    }

    pub fn total_rejected(&self) -> usize {
        self.datasets.iter().map(|d| d.stats.rejected_rows).sum()
    }
}

/// Run the full pipeline once.
///
/// Blocking: callers on an async runtime should wrap this in a blocking
/// task. Fails fast on the first structural error; data defects are
/// absorbed upstream by curation.
pub fn run_pipeline(config: &Config) -> Result<PipelineSummary> {
    let start = Instant::now();
    info!("Pipeline run starting");

    let store = Store::open(&config.store_dir)?;
    store::clear_rejected(&config.rejected_path)?;

    let mut datasets = Vec::new();
    for spec in config.datasets() {
        let batch = extract_dataset(spec)?;
        let mut outcome = curate_and_split(batch, spec)?;

        store.replace_table(spec.kind.table_name(), &mut outcome.accepted)?;
        store::append_rejected(&config.rejected_path, &outcome.rejected, spec.delimiter)?;

        info!(
            "Dataset '{}': {} accepted, {} rejected, {} values repaired",
            spec.kind.name(),
            outcome.stats.accepted_rows,
            outcome.stats.rejected_rows,
            outcome.stats.repaired_values
        );
        datasets.push(DatasetSummary {
            dataset: spec.kind.name().to_string(),
            table: spec.kind.table_name().to_string(),
            stats: outcome.stats,
        });
    }

    build_analytical_models(&store)?;

    let quality = audit::quality_report(
        &store,
        DatasetKind::Exportaciones.table_name(),
        &config.exportaciones.columns.names(),
        config.reporting_year,
    )?;

    let duration_ms = start.elapsed().as_millis() as u64;
    info!("Pipeline run finished in {duration_ms} ms");
    Ok(PipelineSummary {
        datasets,
        quality,
        duration_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasetSpec;
    use crate::models::ColumnMap;
    use crate::store::{
        TABLE_DATOS_IDTY, VIEW_PESO_PROMEDIO_BULTO, VIEW_RANKING_SEMANAL,
        VIEW_TENDENCIAS_DIARIAS,
    };
    use std::path::Path;
    use tempfile::TempDir;

    /// Build a raw exportaciones line with the mapped positions filled in
    fn exportaciones_line(
        fecha: &str,
        ident: &str,
        exporter: &str,
        peso_total: &str,
        arancel: &str,
        peso_item: &str,
        fob: &str,
    ) -> String {
        let mut fields = vec![""; 67];
        fields[0] = fecha;
        fields[1] = ident;
        fields[24] = peso_total;
        fields[28] = exporter;
        fields[64] = arancel;
        fields[65] = peso_item;
        fields[66] = fob;
        fields.join(";")
    }

    fn test_config(base: &Path) -> Config {
        let data_dir = base.join("data");
        Config {
            data_dir: data_dir.clone(),
            store_dir: base.join("warehouse"),
            rejected_path: base.join("rejected_records.txt"),
            reporting_year: 2025,
            api_bind: "127.0.0.1:0".to_string(),
            exportaciones: DatasetSpec {
                kind: DatasetKind::Exportaciones,
                files: vec![data_dir.join("exportaciones.txt")],
                columns: ColumnMap::new(&[
                    ("FECHAACEPT", 0),
                    ("NUMEROIDENT", 1),
                    ("NRO_EXPORTADOR", 28),
                    ("PESOBRUTOTOTAL", 24),
                    ("FOBUNITARIO", 66),
                    ("PESOBRUTOITEM", 65),
                    ("CODIGOARANCEL", 64),
                ])
                .unwrap(),
                delimiter: ';',
                decimal_separator: ',',
            },
            bultos: DatasetSpec {
                kind: DatasetKind::Bultos,
                files: vec![data_dir.join("bultos.txt")],
                columns: ColumnMap::new(&[
                    ("NUMEROIDENT", 0),
                    ("FECHAACEPT", 1),
                    ("CANTIDADBULTO", 4),
                ])
                .unwrap(),
                delimiter: ';',
                decimal_separator: '.',
            },
        }
    }

    fn write_sources(config: &Config) {
        std::fs::create_dir_all(&config.data_dir).unwrap();
        let exportaciones = [
            exportaciones_line("01032025", "101", "500", "10,5", "8504", "2,5", "100,0"),
            exportaciones_line("02032025", "102", "500", "11,0", "8504", "3,0", "200,0"),
            // Bad date: rejected
            exportaciones_line("99999999", "103", "501", "1,0", "8504", "1,0", "50,0"),
        ]
        .join("\n");
        std::fs::write(
            &config.exportaciones.files[0],
            format!("{exportaciones}\n"),
        )
        .unwrap();

        let bultos = "101;01032025;x;y;4\n102;02032025;x;y;8\nbad-id;01032025;x;y;2\n";
        std::fs::write(&config.bultos.files[0], bultos).unwrap();
    }

    #[test]
    fn full_run_builds_tables_views_and_report() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        write_sources(&config);

        let summary = run_pipeline(&config).unwrap();
        assert_eq!(summary.datasets.len(), 2);
        assert_eq!(summary.total_accepted(), 4);
        assert_eq!(summary.total_rejected(), 2);
        assert_eq!(summary.quality.row_count, 2);
        // Every mapped exportaciones column is audited
        assert_eq!(summary.quality.columns.len(), 7);

        let store = Store::open_existing(&config.store_dir).unwrap();
        for table in [
            "exportaciones",
            "bultos_exportaciones",
            TABLE_DATOS_IDTY,
            VIEW_TENDENCIAS_DIARIAS,
            VIEW_RANKING_SEMANAL,
            VIEW_PESO_PROMEDIO_BULTO,
        ] {
            assert!(store.table_exists(table), "missing table {table}");
        }
    }

    #[test]
    fn rejected_rows_reach_the_provenance_file_verbatim() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        write_sources(&config);

        run_pipeline(&config).unwrap();
        let content = std::fs::read_to_string(&config.rejected_path).unwrap();
        assert!(content.contains("99999999;103"));
        assert!(content.contains("bad-id;01032025"));
    }

    #[test]
    fn rerun_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        write_sources(&config);

        let first = run_pipeline(&config).unwrap();
        let second = run_pipeline(&config).unwrap();
        assert_eq!(first.total_accepted(), second.total_accepted());
        assert_eq!(first.total_rejected(), second.total_rejected());

        // Tables replaced, not appended
        let store = Store::open_existing(&config.store_dir).unwrap();
        let exportaciones = store.read_table("exportaciones").unwrap();
        assert_eq!(exportaciones.height(), 2);

        // Provenance file truncated at run start: rejects from last run only
        let content = std::fs::read_to_string(&config.rejected_path).unwrap();
        assert_eq!(content.matches("bad-id").count(), 1);
    }

    #[test]
    fn missing_sources_abort_the_run() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        // No data directory at all
        let result = run_pipeline(&config);
        assert!(result.is_err());
    }
}
