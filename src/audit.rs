//! Data quality audit over the curated exportaciones table.
//!
//! Computes completeness and uniqueness for every audited column plus
//! rule-based validity checks where a rule exists, then turns the
//! findings into human-readable recommendations. The audit is advisory:
//! it never fails the pipeline, a poor score only produces warnings.

use crate::error::{EtlError, Result};
use crate::models::{COL_FECHAACEPT, COL_NUMEROIDENT};
use crate::store::Store;
use colored::Colorize;
use polars::prelude::*;
use serde::Serialize;
use std::fmt::Write;
use tracing::warn;

/// Completeness below this percentage triggers a recommendation
const COMPLETENESS_THRESHOLD: f64 = 98.0;

/// Outcome of one rule-based validity check
#[derive(Debug, Clone, Serialize)]
pub struct ValidityMetric {
    pub rule: String,
    /// Percentage of rows satisfying the rule
    pub valid_pct: f64,
}

/// Quality findings for a single column
#[derive(Debug, Clone, Serialize)]
pub struct ColumnQuality {
    pub column: String,
    /// Percentage of non-null values
    pub completeness_pct: f64,
    /// Percentage of distinct values
    pub uniqueness_pct: f64,
    /// Absent when the column has no validity rule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validity: Option<ValidityMetric>,
}

/// Full audit report for one table
#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub table: String,
    pub row_count: usize,
    pub columns: Vec<ColumnQuality>,
    pub recommendations: Vec<String>,
}

impl QualityReport {
    fn empty(table: &str) -> Self {
        Self {
            table: table.to_string(),
            row_count: 0,
            columns: Vec::new(),
            recommendations: vec![format!(
                "Table '{table}' holds no rows; nothing to audit"
            )],
        }
    }
}

/// Audit the named columns of a table. Callers pass the dataset's
/// mapped column names, so every extracted field is covered.
///
/// A missing or empty table yields a zero report with a warning instead
/// of an error, so a first run against an empty store still completes.
pub fn quality_report(
    store: &Store,
    table: &str,
    columns: &[String],
    reporting_year: i32,
) -> Result<QualityReport> {
    let df = match store.read_table(table) {
        Ok(df) => df,
        Err(EtlError::TableNotFound { .. }) => {
            warn!("Table '{table}' not found; producing an empty quality report");
            return Ok(QualityReport::empty(table));
        }
        Err(e) => return Err(e),
    };
    if df.height() == 0 {
        warn!("Table '{table}' is empty; producing an empty quality report");
        return Ok(QualityReport::empty(table));
    }

    let total = df.height();
    let mut report_columns = Vec::new();
    let mut recommendations = Vec::new();

    for name in columns {
        let name = name.as_str();
        let Ok(series) = df.column(name) else {
            warn!("Audited column '{name}' absent from table '{table}'");
            continue;
        };

        let non_null = total - series.null_count();
        let completeness_pct = pct(non_null, total);
        if completeness_pct < COMPLETENESS_THRESHOLD {
            recommendations.push(format!(
                "Column '{name}' is only {completeness_pct:.1}% complete \
                 (threshold {COMPLETENESS_THRESHOLD}%); review the source extracts"
            ));
        }

        let distinct = series.n_unique()?;
        let uniqueness_pct = pct(distinct, total);
        // Only the identifier warrants a duplicate finding; repeated
        // values are normal for every other column
        if name == COL_NUMEROIDENT && uniqueness_pct < 100.0 {
            recommendations.push(format!(
                "Identifier '{name}' repeats across rows ({uniqueness_pct:.1}% distinct); \
                 expected when a declaration spans several items"
            ));
        }

        let validity = match name {
            COL_FECHAACEPT => Some(date_in_year_validity(&df, reporting_year, total)?),
            "FOBUNITARIO" => Some(non_negative_validity(&df, name, total)?),
            _ => None,
        };
        if let Some(metric) = &validity {
            if metric.valid_pct < 100.0 {
                recommendations.push(format!(
                    "Column '{name}' fails rule \"{}\" on {:.1}% of rows",
                    metric.rule,
                    100.0 - metric.valid_pct
                ));
            }
        }

        report_columns.push(ColumnQuality {
            column: name.to_string(),
            completeness_pct,
            uniqueness_pct,
            validity,
        });
    }

    Ok(QualityReport {
        table: table.to_string(),
        row_count: total,
        columns: report_columns,
        recommendations,
    })
}

fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

fn date_in_year_validity(df: &DataFrame, year: i32, total: usize) -> Result<ValidityMetric> {
    let valid = df
        .clone()
        .lazy()
        .select([col(COL_FECHAACEPT)
            .dt()
            .year()
            .eq(lit(year))
            .sum()
            .cast(DataType::Int64)
            .alias("valid")])
        .collect()?;
    let valid = valid.column("valid")?.i64()?.get(0).unwrap_or(0) as usize;
    Ok(ValidityMetric {
        rule: format!("acceptance date within {year}"),
        valid_pct: pct(valid, total),
    })
}

fn non_negative_validity(df: &DataFrame, name: &str, total: usize) -> Result<ValidityMetric> {
    let valid = df
        .clone()
        .lazy()
        .select([col(name)
            .gt_eq(lit(0.0))
            .sum()
            .cast(DataType::Int64)
            .alias("valid")])
        .collect()?;
    let valid = valid.column("valid")?.i64()?.get(0).unwrap_or(0) as usize;
    Ok(ValidityMetric {
        rule: "value is non-negative".to_string(),
        valid_pct: pct(valid, total),
    })
}

/// Console rendering of the report, one line per column plus the
/// recommendation list
pub fn render_report(report: &QualityReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\n{}",
        format!("Quality audit: {} ({} rows)", report.table, report.row_count)
            .bold()
            .cyan()
    );

    for column in &report.columns {
        let mut line = format!(
            "  {:<16} completeness {:>6.2}%  uniqueness {:>6.2}%",
            column.column, column.completeness_pct, column.uniqueness_pct
        );
        match &column.validity {
            Some(metric) => {
                let _ = write!(line, "  valid {:>6.2}% ({})", metric.valid_pct, metric.rule);
            }
            None => {
                let _ = write!(line, "  {}", "no checks defined".dimmed());
            }
        }
        let _ = writeln!(out, "{line}");
    }

    if report.recommendations.is_empty() {
        let _ = writeln!(out, "  {}", "No findings".green());
    } else {
        for recommendation in &report.recommendations {
            let _ = writeln!(out, "  {} {}", "!".yellow().bold(), recommendation);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn date_col(name: &str, dates: &[(i32, u32, u32)]) -> Column {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        let days: Vec<i32> = dates
            .iter()
            .map(|(y, m, d)| {
                (NaiveDate::from_ymd_opt(*y, *m, *d).unwrap() - epoch).num_days() as i32
            })
            .collect();
        Int32Chunked::from_vec(name.into(), days)
            .into_date()
            .into_series()
            .into_column()
    }

    fn audited() -> Vec<String> {
        [
            "NUMEROIDENT",
            "FECHAACEPT",
            "NRO_EXPORTADOR",
            "FOBUNITARIO",
            "PESOBRUTOITEM",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn store_with_table(dir: &TempDir, df: &mut DataFrame) -> Store {
        let store = Store::open(dir.path()).unwrap();
        store.replace_table("exportaciones", df).unwrap();
        store
    }

    #[test]
    fn clean_table_has_no_findings() {
        let dir = TempDir::new().unwrap();
        let mut df = DataFrame::new(vec![
            Column::new("NUMEROIDENT".into(), vec![1i64, 2, 3]),
            date_col("FECHAACEPT", &[(2025, 3, 1), (2025, 3, 2), (2025, 3, 3)]),
            Column::new("NRO_EXPORTADOR".into(), vec![10i64, 20, 30]),
            Column::new("FOBUNITARIO".into(), vec![1.0f64, 2.0, 3.0]),
            Column::new("PESOBRUTOITEM".into(), vec![1.0f64, 2.0, 3.0]),
        ])
        .unwrap();
        let store = store_with_table(&dir, &mut df);

        let report = quality_report(&store, "exportaciones", &audited(), 2025).unwrap();
        assert_eq!(report.row_count, 3);
        assert_eq!(report.columns.len(), 5);
        assert!(report.recommendations.is_empty());
        for column in &report.columns {
            assert_eq!(column.completeness_pct, 100.0);
            assert_eq!(column.uniqueness_pct, 100.0);
        }
    }

    #[test]
    fn repeated_identifiers_are_reported() {
        let dir = TempDir::new().unwrap();
        let mut df = DataFrame::new(vec![
            Column::new("NUMEROIDENT".into(), vec![1i64, 1, 2, 3]),
            date_col(
                "FECHAACEPT",
                &[(2025, 3, 1), (2025, 3, 1), (2025, 3, 2), (2025, 3, 3)],
            ),
            Column::new("NRO_EXPORTADOR".into(), vec![10i64, 10, 20, 30]),
            Column::new("FOBUNITARIO".into(), vec![1.0f64, 2.0, 3.0, 4.0]),
            Column::new("PESOBRUTOITEM".into(), vec![1.0f64, 2.0, 3.0, 4.0]),
        ])
        .unwrap();
        let store = store_with_table(&dir, &mut df);

        let report = quality_report(&store, "exportaciones", &audited(), 2025).unwrap();
        let ident = report
            .columns
            .iter()
            .find(|c| c.column == "NUMEROIDENT")
            .unwrap();
        assert_eq!(ident.uniqueness_pct, 75.0);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("NUMEROIDENT")));
    }

    #[test]
    fn uniqueness_is_measured_for_every_column() {
        let dir = TempDir::new().unwrap();
        let mut df = DataFrame::new(vec![
            Column::new("NUMEROIDENT".into(), vec![1i64, 2, 3, 4]),
            date_col(
                "FECHAACEPT",
                &[(2025, 3, 1), (2025, 3, 2), (2025, 3, 3), (2025, 3, 4)],
            ),
            Column::new("NRO_EXPORTADOR".into(), vec![10i64, 10, 10, 20]),
            Column::new("FOBUNITARIO".into(), vec![1.0f64, 2.0, 3.0, 4.0]),
            Column::new("PESOBRUTOITEM".into(), vec![1.0f64, 2.0, 3.0, 4.0]),
        ])
        .unwrap();
        let store = store_with_table(&dir, &mut df);

        let report = quality_report(&store, "exportaciones", &audited(), 2025).unwrap();
        let exporter = report
            .columns
            .iter()
            .find(|c| c.column == "NRO_EXPORTADOR")
            .unwrap();
        assert_eq!(exporter.uniqueness_pct, 50.0);
        // Repeats outside the identifier are measured but not flagged
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn out_of_year_dates_lower_validity() {
        let dir = TempDir::new().unwrap();
        let mut df = DataFrame::new(vec![
            Column::new("NUMEROIDENT".into(), vec![1i64, 2]),
            date_col("FECHAACEPT", &[(2025, 3, 1), (2019, 3, 1)]),
            Column::new("NRO_EXPORTADOR".into(), vec![10i64, 20]),
            Column::new("FOBUNITARIO".into(), vec![1.0f64, 2.0]),
            Column::new("PESOBRUTOITEM".into(), vec![1.0f64, 2.0]),
        ])
        .unwrap();
        let store = store_with_table(&dir, &mut df);

        let report = quality_report(&store, "exportaciones", &audited(), 2025).unwrap();
        let fecha = report
            .columns
            .iter()
            .find(|c| c.column == "FECHAACEPT")
            .unwrap();
        assert_eq!(fecha.validity.as_ref().unwrap().valid_pct, 50.0);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("FECHAACEPT")));
    }

    #[test]
    fn negative_fob_lowers_validity() {
        let dir = TempDir::new().unwrap();
        let mut df = DataFrame::new(vec![
            Column::new("NUMEROIDENT".into(), vec![1i64, 2]),
            date_col("FECHAACEPT", &[(2025, 3, 1), (2025, 3, 2)]),
            Column::new("NRO_EXPORTADOR".into(), vec![10i64, 20]),
            Column::new("FOBUNITARIO".into(), vec![-5.5f64, 2.0]),
            Column::new("PESOBRUTOITEM".into(), vec![1.0f64, 2.0]),
        ])
        .unwrap();
        let store = store_with_table(&dir, &mut df);

        let report = quality_report(&store, "exportaciones", &audited(), 2025).unwrap();
        let fob = report
            .columns
            .iter()
            .find(|c| c.column == "FOBUNITARIO")
            .unwrap();
        assert_eq!(fob.validity.as_ref().unwrap().valid_pct, 50.0);
    }

    #[test]
    fn missing_table_yields_empty_report() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();

        let report = quality_report(&store, "exportaciones", &audited(), 2025).unwrap();
        assert_eq!(report.row_count, 0);
        assert!(report.columns.is_empty());
        assert_eq!(report.recommendations.len(), 1);
    }

    #[test]
    fn report_renders_every_column_and_marks_unchecked_ones() {
        let dir = TempDir::new().unwrap();
        let mut df = DataFrame::new(vec![
            Column::new("NUMEROIDENT".into(), vec![1i64]),
            date_col("FECHAACEPT", &[(2025, 3, 1)]),
            Column::new("NRO_EXPORTADOR".into(), vec![10i64]),
            Column::new("FOBUNITARIO".into(), vec![1.0f64]),
            Column::new("PESOBRUTOITEM".into(), vec![1.0f64]),
        ])
        .unwrap();
        let store = store_with_table(&dir, &mut df);

        let report = quality_report(&store, "exportaciones", &audited(), 2025).unwrap();
        let rendered = render_report(&report);
        for column in &report.columns {
            assert!(rendered.contains(&column.column));
        }
        // Columns without a validity rule say so explicitly
        assert!(rendered.contains("no checks defined"));
    }
}
