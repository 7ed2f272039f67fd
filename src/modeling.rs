//! Analytical models: typed intermediate table and read-optimized views.
//!
//! Recomputes everything in full on every pass from the persisted
//! accepted tables; there is no incremental maintenance. Views are
//! materialized as parquet files in the store so the query API reads
//! precomputed results. Date columns inside views are ISO-8601 strings,
//! which makes range filters plain ordered comparisons.

use crate::error::Result;
use crate::models::DatasetKind;
use crate::store::{
    Store, TABLE_DATOS_IDTY, VIEW_PESO_PROMEDIO_BULTO, VIEW_RANKING_SEMANAL,
    VIEW_TENDENCIAS_DIARIAS,
};
use polars::prelude::*;
use tracing::info;

/// Build the intermediate table and the three analytical views
pub fn build_analytical_models(store: &Store) -> Result<()> {
    info!("Building analytical models (table and views)");
    build_datos_idty(store)?;
    build_daily_trends(store)?;
    build_weekly_ranking(store)?;
    build_average_weight(store)?;
    info!("All analytical models rebuilt");
    Ok(())
}

/// Cast key measures of the accepted exportaciones to fixed numeric types
fn build_datos_idty(store: &Store) -> Result<()> {
    let mut datos = store
        .scan_table(DatasetKind::Exportaciones.table_name())?
        .select([
            col("FECHAACEPT"),
            col("NUMEROIDENT").cast(DataType::Int64),
            col("NRO_EXPORTADOR").cast(DataType::Int64),
            col("CODIGOARANCEL").cast(DataType::Int64),
            col("FOBUNITARIO").cast(DataType::Float64),
            col("PESOBRUTOITEM").cast(DataType::Float64),
        ])
        .collect()?;
    store.replace_table(TABLE_DATOS_IDTY, &mut datos)?;
    info!("Table '{TABLE_DATOS_IDTY}' rebuilt");
    Ok(())
}

/// Average unit FOB per calendar day with percentage change versus the
/// immediately preceding day present in the series. Gap days are not
/// interpolated; the change is null when the prior value is zero or
/// absent.
fn build_daily_trends(store: &Store) -> Result<()> {
    let mut trends = store
        .scan_table(TABLE_DATOS_IDTY)?
        .group_by([col("FECHAACEPT")])
        .agg([col("FOBUNITARIO").mean().alias("average_fob")])
        .sort(["FECHAACEPT"], Default::default())
        .with_columns([col("average_fob").shift(lit(1)).alias("prev_day_avg")])
        .select([
            col("FECHAACEPT").dt().to_string("%Y-%m-%d").alias("period"),
            col("average_fob"),
            when(col("prev_day_avg").gt(lit(0.0)))
                .then(
                    (col("average_fob") - col("prev_day_avg")) / col("prev_day_avg")
                        * lit(100.0),
                )
                .otherwise(lit(NULL))
                .alias("change_from_previous"),
        ])
        .collect()?;
    store.replace_table(VIEW_TENDENCIAS_DIARIAS, &mut trends)?;
    info!("View '{VIEW_TENDENCIAS_DIARIAS}' rebuilt");
    Ok(())
}

/// Total FOB per exporter per ISO year-week bucket with competition
/// ranking: ties share the same rank and the next distinct total skips
/// past them.
fn build_weekly_ranking(store: &Store) -> Result<()> {
    let mut ranking = store
        .scan_table(TABLE_DATOS_IDTY)?
        .with_columns([concat_str(
            [
                col("FECHAACEPT").dt().iso_year().cast(DataType::String),
                col("FECHAACEPT")
                    .dt()
                    .week()
                    .cast(DataType::String)
                    .str()
                    .zfill(lit(2)),
            ],
            "-W",
            true,
        )
        .alias("week")])
        .group_by([col("week"), col("NRO_EXPORTADOR")])
        .agg([col("FOBUNITARIO").sum().alias("total_fob")])
        .with_columns([col("total_fob")
            .rank(
                RankOptions {
                    method: RankMethod::Min,
                    descending: true,
                },
                None,
            )
            .over([col("week")])
            .cast(DataType::Int32)
            .alias("rank")])
        .select([
            col("week"),
            col("rank"),
            col("NRO_EXPORTADOR"),
            col("total_fob"),
        ])
        .sort(["week", "rank"], Default::default())
        .collect()?;
    store.replace_table(VIEW_RANKING_SEMANAL, &mut ranking)?;
    info!("View '{VIEW_RANKING_SEMANAL}' rebuilt");
    Ok(())
}

/// Sum of item gross weight divided by sum of package count, joined on
/// the shared identifier, grouped by acceptance date. Division by zero
/// yields null.
fn build_average_weight(store: &Store) -> Result<()> {
    let idty = store.scan_table(TABLE_DATOS_IDTY)?;
    let bultos = store.scan_table(DatasetKind::Bultos.table_name())?;

    let mut weights = idty
        .join(
            bultos,
            [col("NUMEROIDENT")],
            [col("NUMEROIDENT")],
            JoinArgs::new(JoinType::Inner),
        )
        .group_by([col("FECHAACEPT")])
        .agg([
            col("PESOBRUTOITEM").sum().alias("peso_total"),
            col("CANTIDADBULTO")
                .cast(DataType::Float64)
                .sum()
                .alias("bultos_total"),
        ])
        .select([
            when(col("bultos_total").neq(lit(0.0)))
                .then(col("peso_total") / col("bultos_total"))
                .otherwise(lit(NULL))
                .alias("average_weight_per_bulto"),
            col("FECHAACEPT")
                .dt()
                .to_string("%Y-%m-%d")
                .alias("fecha_aceptacion"),
        ])
        .sort(["fecha_aceptacion"], Default::default())
        .collect()?;
    store.replace_table(VIEW_PESO_PROMEDIO_BULTO, &mut weights)?;
    info!("View '{VIEW_PESO_PROMEDIO_BULTO}' rebuilt");
    Ok(())
}
