//! HTTP query API over the analytical store.
//!
//! Serves the materialized views plus an ETL trigger endpoint. A
//! triggered run executes on a blocking task and is tracked in an
//! in-memory run registry, so callers poll `/etl/runs/{id}` for the
//! outcome instead of holding the request open. View queries open the
//! store per request and therefore always see the latest completed load.

use crate::config::Config;
use crate::error::EtlError;
use crate::pipeline::{self, PipelineSummary};
use crate::store::{
    Store, VIEW_PESO_PROMEDIO_BULTO, VIEW_RANKING_SEMANAL, VIEW_TENDENCIAS_DIARIAS,
};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;

/// State of one triggered pipeline run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunState {
    Running,
    Completed { summary: PipelineSummary },
    Failed { error: String },
}

type RunRegistry = Arc<Mutex<HashMap<Uuid, RunState>>>;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    runs: RunRegistry,
}

#[derive(Debug, Deserialize)]
struct DateRange {
    start_date: String,
    end_date: String,
}

impl DateRange {
    /// Validate both bounds as ISO dates; view filters then work as
    /// plain string comparisons.
    fn parse(&self) -> Result<(NaiveDate, NaiveDate), ApiError> {
        let start = parse_iso_date(&self.start_date)?;
        let end = parse_iso_date(&self.end_date)?;
        if start > end {
            return Err(ApiError::BadRequest(format!(
                "start_date {} is after end_date {}",
                self.start_date, self.end_date
            )));
        }
        Ok((start, end))
    }
}

fn parse_iso_date(value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("invalid date '{value}', expected YYYY-MM-DD")))
}

/// ISO year-week bucket label for a date, e.g. 2025-W09
fn week_label(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotFound(String),
    Service(EtlError),
}

impl From<EtlError> for ApiError {
    fn from(e: EtlError) -> Self {
        ApiError::Service(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Service(e) => {
                let status = match &e {
                    EtlError::TableNotFound { .. } | EtlError::StoreNotInitialized { .. } => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                error!("Request failed: {e}");
                (status, e.to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct TriggerResponse {
    run_id: Uuid,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct TrendPoint {
    period: String,
    average_fob: f64,
    change_from_previous: Option<f64>,
}

#[derive(Debug, Serialize)]
struct RankingEntry {
    week: String,
    rank: i32,
    exporter_id: i64,
    total_fob: f64,
}

#[derive(Debug, Serialize)]
struct AverageWeightResponse {
    start_date: String,
    end_date: String,
    /// Null when no declaration in range has a usable package count
    average_weight_per_bulto: Option<f64>,
}

/// Build the application router
pub fn router(config: Config) -> Router {
    let state = AppState {
        config: Arc::new(config),
        runs: Arc::new(Mutex::new(HashMap::new())),
    };
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/trigger-etl", post(trigger_etl))
        .route("/etl/runs/:id", get(run_status))
        .route("/trends/fob-daily", get(fob_daily_trends))
        .route("/rankings/exporters-weekly", get(weekly_ranking))
        .route("/stats/average-weight-per-bulto", get(average_weight))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(config: Config) -> crate::error::Result<()> {
    let bind = config.api_bind.clone();
    let app = router(config);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("API listening on {bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn trigger_etl(State(state): State<AppState>) -> (StatusCode, Json<TriggerResponse>) {
    let run_id = Uuid::new_v4();
    state
        .runs
        .lock()
        .expect("run registry poisoned")
        .insert(run_id, RunState::Running);
    info!("ETL run {run_id} triggered");

    let config = Arc::clone(&state.config);
    let runs = Arc::clone(&state.runs);
    tokio::task::spawn_blocking(move || {
        let outcome = match pipeline::run_pipeline(&config) {
            Ok(summary) => RunState::Completed { summary },
            Err(e) => {
                error!("ETL run {run_id} failed: {e}");
                RunState::Failed {
                    error: e.to_string(),
                }
            }
        };
        runs.lock().expect("run registry poisoned").insert(run_id, outcome);
    });

    (
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            run_id,
            status: "running",
        }),
    )
}

async fn run_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunState>, ApiError> {
    let runs = state.runs.lock().expect("run registry poisoned");
    runs.get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("unknown run id {id}")))
}

async fn fob_daily_trends(
    State(state): State<AppState>,
    Query(range): Query<DateRange>,
) -> Result<Json<Vec<TrendPoint>>, ApiError> {
    range.parse()?;
    let store = Store::open_existing(&state.config.store_dir)?;
    let df = store
        .scan_table(VIEW_TENDENCIAS_DIARIAS)?
        .filter(
            col("period")
                .gt_eq(lit(range.start_date.as_str()))
                .and(col("period").lt_eq(lit(range.end_date.as_str()))),
        )
        .collect()
        .map_err(EtlError::from)?;

    let period = df.column("period").map_err(EtlError::from)?;
    let period = period.str().map_err(EtlError::from)?;
    let average = df.column("average_fob").map_err(EtlError::from)?;
    let average = average.f64().map_err(EtlError::from)?;
    let change = df.column("change_from_previous").map_err(EtlError::from)?;
    let change = change.f64().map_err(EtlError::from)?;

    let mut points = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        points.push(TrendPoint {
            period: period.get(i).unwrap_or_default().to_string(),
            average_fob: average.get(i).unwrap_or_default(),
            change_from_previous: change.get(i),
        });
    }
    Ok(Json(points))
}

async fn weekly_ranking(
    State(state): State<AppState>,
    Query(range): Query<DateRange>,
) -> Result<Json<Vec<RankingEntry>>, ApiError> {
    let (start, end) = range.parse()?;
    let start_week = week_label(start);
    let end_week = week_label(end);

    let store = Store::open_existing(&state.config.store_dir)?;
    let df = store
        .scan_table(VIEW_RANKING_SEMANAL)?
        .filter(
            col("week")
                .gt_eq(lit(start_week.as_str()))
                .and(col("week").lt_eq(lit(end_week.as_str()))),
        )
        .collect()
        .map_err(EtlError::from)?;

    let week = df.column("week").map_err(EtlError::from)?;
    let week = week.str().map_err(EtlError::from)?;
    let rank = df.column("rank").map_err(EtlError::from)?;
    let rank = rank.i32().map_err(EtlError::from)?;
    let exporter = df.column("NRO_EXPORTADOR").map_err(EtlError::from)?;
    let exporter = exporter.i64().map_err(EtlError::from)?;
    let total = df.column("total_fob").map_err(EtlError::from)?;
    let total = total.f64().map_err(EtlError::from)?;

    let mut entries = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        entries.push(RankingEntry {
            week: week.get(i).unwrap_or_default().to_string(),
            rank: rank.get(i).unwrap_or_default(),
            exporter_id: exporter.get(i).unwrap_or_default(),
            total_fob: total.get(i).unwrap_or_default(),
        });
    }
    Ok(Json(entries))
}

async fn average_weight(
    State(state): State<AppState>,
    Query(range): Query<DateRange>,
) -> Result<Json<AverageWeightResponse>, ApiError> {
    range.parse()?;
    let store = Store::open_existing(&state.config.store_dir)?;
    let df = store
        .scan_table(VIEW_PESO_PROMEDIO_BULTO)?
        .filter(
            col("fecha_aceptacion")
                .gt_eq(lit(range.start_date.as_str()))
                .and(col("fecha_aceptacion").lt_eq(lit(range.end_date.as_str()))),
        )
        .select([col("average_weight_per_bulto").mean()])
        .collect()
        .map_err(EtlError::from)?;

    let average = df
        .column("average_weight_per_bulto")
        .map_err(EtlError::from)?;
    let average = average.f64().map_err(EtlError::from)?.get(0);

    Ok(Json(AverageWeightResponse {
        start_date: range.start_date,
        end_date: range.end_date,
        average_weight_per_bulto: average,
    }))
}
