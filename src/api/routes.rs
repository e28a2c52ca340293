//! API route definitions.

use super::error::ApiError;
use super::state::AppState;
use crate::reporting::export::ExportFormat;
use crate::reporting::MAX_HISTOGRAM_BINS;
use crate::runner::uploads::{stage_uploads, Upload};
use crate::runner::{Browser, Orchestrator};
use crate::storage::TestStatus;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/kpis", get(kpis))
        .route("/results", get(list_results).delete(purge_results))
        .route("/results/export.csv", get(export_csv))
        .route("/results/export.json", get(export_json))
        .route("/results/export.xlsx", get(export_xlsx))
        .route("/trend", get(trend))
        .route("/histogram", get(histogram))
        .route("/runs", post(start_run))
}

#[derive(Debug, Deserialize)]
pub struct KpiQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    pub limit: Option<u32>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistogramQuery {
    pub bins: Option<usize>,
    pub limit: Option<u32>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PurgeQuery {
    pub older_than_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub browser: Browser,
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    #[serde(default)]
    pub uploads: Vec<Upload>,
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

/// Run store work on the blocking pool; SQLite may wait on a busy lock.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

async fn kpis(
    State(state): State<AppState>,
    Query(q): Query<KpiQuery>,
) -> Result<Json<Value>, ApiError> {
    let days = q.days.unwrap_or(state.config.reporting.kpi_window_days);
    let reporter = state.reporter.clone();
    let kpis = blocking(move || Ok(reporter.summary(days)?)).await?;
    Ok(Json(json!({ "data": kpis, "meta": { "window_days": days } })))
}

async fn list_results(
    State(state): State<AppState>,
    Query(q): Query<ResultsQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = q.limit.unwrap_or(state.config.reporting.history_limit);
    let reporter = state.reporter.clone();
    let search = q.search.clone();
    let table = blocking(move || Ok(reporter.history(limit, search.as_deref())?)).await?;
    Ok(Json(json!({
        "data": table,
        "meta": { "total": table.len(), "limit": limit, "search": q.search }
    })))
}

async fn export_csv(
    state: State<AppState>,
    query: Query<ResultsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    export(state, query, ExportFormat::Csv).await
}

async fn export_json(
    state: State<AppState>,
    query: Query<ResultsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    export(state, query, ExportFormat::Json).await
}

async fn export_xlsx(
    state: State<AppState>,
    query: Query<ResultsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    export(state, query, ExportFormat::Xlsx).await
}

async fn export(
    State(state): State<AppState>,
    Query(q): Query<ResultsQuery>,
    format: ExportFormat,
) -> Result<impl IntoResponse, ApiError> {
    let limit = q.limit.unwrap_or(state.config.reporting.history_limit);
    let reporter = state.reporter.clone();
    let body = blocking(move || {
        let table = reporter.history(limit, q.search.as_deref())?;
        Ok(table.export(format)?)
    })
    .await?;
    let headers = [
        (header::CONTENT_TYPE, format.content_type().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", format.file_name()),
        ),
    ];
    Ok((headers, body))
}

async fn trend(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let reporter = state.reporter.clone();
    let trend = blocking(move || Ok(reporter.trend()?)).await?;
    Ok(Json(json!({ "data": trend, "meta": { "days": trend.len() } })))
}

async fn histogram(
    State(state): State<AppState>,
    Query(q): Query<HistogramQuery>,
) -> Result<Json<Value>, ApiError> {
    let bins = q.bins.unwrap_or(state.config.reporting.histogram_bins);
    if bins == 0 || bins > MAX_HISTOGRAM_BINS {
        return Err(ApiError::BadRequest(format!(
            "bins must be between 1 and {MAX_HISTOGRAM_BINS}"
        )));
    }
    let limit = q.limit.unwrap_or(state.config.reporting.history_limit);
    let reporter = state.reporter.clone();
    let table = blocking(move || Ok(reporter.history(limit, q.search.as_deref())?)).await?;
    Ok(Json(json!({
        "data": table.duration_histogram(bins),
        "meta": { "bins": bins, "samples": table.rows.iter().filter(|r| r.duration.is_some()).count() }
    })))
}

/// Stage any uploads, then run uploads and paths as one sequential batch.
///
/// Blocks a worker thread until every file has finished.
async fn start_run(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<Value>, ApiError> {
    if req.paths.is_empty() && req.uploads.is_empty() {
        return Err(ApiError::BadRequest(
            "request names no test files to run".to_string(),
        ));
    }

    let runner = state.config.runner.clone();
    let store = state.store.clone();
    let outcomes = blocking(move || {
        let mut files = stage_uploads(&runner.upload_dir, &req.uploads).map_err(ApiError::Upload)?;
        files.extend(req.paths);
        Ok(Orchestrator::new(runner, store).run(&files, req.browser)?)
    })
    .await?;

    let failed = outcomes
        .iter()
        .filter(|o| o.status == TestStatus::Fail)
        .count();
    Ok(Json(json!({
        "data": outcomes,
        "meta": { "total": outcomes.len(), "failed": failed }
    })))
}

async fn purge_results(
    State(state): State<AppState>,
    Query(q): Query<PurgeQuery>,
) -> Result<Json<Value>, ApiError> {
    let days = q.older_than_days.unwrap_or(state.config.retention.days);
    let store = state.store.clone();
    let deleted = blocking(move || Ok(store.delete_older_than(days)?)).await?;
    Ok(Json(json!({
        "data": { "deleted": deleted },
        "meta": { "older_than_days": days }
    })))
}
