use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, Method},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    AppState,
    error::AppError,
    models::{AnalysisContent, AnalysisReport, ColumnMapping, ReportStatus},
};

/// Header carrying the caller identity, set by the authenticating gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

// Multipart framing around the file
const BODY_OVERHEAD: usize = 64 * 1024;

pub fn routes(state: &AppState) -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/analyze", post(analyze_file))
        .route("/report/:report_id", get(get_report))
        .route("/reports", get(list_reports))
        .layer(DefaultBodyLimit::max(state.config.max_file_size + BODY_OVERHEAD))
        .layer(cors)
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    report_id: String,
    status: ReportStatus,
    column_mapping: Option<ColumnMapping>,
    analysis: Option<AnalysisContent>,
    created_at: DateTime<Utc>,
    filename: String,
}

impl From<AnalysisReport> for ReportResponse {
    fn from(report: AnalysisReport) -> Self {
        Self {
            report_id: report.id,
            status: report.status,
            column_mapping: report.column_mapping,
            analysis: report.analysis,
            created_at: report.created_at,
            filename: report.filename,
        }
    }
}

fn owner_from_headers(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Unauthorized(format!("Missing {} header", USER_ID_HEADER)))
}

async fn read_upload(multipart: &mut Multipart) -> Result<(String, Bytes), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::InvalidInput("Uploaded file has no filename".to_string()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Invalid upload: {}", e)))?;
        return Ok((filename, data));
    }

    Err(AppError::InvalidInput("No file provided".to_string()))
}

async fn analyze_file(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<ReportResponse>, AppError> {
    let owner_id = owner_from_headers(&headers)?;
    let (filename, data) = read_upload(&mut multipart).await?;
    tracing::info!("Received {} ({}KB) from {}", filename, data.len() / 1024, owner_id);

    let report = state.pipeline.analyze(&owner_id, &filename, &data).await?;
    Ok(Json(report.into()))
}

async fn get_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(report_id): Path<String>,
) -> Result<Json<ReportResponse>, AppError> {
    let owner_id = owner_from_headers(&headers)?;
    let report = state.pipeline.get_report(&owner_id, &report_id).await?;
    Ok(Json(report.into()))
}

async fn list_reports(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ReportResponse>>, AppError> {
    let owner_id = owner_from_headers(&headers)?;
    let reports = state.pipeline.list_reports(&owner_id).await?;
    Ok(Json(reports.into_iter().map(ReportResponse::from).collect()))
}
