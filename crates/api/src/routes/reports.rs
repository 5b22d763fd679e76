//! Report generation (scenario 4: offloading CPU-bound work).

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use workers::ReportResult;

use crate::error::ApiError;
use crate::state::AppState;

fn default_report_type() -> String {
    "monthly".to_string()
}

#[derive(Debug, Deserialize)]
pub struct GenerateReportRequest {
    #[serde(default = "default_report_type")]
    pub report_type: String,
}

#[derive(Debug, Serialize)]
pub struct ReportJobResponse {
    pub job_id: String,
    pub status: &'static str,
    pub message: &'static str,
}

/// POST /generate_report: the body is optional.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    body: Option<Json<GenerateReportRequest>>,
) -> Result<(StatusCode, Json<ReportJobResponse>), ApiError> {
    let report_type = body.map_or_else(default_report_type, |Json(req)| req.report_type);
    let job_id = state
        .components
        .reports
        .submit(state.ctx.publisher(), &report_type)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ReportJobResponse {
            job_id,
            status: "queued",
            message: "Report generation job queued. Processing in background.",
        }),
    ))
}

/// GET /reports/{job_id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<ReportResult>, ApiError> {
    state
        .components
        .reports
        .store()
        .get(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Report not found".to_string()))
}
