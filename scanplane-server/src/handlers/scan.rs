use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use tracing::warn;

use scanplane_core::model::{Artifact, ResultId, ScanReport, ScanResult, VulnerabilityItem};

use crate::infra::app_state::AppState;
use crate::infra::errors::{AppError, AppResult};

#[derive(Debug, Serialize)]
pub struct ScanAcceptedResponse {
    pub id: ResultId,
}

/// A result row together with the vulnerabilities of its checked-in report.
#[derive(Debug, Serialize)]
pub struct ScanReportView {
    #[serde(flatten)]
    pub result: ScanResult,
    pub vulnerabilities: Vec<VulnerabilityItem>,
}

impl ScanReportView {
    fn new(result: ScanResult) -> Self {
        let vulnerabilities = if result.has_report() {
            match serde_json::from_str::<ScanReport>(&result.report) {
                Ok(report) => report.vulnerabilities,
                Err(err) => {
                    warn!(result_id = %result.id, error = %err, "stored report is not decodable");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        Self {
            result,
            vulnerabilities,
        }
    }
}

pub async fn start_scan_handler(
    State(state): State<AppState>,
    Json(artifact): Json<Artifact>,
) -> AppResult<impl IntoResponse> {
    let id = state.controller.scan(&artifact).await?;
    Ok((StatusCode::ACCEPTED, Json(ScanAcceptedResponse { id })))
}

pub async fn get_scan_report_handler(
    State(state): State<AppState>,
    Query(artifact): Query<Artifact>,
) -> AppResult<Json<ScanReportView>> {
    let result = state
        .controller
        .get_report(&artifact)
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("no scan result for {}", artifact.digest))
        })?;
    Ok(Json(ScanReportView::new(result)))
}

pub async fn list_scan_results_handler(
    State(state): State<AppState>,
    Path(digest): Path<String>,
) -> AppResult<Json<Vec<ScanResult>>> {
    Ok(Json(state.results.get_all(&digest).await?))
}
