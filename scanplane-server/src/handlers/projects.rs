use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::info;

use scanplane_core::model::{AdapterId, Endpoint};
use scanplane_core::ports::PROJECT_SCANNER_KEY;

use super::adapters::redacted;
use crate::infra::app_state::AppState;
use crate::infra::errors::{AppError, AppResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectScannerRequest {
    pub adapter_id: AdapterId,
}

/// Pins a project to a registered adapter.
pub async fn set_project_scanner_handler(
    State(state): State<AppState>,
    Path(namespace_id): Path<i64>,
    Json(request): Json<ProjectScannerRequest>,
) -> AppResult<StatusCode> {
    if !state.registry.exists(&request.adapter_id).await? {
        return Err(AppError::not_found(format!(
            "scanner adapter {} not found",
            request.adapter_id
        )));
    }
    state
        .projects
        .set(namespace_id, PROJECT_SCANNER_KEY, request.adapter_id.as_str())
        .await?;
    info!(namespace_id, adapter_id = %request.adapter_id, "project scanner set");
    Ok(StatusCode::OK)
}

/// The adapter a scan in this project would use right now.
pub async fn get_project_scanner_handler(
    State(state): State<AppState>,
    Path(namespace_id): Path<i64>,
) -> AppResult<Json<Endpoint>> {
    let endpoint = state.controller.resolve_adapter(namespace_id).await?;
    Ok(Json(redacted(endpoint)))
}
