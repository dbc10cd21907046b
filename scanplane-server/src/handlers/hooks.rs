use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use scanplane_core::model::{ResultId, StatusChange};

use crate::infra::app_state::AppState;
use crate::infra::errors::AppResult;

/// Status hook target for scan jobs.
pub async fn scan_job_hook_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(change): Json<StatusChange>,
) -> AppResult<StatusCode> {
    state.hooks.handle_job_hooks(ResultId(id), &change).await?;
    Ok(StatusCode::OK)
}
