pub mod v1;

use axum::{Router, routing::post};
use scanplane_core::SCAN_HOOK_PATH;

use crate::handlers::hooks::scan_job_hook_handler;
use crate::infra::app_state::AppState;

/// Create the main API router with all versions
pub fn create_api_router() -> Router<AppState> {
    Router::new().nest("/api/v1", v1::create_v1_router())
}

/// Internal callbacks from the job runtime.
pub fn create_service_router() -> Router<AppState> {
    Router::new().route(
        &format!("{SCAN_HOOK_PATH}/{{id}}"),
        post(scan_job_hook_handler),
    )
}
