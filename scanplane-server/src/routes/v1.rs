use axum::{
    Router,
    routing::{get, post, put},
};

use crate::handlers::{adapters, health, projects, scan};
use crate::infra::app_state::AppState;

/// Create all v1 API routes
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_handler))
        // Adapter registry
        .route(
            "/adapters",
            get(adapters::list_adapters_handler).post(adapters::create_adapter_handler),
        )
        .route(
            "/adapters/{id}",
            get(adapters::get_adapter_handler)
                .put(adapters::update_adapter_handler)
                .delete(adapters::delete_adapter_handler),
        )
        .route("/adapters/{id}/ping", post(adapters::ping_adapter_handler))
        // Project scanner selection
        .route(
            "/projects/{namespace_id}/scanner",
            put(projects::set_project_scanner_handler).get(projects::get_project_scanner_handler),
        )
        // Scans
        .route("/scan", post(scan::start_scan_handler))
        .route("/scan/report", get(scan::get_scan_report_handler))
        .route("/scan/results/{digest}", get(scan::list_scan_results_handler))
}
