//! HTTP boundary of scanplane: adapter registry CRUD, scan requests,
//! report lookups and the status hook endpoint the job runtime calls back.

pub mod handlers;
pub mod infra;
pub mod routes;

use std::future::Future;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use infra::app_state::AppState;

/// Builds the full application router over `state`.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_api_router())
        .merge(routes::create_service_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the application on `listener` until `signal` resolves.
///
/// The job runtime is drained before the listener closes, so jobs stopped by
/// the shutdown can still post their status hooks back to this server.
pub async fn serve<F>(listener: TcpListener, state: AppState, signal: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_app(state.clone());
    let drain = async move {
        signal.await;
        info!("draining job runtime");
        state.shutdown().await;
    };
    axum::serve(listener, router)
        .with_graceful_shutdown(drain)
        .await
}
