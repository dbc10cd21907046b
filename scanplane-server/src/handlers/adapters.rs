use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use scanplane_core::model::{AdapterId, Endpoint};
use scanplane_core::store::EndpointQuery;

use crate::infra::app_state::AppState;
use crate::infra::errors::{AppError, AppResult};

const REDACTED: &str = "*****";

#[derive(Debug, Default, Deserialize)]
pub struct AdapterListQuery {
    pub url: Option<String>,
    pub adapter: Option<String>,
    pub auth: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl AdapterListQuery {
    fn into_query(self) -> EndpointQuery {
        let mut query = EndpointQuery {
            page: self.page,
            page_size: self.page_size,
            ..EndpointQuery::default()
        };
        for (key, value) in [("url", self.url), ("adapter", self.adapter), ("auth", self.auth)] {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                query = query.with_keyword(key, value);
            }
        }
        query
    }
}

#[derive(Debug, Serialize)]
pub struct AdapterCreatedResponse {
    pub id: AdapterId,
}

/// Credentials never leave the server.
pub(crate) fn redacted(mut endpoint: Endpoint) -> Endpoint {
    if !endpoint.access_credential.is_empty() {
        endpoint.access_credential = REDACTED.to_string();
    }
    endpoint
}

pub async fn list_adapters_handler(
    State(state): State<AppState>,
    Query(params): Query<AdapterListQuery>,
) -> AppResult<Json<Vec<Endpoint>>> {
    let endpoints = state.registry.list(&params.into_query()).await?;
    Ok(Json(endpoints.into_iter().map(redacted).collect()))
}

pub async fn create_adapter_handler(
    State(state): State<AppState>,
    Json(endpoint): Json<Endpoint>,
) -> AppResult<impl IntoResponse> {
    let id = state.registry.create(endpoint).await?;
    Ok((StatusCode::CREATED, Json(AdapterCreatedResponse { id })))
}

pub async fn get_adapter_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Endpoint>> {
    let id = AdapterId::from(id);
    let endpoint = state
        .registry
        .get(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("scanner adapter {id} not found")))?;
    Ok(Json(redacted(endpoint)))
}

/// Replaces the adapter; the path id wins over any id in the body. A
/// redacted credential in the body keeps the stored one.
pub async fn update_adapter_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut endpoint): Json<Endpoint>,
) -> AppResult<StatusCode> {
    endpoint.id = AdapterId::from(id);
    if endpoint.access_credential == REDACTED
        && let Some(stored) = state.registry.get(&endpoint.id).await?
    {
        endpoint.access_credential = stored.access_credential;
    }
    state.registry.update(endpoint).await?;
    Ok(StatusCode::OK)
}

pub async fn delete_adapter_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.registry.delete(&AdapterId::from(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn ping_adapter_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let id = AdapterId::from(id);
    state.registry.ping(&id).await?;
    info!(%id, "adapter answered health check");
    Ok(Json(serde_json::json!({ "id": id, "status": "healthy" })))
}
