//! Client side of the adapter REST protocol.

use std::sync::Arc;

use async_trait::async_trait;
use scanplane_model::{Endpoint, ScanReport, ScanRequest, ScanResponse};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod auth;
pub mod http;
pub mod spec;

pub use auth::{Authorizer, authorizer_for};
pub use http::{ClientOptions, HttpAdapterClient, HttpAdapterClientFactory};
pub use spec::ApiSpec;

/// Self-description an adapter may publish under `/api/v1/metadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterMetadata {
    pub name: String,
    pub vendor: String,
    pub version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Stateless wrapper over one adapter's REST API. Implementations enforce
/// the expected HTTP status of every call and never retry.
#[async_trait]
pub trait AdapterClient: Send + Sync {
    async fn check_health(&self) -> Result<()>;

    async fn metadata(&self) -> Result<AdapterMetadata>;

    async fn scan(&self, request: &ScanRequest) -> Result<ScanResponse>;

    async fn get_report(&self, details_key: &str) -> Result<ScanReport>;
}

/// Builds a client for a registered endpoint.
pub trait AdapterClientFactory: Send + Sync {
    fn client_for(&self, endpoint: &Endpoint) -> Result<Arc<dyn AdapterClient>>;
}
