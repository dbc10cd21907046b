//! Registered scanner adapters.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use scanplane_model::{AdapterId, Endpoint};
use tracing::{info, instrument, warn};

use crate::client::{AdapterClientFactory, authorizer_for};
use crate::error::{Result, ScanError};
use crate::store::{AdapterRemoval, AdapterStore, EndpointQuery};

#[derive(Clone)]
pub struct AdapterRegistry {
    store: Arc<dyn AdapterStore>,
    clients: Arc<dyn AdapterClientFactory>,
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry").finish_non_exhaustive()
    }
}

impl AdapterRegistry {
    pub fn new(store: Arc<dyn AdapterStore>, clients: Arc<dyn AdapterClientFactory>) -> Self {
        Self { store, clients }
    }

    /// Registers `endpoint`, assigning a fresh id unless one is supplied.
    #[instrument(skip(self, endpoint), fields(url = %endpoint.url, adapter = %endpoint.adapter))]
    pub async fn create(&self, mut endpoint: Endpoint) -> Result<AdapterId> {
        endpoint.validate_for_create()?;
        authorizer_for(&endpoint.auth, &endpoint.access_credential)?;

        if endpoint.id.is_empty() {
            endpoint.id = AdapterId::generate();
        }
        let now = Utc::now();
        endpoint.create_time = now;
        endpoint.update_time = now;

        self.store.insert(&endpoint).await?;
        info!(id = %endpoint.id, "scanner adapter registered");
        Ok(endpoint.id)
    }

    pub async fn get(&self, id: &AdapterId) -> Result<Option<Endpoint>> {
        if id.is_empty() {
            return Err(ScanError::Validation("empty adapter id".into()));
        }
        self.store.get(id).await
    }

    pub async fn exists(&self, id: &AdapterId) -> Result<bool> {
        Ok(self.get(id).await?.is_some())
    }

    #[instrument(skip(self, endpoint), fields(id = %endpoint.id))]
    pub async fn update(&self, mut endpoint: Endpoint) -> Result<()> {
        endpoint.validate()?;
        authorizer_for(&endpoint.auth, &endpoint.access_credential)?;

        let existing = self
            .store
            .get(&endpoint.id)
            .await?
            .ok_or_else(|| ScanError::NotFound(format!("scanner adapter {}", endpoint.id)))?;
        endpoint.create_time = existing.create_time;
        endpoint.update_time = Utc::now();

        if !self.store.update(&endpoint).await? {
            return Err(ScanError::NotFound(format!("scanner adapter {}", endpoint.id)));
        }
        Ok(())
    }

    /// Refuses to remove an adapter that still has an active scan.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &AdapterId) -> Result<()> {
        match self.store.delete(id).await? {
            AdapterRemoval::Removed => {
                info!(%id, "scanner adapter removed");
                Ok(())
            }
            AdapterRemoval::Missing => Err(ScanError::NotFound(format!("scanner adapter {id}"))),
            AdapterRemoval::Busy => {
                warn!(%id, "refusing to delete adapter with active scans");
                Err(ScanError::ResourceConflict(format!(
                    "scanner adapter {id} has scans in progress"
                )))
            }
        }
    }

    pub async fn list(&self, query: &EndpointQuery) -> Result<Vec<Endpoint>> {
        self.store.list(query).await
    }

    /// The enabled system default adapter, if one is flagged.
    pub async fn default_endpoint(&self) -> Result<Option<Endpoint>> {
        self.store.default_endpoint().await
    }

    /// Runs the adapter's health check.
    #[instrument(skip(self))]
    pub async fn ping(&self, id: &AdapterId) -> Result<()> {
        let endpoint = self
            .get(id)
            .await?
            .ok_or_else(|| ScanError::NotFound(format!("scanner adapter {id}")))?;
        self.clients.client_for(&endpoint)?.check_health().await
    }
}
