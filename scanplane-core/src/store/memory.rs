use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use scanplane_model::{AdapterId, Endpoint, ResultId, ScanResult, ScanStatus};
use tokio::sync::Mutex;

use super::{AdapterRemoval, AdapterStore, CreateOutcome, EndpointQuery, ResultStore};
use crate::error::{Result, ScanError};

/// Registrations and result rows share one lock so that registering a
/// scan and removing its adapter cannot interleave.
#[derive(Debug, Default)]
struct Tables {
    endpoints: Vec<Endpoint>,
    next_id: i64,
    rows: BTreeMap<i64, ScanResult>,
}

impl Tables {
    fn find(&self, digest: &str, adapter_id: &AdapterId) -> Option<&ScanResult> {
        self.rows
            .values()
            .find(|row| row.digest == digest && &row.adapter_id == adapter_id)
    }

    fn has_active_for(&self, adapter_id: &AdapterId) -> bool {
        self.rows
            .values()
            .any(|row| &row.adapter_id == adapter_id && row.is_active())
    }
}

/// Result rows; obtained from [`InMemoryAdapterStore::results`].
#[derive(Debug, Clone)]
pub struct InMemoryResultStore {
    inner: Arc<Mutex<Tables>>,
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn insert_superseding(
        &self,
        mut result: ScanResult,
    ) -> Result<CreateOutcome> {
        let mut guard = self.inner.lock().await;

        if !guard.endpoints.iter().any(|e| e.id == result.adapter_id) {
            return Ok(CreateOutcome::UnknownAdapter);
        }
        if let Some(existing) = guard.find(&result.digest, &result.adapter_id) {
            if existing.is_active() {
                return Ok(CreateOutcome::Active(existing.clone()));
            }
            let stale = existing.id.get();
            guard.rows.remove(&stale);
        }

        guard.next_id += 1;
        let id = guard.next_id;
        result.id = ResultId(id);
        guard.rows.insert(id, result);
        Ok(CreateOutcome::Created(ResultId(id)))
    }

    async fn update(&self, result: &ScanResult) -> Result<bool> {
        let mut guard = self.inner.lock().await;
        let Some(row) = guard.rows.get_mut(&result.id.get()) else {
            return Ok(false);
        };
        row.report = result.report.clone();
        row.end_time = result.end_time;
        row.job_id = result.job_id.clone();
        if result.status.advances(row.status) {
            row.set_status(result.status);
        }
        Ok(true)
    }

    async fn update_status_if_advancing(
        &self,
        id: ResultId,
        status: ScanStatus,
    ) -> Result<bool> {
        let mut guard = self.inner.lock().await;
        match guard.rows.get_mut(&id.get()) {
            Some(row) if status.advances(row.status) => {
                row.set_status(status);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_job_id(&self, id: ResultId, job_id: &str) -> Result<bool> {
        let mut guard = self.inner.lock().await;
        match guard.rows.get_mut(&id.get()) {
            Some(row) => {
                row.job_id = job_id.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, id: ResultId) -> Result<Option<ScanResult>> {
        Ok(self.inner.lock().await.rows.get(&id.get()).cloned())
    }

    async fn find(
        &self,
        digest: &str,
        adapter_id: &AdapterId,
    ) -> Result<Option<ScanResult>> {
        Ok(self.inner.lock().await.find(digest, adapter_id).cloned())
    }

    async fn list_by_digest(&self, digest: &str) -> Result<Vec<ScanResult>> {
        let guard = self.inner.lock().await;
        Ok(guard
            .rows
            .values()
            .filter(|row| row.digest == digest)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: ResultId) -> Result<bool> {
        Ok(self.inner.lock().await.rows.remove(&id.get()).is_some())
    }
}

/// Registered endpoints in registration order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAdapterStore {
    inner: Arc<Mutex<Tables>>,
}

impl InMemoryAdapterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The result store sharing this store's lock.
    pub fn results(&self) -> InMemoryResultStore {
        InMemoryResultStore {
            inner: self.inner.clone(),
        }
    }
}

fn ensure_unique(rows: &[Endpoint], endpoint: &Endpoint) -> Result<()> {
    if rows
        .iter()
        .any(|row| row.id != endpoint.id && row.url == endpoint.url)
    {
        return Err(ScanError::ResourceConflict(format!(
            "endpoint url {} is already registered",
            endpoint.url
        )));
    }
    Ok(())
}

fn clear_other_defaults(rows: &mut [Endpoint], keep: &AdapterId) {
    let now = Utc::now();
    for row in rows.iter_mut().filter(|row| &row.id != keep && row.is_default) {
        row.is_default = false;
        row.update_time = now;
    }
}

#[async_trait]
impl AdapterStore for InMemoryAdapterStore {
    async fn insert(&self, endpoint: &Endpoint) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let rows = &mut guard.endpoints;
        if rows.iter().any(|row| row.id == endpoint.id) {
            return Err(ScanError::ResourceConflict(format!(
                "endpoint {} already exists",
                endpoint.id
            )));
        }
        ensure_unique(rows, endpoint)?;
        if endpoint.is_default {
            clear_other_defaults(rows, &endpoint.id);
        }
        rows.push(endpoint.clone());
        Ok(())
    }

    async fn get(&self, id: &AdapterId) -> Result<Option<Endpoint>> {
        let guard = self.inner.lock().await;
        Ok(guard.endpoints.iter().find(|row| &row.id == id).cloned())
    }

    async fn update(&self, endpoint: &Endpoint) -> Result<bool> {
        let mut guard = self.inner.lock().await;
        let rows = &mut guard.endpoints;
        ensure_unique(rows, endpoint)?;
        let Some(index) = rows.iter().position(|row| row.id == endpoint.id) else {
            return Ok(false);
        };
        if endpoint.is_default {
            clear_other_defaults(rows, &endpoint.id);
        }
        rows[index] = endpoint.clone();
        Ok(true)
    }

    async fn delete(&self, id: &AdapterId) -> Result<AdapterRemoval> {
        let mut guard = self.inner.lock().await;
        let Some(index) = guard.endpoints.iter().position(|row| &row.id == id) else {
            return Ok(AdapterRemoval::Missing);
        };
        if guard.has_active_for(id) {
            return Ok(AdapterRemoval::Busy);
        }
        guard.endpoints.remove(index);
        Ok(AdapterRemoval::Removed)
    }

    async fn list(&self, query: &EndpointQuery) -> Result<Vec<Endpoint>> {
        let guard = self.inner.lock().await;
        let matched = guard.endpoints.iter().filter(|row| query.matches(row)).cloned();
        Ok(match query.window() {
            Some((offset, limit)) => matched.skip(offset).take(limit).collect(),
            None => matched.collect(),
        })
    }

    async fn default_endpoint(&self) -> Result<Option<Endpoint>> {
        let guard = self.inner.lock().await;
        Ok(guard
            .endpoints
            .iter()
            .find(|row| row.is_default && row.is_enabled())
            .cloned())
    }
}
