//! State machine over persisted scan results.
//!
//! Rows move `Pending -> Running -> {Success, Error, Stopped}` and never
//! back. At most one non-terminal row exists per (digest, adapter) pair.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use scanplane_model::{AdapterId, ResultId, ScanResult, ScanStatus};
use tracing::{debug, info, instrument};

use crate::error::{Result, ScanError};
use crate::store::{CreateOutcome, ResultStore};

#[derive(Clone)]
pub struct ResultManager {
    store: Arc<dyn ResultStore>,
}

impl fmt::Debug for ResultManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultManager").finish_non_exhaustive()
    }
}

impl ResultManager {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self { store }
    }

    /// Inserts a `Pending` placeholder for the result's pair.
    ///
    /// Fails with [`ScanError::Conflict`] naming the in-progress status when
    /// the pair already has an active row, and with [`ScanError::NotFound`]
    /// when the adapter is no longer registered. A terminal row is
    /// superseded.
    #[instrument(skip(self, result), fields(digest = %result.digest, adapter = %result.adapter_id))]
    pub async fn create(&self, mut result: ScanResult) -> Result<ResultId> {
        if result.digest.trim().is_empty() {
            return Err(ScanError::Validation("missing digest".into()));
        }
        if result.adapter_id.is_empty() {
            return Err(ScanError::Validation("missing adapter id".into()));
        }

        result.set_status(ScanStatus::Pending);
        result.start_time = Utc::now();
        result.end_time = None;
        result.report.clear();

        let result_adapter = result.adapter_id.clone();
        match self.store.insert_superseding(result).await? {
            CreateOutcome::Created(id) => {
                info!(%id, "scan result placeholder created");
                Ok(id)
            }
            CreateOutcome::Active(existing) => {
                debug!(id = %existing.id, status = %existing.status, "scan already in progress");
                Err(ScanError::Conflict {
                    status: existing.status,
                })
            }
            CreateOutcome::UnknownAdapter => Err(ScanError::NotFound(format!(
                "scanner adapter {result_adapter}"
            ))),
        }
    }

    /// Overwrites report, end time and job id of an existing row. The status
    /// carried by `result` is applied only if it moves the row forward.
    #[instrument(skip(self, result), fields(id = %result.id, status = %result.status))]
    pub async fn update(&self, result: &ScanResult) -> Result<()> {
        if !result.id.is_valid() {
            return Err(ScanError::Validation(format!(
                "invalid scan result id {}",
                result.id
            )));
        }
        if !self.store.update(result).await? {
            return Err(ScanError::NotFound(format!("scan result {}", result.id)));
        }
        Ok(())
    }

    /// Applies `status` unless the row is already at or past its code.
    /// Returns whether the row changed.
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: ResultId, status: &str) -> Result<bool> {
        let status: ScanStatus = status.parse()?;
        let applied = self.store.update_status_if_advancing(id, status).await?;
        if !applied {
            debug!(%id, %status, "stale or duplicate status change ignored");
        }
        Ok(applied)
    }

    pub async fn attach_job(&self, id: ResultId, job_id: &str) -> Result<()> {
        if !self.store.set_job_id(id, job_id).await? {
            return Err(ScanError::NotFound(format!("scan result {id}")));
        }
        Ok(())
    }

    pub async fn get(&self, id: ResultId) -> Result<Option<ScanResult>> {
        self.store.get(id).await
    }

    pub async fn get_by(
        &self,
        digest: &str,
        adapter_id: &AdapterId,
    ) -> Result<Option<ScanResult>> {
        self.store.find(digest, adapter_id).await
    }

    pub async fn get_all(&self, digest: &str) -> Result<Vec<ScanResult>> {
        self.store.list_by_digest(digest).await
    }
}
