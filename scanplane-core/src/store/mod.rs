//! Repository contracts for adapter registrations and scan result rows.
//!
//! The in-memory implementations back tests and single-process deployments;
//! the Postgres implementations are compiled with the `postgres` feature.

use std::collections::HashMap;

use async_trait::async_trait;
use scanplane_model::{AdapterId, Endpoint, ResultId, ScanResult, ScanStatus};

use crate::error::Result;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{InMemoryAdapterStore, InMemoryResultStore};
#[cfg(feature = "postgres")]
pub use postgres::{MIGRATOR, PostgresAdapterStore, PostgresResultStore};

/// Outcome of the atomic create gate for a (digest, adapter) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new row was inserted; any terminal predecessor was removed.
    Created(ResultId),
    /// A non-terminal row already exists and was left untouched.
    Active(ScanResult),
    /// The adapter is not registered; nothing was written.
    UnknownAdapter,
}

/// Outcome of removing an adapter registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterRemoval {
    Removed,
    Missing,
    /// A non-terminal result still references the adapter; nothing changed.
    Busy,
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Checks for an existing row for `(digest, adapter_id)` and inserts
    /// `result` in one critical section. A terminal predecessor is deleted
    /// first; an active one makes the call return [`CreateOutcome::Active`].
    /// The adapter must be registered; the check is serialized with
    /// [`AdapterStore::delete`].
    async fn insert_superseding(&self, result: ScanResult) -> Result<CreateOutcome>;

    /// Overwrites report, end time and job id. The status is written only if
    /// it advances the stored status code. Returns false if no row matched.
    async fn update(&self, result: &ScanResult) -> Result<bool>;

    /// Conditional status write: applies only when the new code is strictly
    /// greater than the stored one. Returns whether the row changed.
    async fn update_status_if_advancing(
        &self,
        id: ResultId,
        status: ScanStatus,
    ) -> Result<bool>;

    async fn set_job_id(&self, id: ResultId, job_id: &str) -> Result<bool>;

    async fn get(&self, id: ResultId) -> Result<Option<ScanResult>>;

    async fn find(
        &self,
        digest: &str,
        adapter_id: &AdapterId,
    ) -> Result<Option<ScanResult>>;

    async fn list_by_digest(&self, digest: &str) -> Result<Vec<ScanResult>>;

    async fn delete(&self, id: ResultId) -> Result<bool>;
}

/// Keyword filter plus 1-based pagination over registered endpoints.
///
/// Supported keywords are `url`, `adapter` and `auth`; each matches as a
/// case-insensitive substring. Unknown keywords are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointQuery {
    pub keywords: HashMap<String, String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl EndpointQuery {
    pub const KEYWORDS: [&'static str; 3] = ["url", "adapter", "auth"];

    pub fn with_keyword(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.keywords.insert(key.into(), value.into());
        self
    }

    pub fn paged(mut self, page: u32, page_size: u32) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }

    /// `(offset, limit)` when both page and size are set and positive.
    pub fn window(&self) -> Option<(usize, usize)> {
        match (self.page, self.page_size) {
            (Some(page), Some(size)) if page > 0 && size > 0 => {
                Some(((page as usize - 1) * size as usize, size as usize))
            }
            _ => None,
        }
    }

    pub(crate) fn matches(&self, endpoint: &Endpoint) -> bool {
        self.keywords.iter().all(|(key, needle)| {
            let haystack = match key.as_str() {
                "url" => &endpoint.url,
                "adapter" => &endpoint.adapter,
                "auth" => &endpoint.auth,
                _ => return true,
            };
            haystack.to_lowercase().contains(&needle.to_lowercase())
        })
    }
}

#[async_trait]
pub trait AdapterStore: Send + Sync {
    /// Inserts a new registration. Fails with a resource conflict when the
    /// id or URL is already taken. A default endpoint clears the flag on
    /// every other registration.
    async fn insert(&self, endpoint: &Endpoint) -> Result<()>;

    async fn get(&self, id: &AdapterId) -> Result<Option<Endpoint>>;

    /// Same uniqueness and default rules as [`AdapterStore::insert`].
    async fn update(&self, endpoint: &Endpoint) -> Result<bool>;

    /// Removes the registration unless a non-terminal result references it.
    /// The check and the removal form one critical section with
    /// [`ResultStore::insert_superseding`] for the same adapter.
    async fn delete(&self, id: &AdapterId) -> Result<AdapterRemoval>;

    async fn list(&self, query: &EndpointQuery) -> Result<Vec<Endpoint>>;

    /// The enabled endpoint flagged as system default, if any.
    async fn default_endpoint(&self) -> Result<Option<Endpoint>>;
}
