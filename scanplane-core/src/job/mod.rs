//! Asynchronous job contracts and the in-process runtime that executes them.
//!
//! A job reports progress to its status hook: `Running` when an attempt
//! starts, an optional check-in carrying its final payload, then `Success`,
//! `Error` or `Stopped`. Delivery is at-least-once.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use scanplane_model::{ScanStatus, StatusChange};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::{Result, ScanError};

pub mod delivery;
pub mod runtime;
pub mod scan;

pub use delivery::{HttpHookSender, LocalHookSender, StatusHookSender};
pub use runtime::{InProcJobRuntime, RuntimeConfig};
pub use scan::{SCAN_JOB_NAME, ScanJob, ScanJobConfig};

/// Opaque key/value parameters; values are JSON documents.
pub type JobParameters = HashMap<String, String>;

/// Unique identifier for submitted jobs.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A submission to the job runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobData {
    /// Name of a job registered with the runtime.
    pub name: String,
    pub parameters: JobParameters,
    /// URL the runtime posts [`StatusChange`]s to.
    pub status_hook: String,
}

#[async_trait]
pub trait Job: Send + Sync {
    /// Upper bound on attempts, including the first.
    fn max_fails(&self) -> u32;

    fn should_retry(&self) -> bool;

    /// Parameter check run once before any attempt. A failure ends the job
    /// in `Error` without retrying.
    fn validate(&self, parameters: &JobParameters) -> Result<()>;

    async fn run(&self, ctx: &JobContext, parameters: &JobParameters) -> Result<()>;
}

#[async_trait]
pub trait JobRuntime: Send + Sync {
    async fn submit(&self, job: JobData) -> Result<JobId>;
}

/// Per-job handle passed to [`Job::run`], shared by all attempts.
pub struct JobContext {
    job_id: JobId,
    status_hook: String,
    hooks: Arc<dyn StatusHookSender>,
    fallback: Option<Arc<dyn StatusHookSender>>,
    delivery_attempts: u32,
    retry_delay: Duration,
    checked_in: AtomicBool,
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("job_id", &self.job_id)
            .field("status_hook", &self.status_hook)
            .field("fallback", &self.fallback.is_some())
            .field("checked_in", &self.checked_in.load(Ordering::Relaxed))
            .finish()
    }
}

impl JobContext {
    pub fn new(
        job_id: JobId,
        status_hook: impl Into<String>,
        hooks: Arc<dyn StatusHookSender>,
        delivery_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            job_id,
            status_hook: status_hook.into(),
            hooks,
            fallback: None,
            delivery_attempts: delivery_attempts.max(1),
            retry_delay,
            checked_in: AtomicBool::new(false),
        }
    }

    /// Sender used for terminal statuses the status hook never accepted.
    pub fn with_fallback(mut self, fallback: Option<Arc<dyn StatusHookSender>>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Delivers the job's final payload. Only one check-in per job is
    /// accepted.
    pub async fn check_in(&self, payload: String) -> Result<()> {
        if self.checked_in.load(Ordering::Acquire) {
            return Err(ScanError::Internal(format!(
                "job {} already checked in",
                self.job_id
            )));
        }
        self.deliver(&StatusChange::check_in(self.job_id.to_string(), payload))
            .await?;
        self.checked_in.store(true, Ordering::Release);
        Ok(())
    }

    pub fn has_checked_in(&self) -> bool {
        self.checked_in.load(Ordering::Acquire)
    }

    /// Status notification with retries. A terminal status the hook never
    /// accepted goes to the fallback sender, if one is set.
    pub(crate) async fn report(&self, status: ScanStatus) -> bool {
        let change = StatusChange::status(self.job_id.to_string(), status);
        let err = match self.deliver(&change).await {
            Ok(()) => return true,
            Err(err) => err,
        };

        if status.is_terminal()
            && let Some(fallback) = &self.fallback
        {
            match fallback.deliver(&self.status_hook, &change).await {
                Ok(()) => {
                    warn!(
                        job_id = %self.job_id,
                        %status,
                        error = %err,
                        "status hook unreachable; terminal status applied through fallback"
                    );
                    return true;
                }
                Err(fallback_err) => {
                    error!(job_id = %self.job_id, %status, error = %fallback_err, "fallback status delivery failed");
                }
            }
        }
        warn!(job_id = %self.job_id, %status, error = %err, "status hook delivery gave up");
        false
    }

    async fn deliver(&self, change: &StatusChange) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.hooks.deliver(&self.status_hook, change).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt >= self.delivery_attempts => return Err(err),
                Err(err) => {
                    warn!(
                        job_id = %self.job_id,
                        attempt,
                        error = %err,
                        "status hook delivery failed; retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}
