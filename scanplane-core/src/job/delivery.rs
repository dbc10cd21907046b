//! Transports that carry a job's [`StatusChange`]s to its status hook.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use scanplane_model::{ResultId, StatusChange};
use tracing::debug;

use crate::error::{Result, ScanError};
use crate::hook::HookHandler;

#[async_trait]
pub trait StatusHookSender: Send + Sync {
    async fn deliver(&self, hook_url: &str, change: &StatusChange) -> Result<()>;
}

/// Posts status changes as JSON and expects a 2xx answer.
#[derive(Debug, Clone)]
pub struct HttpHookSender {
    http: reqwest::Client,
}

impl HttpHookSender {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl StatusHookSender for HttpHookSender {
    async fn deliver(&self, hook_url: &str, change: &StatusChange) -> Result<()> {
        let response = self.http.post(hook_url).json(change).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScanError::HookDelivery(format!(
                "{hook_url} answered {status}: {}",
                body.trim()
            )));
        }
        debug!(hook_url, status = %change.status, "status hook delivered");
        Ok(())
    }
}

/// Hands status changes straight to an in-process [`HookHandler`].
///
/// The result id is the last path segment of the hook URL, so URLs built for
/// the HTTP transport work unchanged.
#[derive(Clone)]
pub struct LocalHookSender {
    handler: HookHandler,
}

impl fmt::Debug for LocalHookSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalHookSender").finish_non_exhaustive()
    }
}

impl LocalHookSender {
    pub fn new(handler: HookHandler) -> Self {
        Self { handler }
    }
}

pub(crate) fn result_id_from_hook(hook_url: &str) -> Result<ResultId> {
    let segment = hook_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    segment.parse().map_err(|_| {
        ScanError::Validation(format!("status hook {hook_url} does not end in a result id"))
    })
}

#[async_trait]
impl StatusHookSender for LocalHookSender {
    async fn deliver(&self, hook_url: &str, change: &StatusChange) -> Result<()> {
        let id = result_id_from_hook(hook_url)?;
        self.handler.handle_job_hooks(id, change).await
    }
}
