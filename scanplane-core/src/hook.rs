//! Folds job status hooks into scan result rows.

use chrono::Utc;
use scanplane_model::{ResultId, StatusChange};
use tracing::{debug, info, instrument};

use crate::error::{Result, ScanError};
use crate::results::ResultManager;

/// Path under the internal callback base where scan job hooks land; the
/// result id is appended as the final segment.
pub const SCAN_HOOK_PATH: &str = "/service/notifications/jobs/scan/tasks";

/// Builds the status hook URL for a scan result.
pub fn scan_hook_url(callback_base: &str, id: ResultId) -> String {
    format!("{}{SCAN_HOOK_PATH}/{id}", callback_base.trim_end_matches('/'))
}

#[derive(Debug, Clone)]
pub struct HookHandler {
    results: ResultManager,
}

impl HookHandler {
    pub fn new(results: ResultManager) -> Self {
        Self { results }
    }

    /// A change carrying a check-in payload is the terminal report
    /// delivery: the report and end time overwrite the row. Any other change
    /// is a status transition subject to the monotonic guard.
    ///
    /// Callers retry on error; repeated deliveries are harmless.
    #[instrument(skip(self, change), fields(status = %change.status))]
    pub async fn handle_job_hooks(&self, id: ResultId, change: &StatusChange) -> Result<()> {
        if !id.is_valid() {
            return Err(ScanError::Validation(format!("invalid scan result id {id}")));
        }
        if change.is_empty() {
            return Err(ScanError::Validation(format!(
                "empty status change for scan result {id}"
            )));
        }

        let Some(payload) = change.check_in_payload() else {
            self.results.update_status(id, &change.status).await?;
            return Ok(());
        };

        let mut row = self
            .results
            .get(id)
            .await?
            .ok_or_else(|| ScanError::NotFound(format!("scan result {id}")))?;
        row.report = payload.to_string();
        row.end_time = Some(Utc::now());
        if row.job_id.is_empty()
            && let Some(job_id) = change.job_id.as_deref()
        {
            row.job_id = job_id.to_string();
        }
        self.results.update(&row).await?;
        info!(%id, bytes = payload.len(), "scan report checked in");
        debug!(%id, status = %row.status, "report stored without status change");
        Ok(())
    }
}
