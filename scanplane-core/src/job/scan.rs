//! The scan job: submit an artifact to its adapter, poll for the report and
//! check the report in.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scanplane_model::{Endpoint, ScanReport, ScanRequest};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Level, debug, enabled, info, instrument};

use super::{Job, JobContext, JobParameters};
use crate::client::{AdapterClient, AdapterClientFactory};
use crate::error::{Result, ScanError};

pub const SCAN_JOB_NAME: &str = "IMAGE_SCAN";
pub const ENDPOINT_PARAM: &str = "endpoint";
pub const SCAN_REQUEST_PARAM: &str = "scanRequest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanJobConfig {
    pub poll_interval: Duration,
    /// Overall bound on waiting for the report, per attempt.
    pub timeout: Duration,
    pub max_fails: u32,
}

impl Default for ScanJobConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30 * 60),
            max_fails: 3,
        }
    }
}

/// Encodes the job parameters for scanning `request` with `endpoint`.
pub fn scan_job_parameters(
    endpoint: &Endpoint,
    request: &ScanRequest,
) -> Result<JobParameters> {
    let mut parameters = JobParameters::new();
    parameters.insert(ENDPOINT_PARAM.to_string(), serde_json::to_string(endpoint)?);
    parameters.insert(SCAN_REQUEST_PARAM.to_string(), serde_json::to_string(request)?);
    Ok(parameters)
}

fn decode_parameters(parameters: &JobParameters) -> Result<(Endpoint, ScanRequest)> {
    let raw = |key: &str| {
        parameters
            .get(key)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ScanError::Validation(format!("missing job parameter '{key}'")))
    };

    let endpoint: Endpoint = serde_json::from_str(raw(ENDPOINT_PARAM)?).map_err(|e| {
        ScanError::Validation(format!("malformed job parameter '{ENDPOINT_PARAM}': {e}"))
    })?;
    endpoint.validate()?;

    let request: ScanRequest = serde_json::from_str(raw(SCAN_REQUEST_PARAM)?).map_err(|e| {
        ScanError::Validation(format!("malformed job parameter '{SCAN_REQUEST_PARAM}': {e}"))
    })?;
    request.validate()?;

    Ok((endpoint, request))
}

pub struct ScanJob {
    clients: Arc<dyn AdapterClientFactory>,
    config: ScanJobConfig,
}

impl fmt::Debug for ScanJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanJob")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ScanJob {
    pub fn new(clients: Arc<dyn AdapterClientFactory>, config: ScanJobConfig) -> Self {
        Self { clients, config }
    }

    /// Polls every `poll_interval` until the report is ready, racing an
    /// absolute deadline. The first poll happens one interval after the
    /// scan was accepted.
    async fn await_report(
        &self,
        client: &dyn AdapterClient,
        details_key: &str,
    ) -> Result<ScanReport> {
        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.config.poll_interval,
            self.config.poll_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = tokio::time::sleep(self.config.timeout);
        tokio::pin!(deadline);

        let mut polls = 0u32;
        loop {
            tokio::select! {
                biased;
                _ = &mut deadline => {
                    return Err(ScanError::Timeout(format!(
                        "report {details_key} not ready after {polls} polls in {:?}",
                        self.config.timeout
                    )));
                }
                _ = ticker.tick() => {
                    polls += 1;
                    let report = client.get_report(details_key).await?;
                    if report.has_failed() {
                        return Err(ScanError::adapter(
                            None,
                            format!("adapter reported failure for {details_key}"),
                        ));
                    }
                    if report.is_ready() {
                        debug!(polls, "report ready");
                        return Ok(report);
                    }
                    debug!(polls, "report not ready yet");
                }
            }
        }
    }
}

#[async_trait]
impl Job for ScanJob {
    fn max_fails(&self) -> u32 {
        self.config.max_fails
    }

    fn should_retry(&self) -> bool {
        true
    }

    fn validate(&self, parameters: &JobParameters) -> Result<()> {
        decode_parameters(parameters).map(|_| ())
    }

    #[instrument(skip_all, fields(job_id = %ctx.job_id()))]
    async fn run(&self, ctx: &JobContext, parameters: &JobParameters) -> Result<()> {
        let (endpoint, request) = decode_parameters(parameters)?;
        info!(
            adapter = %endpoint.adapter,
            endpoint = %endpoint.id,
            repository = %request.repository,
            digest = %request.digest,
            "starting scan"
        );

        let client = self.clients.client_for(&endpoint)?;
        let response = client.scan(&request).await?;
        if response.details_key.trim().is_empty() {
            return Err(ScanError::adapter(None, "scan accepted without a details key"));
        }
        debug!(details_key = %response.details_key, "scan accepted");

        let report = self.await_report(client.as_ref(), &response.details_key).await?;
        let payload = serde_json::to_string(&report)?;
        if enabled!(Level::DEBUG) {
            let pretty = serde_json::to_string_pretty(&report)?;
            debug!("scan report:\n{pretty}");
        }

        ctx.check_in(payload).await?;
        info!(severity = ?report.severity, "scan report checked in");
        Ok(())
    }
}
