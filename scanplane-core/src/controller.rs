//! Entry point for scan requests: picks the adapter, claims the result row
//! and hands the work to the job runtime.

use std::fmt;
use std::sync::Arc;

use scanplane_model::{AdapterId, Artifact, Endpoint, ResultId, ScanRequest, ScanResult};
use tracing::{error, info, instrument, warn};

use crate::error::{Result, ScanError};
use crate::hook::scan_hook_url;
use crate::job::scan::scan_job_parameters;
use crate::job::{JobData, JobId, JobRuntime, SCAN_JOB_NAME};
use crate::ports::{PROJECT_SCANNER_KEY, ProjectMetadata, TokenIssuer};
use crate::registry::AdapterRegistry;
use crate::results::ResultManager;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Registry URL adapters pull image layers from.
    pub registry_url: String,
    /// Base URL the job runtime reaches this service's status hooks at.
    pub callback_base_url: String,
}

#[derive(Clone)]
pub struct ScanController {
    registry: AdapterRegistry,
    results: ResultManager,
    projects: Arc<dyn ProjectMetadata>,
    tokens: Arc<dyn TokenIssuer>,
    runtime: Arc<dyn JobRuntime>,
    config: ControllerConfig,
}

impl fmt::Debug for ScanController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanController")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ScanController {
    pub fn new(
        registry: AdapterRegistry,
        results: ResultManager,
        projects: Arc<dyn ProjectMetadata>,
        tokens: Arc<dyn TokenIssuer>,
        runtime: Arc<dyn JobRuntime>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            registry,
            results,
            projects,
            tokens,
            runtime,
            config,
        }
    }

    /// Starts a scan of `artifact` and returns the id of its result row.
    ///
    /// A conflict from an in-progress scan is returned unchanged. When the
    /// job cannot be submitted the placeholder is marked `Error` before the
    /// submission error is returned.
    #[instrument(skip(self, artifact), fields(digest = %artifact.digest, repository = %artifact.repository))]
    pub async fn scan(&self, artifact: &Artifact) -> Result<ResultId> {
        artifact.validate()?;
        let endpoint = self.resolve_adapter(artifact.namespace_id).await?;

        let mut placeholder =
            ScanResult::new(&artifact.digest, endpoint.id.clone(), &endpoint.adapter);
        let id = self.results.create(placeholder.clone()).await?;
        placeholder.id = id;

        match self.launch(id, &endpoint, artifact).await {
            Ok(job_id) => {
                info!(%id, %job_id, adapter = %endpoint.id, "scan job submitted");
                if let Err(err) = self.results.attach_job(id, &job_id.to_string()).await {
                    warn!(%id, error = %err, "could not record job id");
                }
                Ok(id)
            }
            Err(err) => {
                error!(%id, error = %err, "scan job submission failed");
                placeholder.fail();
                if let Err(update_err) = self.results.update(&placeholder).await {
                    return Err(ScanError::Internal(format!(
                        "{err}; additionally failed to mark scan result {id} as errored: {update_err}"
                    )));
                }
                Err(err)
            }
        }
    }

    /// The result row of the artifact's applicable adapter, if a scan was
    /// ever requested.
    #[instrument(skip(self, artifact), fields(digest = %artifact.digest))]
    pub async fn get_report(&self, artifact: &Artifact) -> Result<Option<ScanResult>> {
        artifact.validate()?;
        let endpoint = self.resolve_adapter(artifact.namespace_id).await?;
        self.results.get_by(&artifact.digest, &endpoint.id).await
    }

    /// The project's scanner override when it names a usable adapter,
    /// otherwise the enabled system default.
    pub async fn resolve_adapter(&self, namespace_id: i64) -> Result<Endpoint> {
        let metadata = self.projects.get(namespace_id).await?;
        if let Some(id) = metadata
            .get(PROJECT_SCANNER_KEY)
            .filter(|id| !id.trim().is_empty())
        {
            match self.registry.get(&AdapterId::from(id.as_str())).await? {
                Some(endpoint) if endpoint.is_enabled() => return Ok(endpoint),
                Some(_) => warn!(namespace_id, adapter = %id, "project scanner is disabled"),
                None => warn!(namespace_id, adapter = %id, "project scanner is not registered"),
            }
        }

        self.registry.default_endpoint().await?.ok_or_else(|| {
            ScanError::Configuration(
                "project level scanner and system default scanner are both not configured"
                    .into(),
            )
        })
    }

    async fn launch(&self, id: ResultId, endpoint: &Endpoint, artifact: &Artifact) -> Result<JobId> {
        let subject = format!("{}:{}", endpoint.adapter, endpoint.id);
        let token = self
            .tokens
            .issue_pull_token(&artifact.repository, &subject)
            .await?;

        let request = ScanRequest {
            registry_url: self.config.registry_url.clone(),
            registry_token: token,
            repository: artifact.repository.clone(),
            tag: artifact.tag.clone(),
            digest: artifact.digest.clone(),
        };

        self.runtime
            .submit(JobData {
                name: SCAN_JOB_NAME.to_string(),
                parameters: scan_job_parameters(endpoint, &request)?,
                status_hook: scan_hook_url(&self.config.callback_base_url, id),
            })
            .await
    }
}
