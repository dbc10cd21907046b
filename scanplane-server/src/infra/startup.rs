use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use tracing::info;

use scanplane_core::client::{AdapterClientFactory, HttpAdapterClientFactory};
use scanplane_core::job::{
    HttpHookSender, InProcJobRuntime, Job, LocalHookSender, SCAN_JOB_NAME, ScanJob,
    StatusHookSender,
};
use scanplane_core::ports::{InMemoryProjectMetadata, ProjectMetadata, StaticTokenIssuer};
use scanplane_core::store::{AdapterStore, InMemoryAdapterStore, ResultStore};
use scanplane_core::{
    AdapterRegistry, ControllerConfig, HookHandler, ResultManager, ScanController,
};

use crate::infra::app_state::AppState;
use crate::infra::config::{Config, HookTransport};

/// Storage and outbound clients the services are built on.
pub struct Collaborators {
    pub results: Arc<dyn ResultStore>,
    pub adapters: Arc<dyn AdapterStore>,
    pub projects: Arc<dyn ProjectMetadata>,
    pub clients: Arc<dyn AdapterClientFactory>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

impl Collaborators {
    pub fn in_memory(clients: Arc<dyn AdapterClientFactory>) -> Self {
        let adapters = InMemoryAdapterStore::new();
        Self {
            results: Arc::new(adapters.results()),
            adapters: Arc::new(adapters),
            projects: Arc::new(InMemoryProjectMetadata::new()),
            clients,
        }
    }

    /// HTTP adapter clients plus Postgres stores when a database URL is
    /// configured and the `postgres` feature is on, in-memory stores
    /// otherwise.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let clients: Arc<dyn AdapterClientFactory> = Arc::new(
            HttpAdapterClientFactory::new(&config.adapter_client)
                .context("failed to build adapter HTTP client")?,
        );

        #[cfg(feature = "postgres")]
        if let Some(url) = config.database.url.as_deref() {
            use scanplane_core::store::{PostgresAdapterStore, PostgresResultStore};

            let pool = sqlx::PgPool::connect(url)
                .await
                .context("failed to connect to PostgreSQL")?;
            PostgresAdapterStore::migrate(&pool)
                .await
                .context("database migration failed")?;
            info!("using PostgreSQL stores");
            return Ok(Self {
                results: Arc::new(PostgresResultStore::new(pool.clone())),
                adapters: Arc::new(PostgresAdapterStore::new(pool)),
                projects: Arc::new(InMemoryProjectMetadata::new()),
                clients,
            });
        }

        info!("using in-memory stores");
        Ok(Self::in_memory(clients))
    }
}

/// Wires the orchestration services and starts the job runtime. Must be
/// called inside a tokio runtime.
pub fn build_state(config: Arc<Config>, collaborators: Collaborators) -> Result<AppState> {
    let Collaborators {
        results,
        adapters,
        projects,
        clients,
    } = collaborators;

    let results = ResultManager::new(results);
    let registry = AdapterRegistry::new(adapters, clients.clone());
    let hooks = HookHandler::new(results.clone());

    let local: Arc<dyn StatusHookSender> = Arc::new(LocalHookSender::new(hooks.clone()));

    let mut jobs: HashMap<String, Arc<dyn Job>> = HashMap::new();
    jobs.insert(
        SCAN_JOB_NAME.to_string(),
        Arc::new(ScanJob::new(clients, config.scan_job.clone())),
    );
    // Over HTTP, terminal statuses the hook endpoint never accepted are
    // applied in-process.
    let runtime = Arc::new(match config.callback.transport {
        HookTransport::Http => InProcJobRuntime::start_with_fallback(
            config.runtime.clone(),
            jobs,
            Arc::new(
                HttpHookSender::new(config.adapter_client.request_timeout)
                    .context("failed to build status hook client")?,
            ),
            local,
        ),
        HookTransport::Local => InProcJobRuntime::start(config.runtime.clone(), jobs, local),
    });

    let tokens = Arc::new(
        StaticTokenIssuer::new(config.registry.token.clone())
            .context("registry token is not usable")?,
    );
    let controller = ScanController::new(
        registry.clone(),
        results.clone(),
        projects.clone(),
        tokens,
        runtime.clone(),
        ControllerConfig {
            registry_url: config.registry.external_url.clone(),
            callback_base_url: config.callback.internal_base_url.clone(),
        },
    );

    info!(
        workers = config.runtime.workers,
        transport = ?config.callback.transport,
        "scan orchestration ready"
    );

    Ok(AppState {
        config,
        controller,
        registry,
        results,
        hooks,
        projects,
        runtime,
    })
}
