use std::{fmt, sync::Arc};

use scanplane_core::job::InProcJobRuntime;
use scanplane_core::ports::ProjectMetadata;
use scanplane_core::{AdapterRegistry, HookHandler, ResultManager, ScanController};

use crate::infra::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub controller: ScanController,
    pub registry: AdapterRegistry,
    pub results: ResultManager,
    pub hooks: HookHandler,
    pub projects: Arc<dyn ProjectMetadata>,
    pub runtime: Arc<InProcJobRuntime>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stops the job runtime; in-flight scans report `Stopped`.
    pub async fn shutdown(&self) {
        self.runtime.shutdown().await;
    }
}
