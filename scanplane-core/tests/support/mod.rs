#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scanplane_core::client::{AdapterClient, AdapterClientFactory, AdapterMetadata};
use scanplane_core::job::{
    InProcJobRuntime, Job, LocalHookSender, RuntimeConfig, SCAN_JOB_NAME, ScanJob, ScanJobConfig,
    StatusHookSender,
};
use scanplane_core::model::{
    Artifact, Endpoint, ResultId, ScanReport, ScanRequest, ScanResponse, ScanResult, Severity,
    StatusChange,
};
use scanplane_core::ports::{InMemoryProjectMetadata, StaticTokenIssuer};
use scanplane_core::store::InMemoryAdapterStore;
use scanplane_core::{
    AdapterRegistry, ControllerConfig, HookHandler, Result, ResultManager, ScanController,
    ScanError,
};

/// Adapter that accepts every scan under `k1` and grades the report after
/// `ready_after` polls; `None` never grades it.
pub struct StubAdapter {
    pub ready_after: Option<u32>,
    pub severity: Severity,
    pub polls: AtomicU32,
    pub scans: AtomicU32,
}

impl StubAdapter {
    pub fn ready_after(polls: u32) -> Self {
        Self {
            ready_after: Some(polls),
            severity: Severity::High,
            polls: AtomicU32::new(0),
            scans: AtomicU32::new(0),
        }
    }

    pub fn never_ready() -> Self {
        Self {
            ready_after: None,
            ..Self::ready_after(0)
        }
    }
}

#[async_trait]
impl AdapterClient for StubAdapter {
    async fn check_health(&self) -> Result<()> {
        Ok(())
    }

    async fn metadata(&self) -> Result<AdapterMetadata> {
        Ok(AdapterMetadata {
            name: "stub".into(),
            vendor: "scanplane".into(),
            version: "1.0".into(),
            capabilities: Vec::new(),
        })
    }

    async fn scan(&self, _request: &ScanRequest) -> Result<ScanResponse> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        Ok(ScanResponse {
            details_key: "k1".into(),
        })
    }

    async fn get_report(&self, _details_key: &str) -> Result<ScanReport> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let graded = self.ready_after.is_some_and(|after| polls >= after);
        Ok(ScanReport {
            severity: graded.then_some(self.severity),
            ..ScanReport::default()
        })
    }
}

pub struct StubFactory(pub Arc<StubAdapter>);

impl AdapterClientFactory for StubFactory {
    fn client_for(&self, _endpoint: &Endpoint) -> Result<Arc<dyn AdapterClient>> {
        Ok(self.0.clone())
    }
}

/// Records every change before handing it to the in-process hook handler.
pub struct RecordingHooks {
    inner: LocalHookSender,
    pub changes: Mutex<Vec<StatusChange>>,
}

impl RecordingHooks {
    pub fn statuses(&self) -> Vec<String> {
        self.changes
            .lock()
            .unwrap()
            .iter()
            .map(|change| match change.check_in_payload() {
                Some(_) => "CheckIn".to_string(),
                None => change.status.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl StatusHookSender for RecordingHooks {
    async fn deliver(&self, hook_url: &str, change: &StatusChange) -> Result<()> {
        self.changes.lock().unwrap().push(change.clone());
        self.inner.deliver(hook_url, change).await
    }
}

/// A status hook endpoint that refuses every connection.
pub struct UnreachableHooks;

#[async_trait]
impl StatusHookSender for UnreachableHooks {
    async fn deliver(&self, hook_url: &str, _change: &StatusChange) -> Result<()> {
        Err(ScanError::HookDelivery(format!("{hook_url}: connection refused")))
    }
}

pub struct Harness {
    pub controller: ScanController,
    pub registry: AdapterRegistry,
    pub results: ResultManager,
    pub runtime: Arc<InProcJobRuntime>,
    pub hooks: Arc<RecordingHooks>,
    pub adapter: Arc<StubAdapter>,
}

impl Harness {
    pub async fn new(adapter: StubAdapter) -> Self {
        Self::build(adapter, false).await
    }

    /// Hooks never reach the handler; `hooks` records what the in-process
    /// fallback applied instead.
    pub async fn with_unreachable_hooks(adapter: StubAdapter) -> Self {
        Self::build(adapter, true).await
    }

    async fn build(adapter: StubAdapter, unreachable: bool) -> Self {
        let adapter = Arc::new(adapter);
        let clients: Arc<dyn AdapterClientFactory> = Arc::new(StubFactory(adapter.clone()));
        let adapters = InMemoryAdapterStore::new();
        let results = ResultManager::new(Arc::new(adapters.results()));
        let registry = AdapterRegistry::new(Arc::new(adapters), clients.clone());
        registry
            .create(Endpoint::new("trivy-1", "http://trivy:8080", "trivy").as_default())
            .await
            .unwrap();

        let hooks = Arc::new(RecordingHooks {
            inner: LocalHookSender::new(HookHandler::new(results.clone())),
            changes: Mutex::new(Vec::new()),
        });
        let mut jobs: HashMap<String, Arc<dyn Job>> = HashMap::new();
        jobs.insert(
            SCAN_JOB_NAME.to_string(),
            Arc::new(ScanJob::new(clients, ScanJobConfig::default())),
        );
        let runtime = Arc::new(if unreachable {
            InProcJobRuntime::start_with_fallback(
                RuntimeConfig::default(),
                jobs,
                Arc::new(UnreachableHooks),
                hooks.clone(),
            )
        } else {
            InProcJobRuntime::start(RuntimeConfig::default(), jobs, hooks.clone())
        });

        let controller = ScanController::new(
            registry.clone(),
            results.clone(),
            Arc::new(InMemoryProjectMetadata::new()),
            Arc::new(StaticTokenIssuer::new("pull-token").unwrap()),
            runtime.clone(),
            ControllerConfig {
                registry_url: "https://registry.local".into(),
                callback_base_url: "http://core:8080".into(),
            },
        );

        Self {
            controller,
            registry,
            results,
            runtime,
            hooks,
            adapter,
        }
    }

    /// Waits, in steps of virtual or real time, until the row is terminal.
    pub async fn wait_for_terminal(&self, id: ResultId) -> ScanResult {
        for _ in 0..2_000 {
            if let Some(row) = self.results.get(id).await.unwrap()
                && row.status.is_terminal()
            {
                return row;
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        panic!("scan result {id} never reached a terminal status");
    }
}

pub fn artifact_with_digest(digest: &str) -> Artifact {
    Artifact {
        digest: digest.to_string(),
        ..artifact()
    }
}

pub fn artifact() -> Artifact {
    Artifact {
        namespace_id: 1,
        namespace: "library".into(),
        repository: "library/alpine".into(),
        tag: "3.20".into(),
        digest: "sha256:abc".into(),
        kind: "application/vnd.oci.image.manifest.v1+json".into(),
    }
}
