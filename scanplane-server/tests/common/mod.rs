// Code is used by test modules, but not in every scope
#![allow(unused)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum_test::TestServer;
use serde_json::{Value, json};

use scanplane_core::Result;
use scanplane_core::client::{AdapterClient, AdapterClientFactory, AdapterMetadata};
use scanplane_core::model::{
    Endpoint, ScanReport, ScanRequest, ScanResponse, Severity, VulnerabilityItem,
};
use scanplane_server::infra::config::{Config, ConfigLoader};
use scanplane_server::infra::config::sources::EnvConfig;
use scanplane_server::infra::startup::{Collaborators, build_state};
use scanplane_server::{AppState, create_app};

/// Grades the report after `ready_after` polls; `None` never grades it.
#[derive(Debug)]
pub struct StubAdapter {
    ready_after: Option<u32>,
    polls: AtomicU32,
}

impl StubAdapter {
    pub fn ready_after(polls: u32) -> Arc<Self> {
        Arc::new(Self {
            ready_after: Some(polls),
            polls: AtomicU32::new(0),
        })
    }

    pub fn never_ready() -> Arc<Self> {
        Arc::new(Self {
            ready_after: None,
            polls: AtomicU32::new(0),
        })
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
        Ok(ScanResponse {
            details_key: "k1".into(),
        })
    }

    async fn get_report(&self, _details_key: &str) -> Result<ScanReport> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.ready_after.is_some_and(|after| polls >= after) {
            return Ok(ScanReport::default());
        }
        Ok(ScanReport {
            severity: Some(Severity::High),
            vulnerabilities: vec![VulnerabilityItem {
                id: "CVE-2024-0001".into(),
                severity: Severity::High,
                package: "openssl".into(),
                version: "3.0.1".into(),
                description: "buffer overflow".into(),
                link: "https://nvd.nist.gov/vuln/detail/CVE-2024-0001".into(),
                fixed_version: Some("3.0.2".into()),
            }],
            ..ScanReport::default()
        })
    }
}

#[derive(Debug)]
pub struct StubClients(pub Arc<StubAdapter>);

impl AdapterClientFactory for StubClients {
    fn client_for(&self, _endpoint: &Endpoint) -> Result<Arc<dyn AdapterClient>> {
        Ok(self.0.clone())
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
}

impl TestApp {
    pub async fn shutdown(self) {
        self.state.shutdown().await;
    }
}

/// Fast poll loop and in-process hook delivery; `overrides` replace or add
/// environment values.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let vars: HashMap<String, String> = [
        ("REGISTRY_EXTERNAL_URL", "https://registry.local"),
        ("REGISTRY_TOKEN", "pull-token"),
        ("HOOK_TRANSPORT", "local"),
        ("SCAN_POLL_INTERVAL", "20ms"),
        ("SCAN_TIMEOUT", "1m"),
        ("HOOK_RETRY_DELAY", "10ms"),
        ("JOB_RETRY_BACKOFF", "10ms"),
    ]
    .into_iter()
    .chain(overrides.iter().copied())
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    ConfigLoader::new()
        .load_with_env(EnvConfig::from_lookup(move |name| vars.get(name).cloned()))
        .expect("test configuration loads")
        .config
}

pub fn build_state_with(adapter: Arc<StubAdapter>, overrides: &[(&str, &str)]) -> AppState {
    let collaborators = Collaborators::in_memory(Arc::new(StubClients(adapter)));
    build_state(Arc::new(test_config(overrides)), collaborators).expect("state builds")
}

/// In-memory stores, in-process hook delivery and a fast poll loop.
pub fn build_test_app(adapter: Arc<StubAdapter>) -> TestApp {
    let state = build_state_with(adapter, &[]);
    let server = TestServer::new(create_app(state.clone())).expect("test server starts");
    TestApp { server, state }
}

pub fn adapter_body(url: &str, is_default: bool) -> Value {
    json!({
        "url": url,
        "adapter": "trivy",
        "auth": "Bearer",
        "accessCredential": "adapter-secret",
        "isDefault": is_default,
    })
}

pub fn artifact_body() -> Value {
    json!({
        "namespace_id": 1,
        "namespace": "library",
        "repository": "library/alpine",
        "tag": "3.20",
        "digest": "sha256:abc",
        "kind": "application/vnd.oci.image.manifest.v1+json",
    })
}

pub const REPORT_QUERY: &str = "/api/v1/scan/report?namespace_id=1&namespace=library\
&repository=library%2Falpine&tag=3.20&digest=sha256%3Aabc\
&kind=application%2Fvnd.oci.image.manifest.v1%2Bjson";

/// Polls the report endpoint until the row reaches `status`.
pub async fn wait_for_status(server: &TestServer, status: &str) -> Value {
    for _ in 0..250 {
        let response = server.get(REPORT_QUERY).await;
        if response.status_code().is_success() {
            let body: Value = response.json();
            if body["status"] == status {
                return body;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("scan never reached {status}");
}
