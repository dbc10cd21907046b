use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use scanplane_model::{Endpoint, ScanReport, ScanRequest, ScanResponse};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::auth::{Authorizer, authorizer_for};
use super::spec::ApiSpec;
use super::{AdapterClient, AdapterClientFactory, AdapterMetadata};
use crate::error::{Result, ScanError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub request_timeout: Duration,
    /// Skips TLS verification. Adapters behind self-signed certificates
    /// need it; the registry pull token is sent to them either way.
    pub accept_invalid_certs: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
        }
    }
}

impl ClientOptions {
    pub fn build_http(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(self.request_timeout)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()?)
    }
}

pub struct HttpAdapterClient {
    http: reqwest::Client,
    spec: ApiSpec,
    authorizer: Box<dyn Authorizer>,
}

impl fmt::Debug for HttpAdapterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpAdapterClient")
            .field("root", &self.spec.health().as_str())
            .field("auth", &self.authorizer.mode())
            .finish()
    }
}

impl HttpAdapterClient {
    pub fn new(http: reqwest::Client, endpoint: &Endpoint) -> Result<Self> {
        Ok(Self {
            http,
            spec: ApiSpec::new(&endpoint.url)?,
            authorizer: authorizer_for(&endpoint.auth, &endpoint.access_credential)?,
        })
    }

    async fn send(
        &self,
        request: RequestBuilder,
        expected: StatusCode,
        action: &str,
    ) -> Result<Vec<u8>> {
        let response = self.authorizer.authorize(request).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if status != expected {
            let text = String::from_utf8_lossy(&body);
            return Err(ScanError::adapter(
                Some(status.as_u16()),
                format!(
                    "{action}: unexpected status code {}, expected {}, text: {}",
                    status.as_u16(),
                    expected.as_u16(),
                    text.trim()
                ),
            ));
        }
        debug!(%status, bytes = body.len(), "{action} succeeded");
        Ok(body.to_vec())
    }

    fn decode<T: DeserializeOwned>(body: &[u8], action: &str) -> Result<T> {
        serde_json::from_slice(body).map_err(|e| {
            ScanError::adapter(None, format!("{action}: malformed response: {e}"))
        })
    }
}

#[async_trait]
impl AdapterClient for HttpAdapterClient {
    #[instrument(skip(self), fields(root = %self.spec.health()))]
    async fn check_health(&self) -> Result<()> {
        self.send(self.http.get(self.spec.health()), StatusCode::OK, "check health")
            .await?;
        Ok(())
    }

    async fn metadata(&self) -> Result<AdapterMetadata> {
        Err(ScanError::Validation(format!(
            "adapter metadata ({}) is not implemented",
            self.spec.metadata()
        )))
    }

    #[instrument(skip(self, request), fields(digest = %request.digest))]
    async fn scan(&self, request: &ScanRequest) -> Result<ScanResponse> {
        request.validate()?;
        let body = self
            .send(
                self.http.post(self.spec.scan()).json(request),
                StatusCode::CREATED,
                "scan",
            )
            .await?;
        Self::decode(&body, "scan")
    }

    #[instrument(skip(self))]
    async fn get_report(&self, details_key: &str) -> Result<ScanReport> {
        if details_key.trim().is_empty() {
            return Err(ScanError::Validation("empty details key".into()));
        }
        let body = self
            .send(
                self.http.get(self.spec.report(details_key)),
                StatusCode::OK,
                "get report",
            )
            .await?;
        Self::decode(&body, "get report")
    }
}

/// Shares one connection pool across every endpoint's client.
#[derive(Debug, Clone)]
pub struct HttpAdapterClientFactory {
    http: reqwest::Client,
}

impl HttpAdapterClientFactory {
    pub fn new(options: &ClientOptions) -> Result<Self> {
        Ok(Self {
            http: options.build_http()?,
        })
    }
}

impl AdapterClientFactory for HttpAdapterClientFactory {
    fn client_for(&self, endpoint: &Endpoint) -> Result<Arc<dyn AdapterClient>> {
        Ok(Arc::new(HttpAdapterClient::new(self.http.clone(), endpoint)?))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use scanplane_model::Severity;
    use serde_json::{Value, json};

    use super::*;

    #[derive(Clone, Default)]
    struct Adapter {
        polls: Arc<AtomicUsize>,
    }

    async fn health() -> AxumStatus {
        AxumStatus::OK
    }

    async fn submit(
        headers: HeaderMap,
        Json(request): Json<ScanRequest>,
    ) -> (AxumStatus, Json<Value>) {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer adapter-secret");
        if !authorized {
            return (AxumStatus::UNAUTHORIZED, Json(json!({"error": "denied"})));
        }
        assert_eq!(request.digest, "sha256:abc");
        (AxumStatus::CREATED, Json(json!({"details_key": "k1"})))
    }

    async fn report(
        State(adapter): State<Adapter>,
        Path(key): Path<String>,
    ) -> (AxumStatus, Json<Value>) {
        if key != "k1" {
            return (AxumStatus::NOT_FOUND, Json(json!({"error": "unknown key"})));
        }
        let polls = adapter.polls.fetch_add(1, Ordering::SeqCst);
        if polls == 0 {
            (AxumStatus::OK, Json(json!({"severity": 0})))
        } else {
            (
                AxumStatus::OK,
                Json(json!({
                    "severity": "HIGH",
                    "overview": {"total": 1, "summary": [{"severity": 5, "count": 1}]},
                    "vulnerabilities": [{
                        "id": "CVE-2024-0001", "severity": 5, "package": "openssl",
                        "version": "3.0.1", "description": "", "link": ""
                    }]
                })),
            )
        }
    }

    async fn spawn_adapter() -> String {
        let router = Router::new()
            .route("/api/v1", get(health))
            .route("/api/v1/scan", post(submit))
            .route("/api/v1/scan/{key}", get(report))
            .with_state(Adapter::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(url: &str, token: &str) -> Arc<dyn AdapterClient> {
        let endpoint =
            Endpoint::new("trivy-1", url, "trivy").with_auth("Bearer", token);
        HttpAdapterClientFactory::new(&ClientOptions::default())
            .unwrap()
            .client_for(&endpoint)
            .unwrap()
    }

    fn request() -> ScanRequest {
        ScanRequest {
            registry_url: "https://registry.local".into(),
            registry_token: "pull-token".into(),
            repository: "library/alpine".into(),
            tag: "3.20".into(),
            digest: "sha256:abc".into(),
        }
    }

    #[tokio::test]
    async fn scan_then_poll_report_until_graded() {
        let url = spawn_adapter().await;
        let client = client(&url, "adapter-secret");

        client.check_health().await.unwrap();
        let response = client.scan(&request()).await.unwrap();
        assert_eq!(response.details_key, "k1");

        let first = client.get_report("k1").await.unwrap();
        assert!(!first.is_ready());
        let second = client.get_report("k1").await.unwrap();
        assert!(second.is_ready());
        assert_eq!(second.severity, Some(Severity::High));
        assert_eq!(second.vulnerabilities.len(), 1);
    }

    #[tokio::test]
    async fn unexpected_status_carries_body_text() {
        let url = spawn_adapter().await;
        let client = client(&url, "wrong");

        let err = client.scan(&request()).await.unwrap_err();
        match err {
            ScanError::Adapter { status, message } => {
                assert_eq!(status, Some(401));
                assert!(message.contains("denied"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = client.get_report("missing").await.unwrap_err();
        assert!(matches!(err, ScanError::Adapter { status: Some(404), .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unreachable_adapter_is_a_network_error() {
        let client = client("http://127.0.0.1:9", "adapter-secret");
        assert!(matches!(
            client.check_health().await,
            Err(ScanError::Network(_))
        ));
    }

    #[tokio::test]
    async fn metadata_is_not_implemented_and_empty_key_is_rejected() {
        let client = client("http://127.0.0.1:9", "adapter-secret");
        assert!(matches!(client.metadata().await, Err(ScanError::Validation(_))));
        assert!(matches!(
            client.get_report(" ").await,
            Err(ScanError::Validation(_))
        ));
    }
}
