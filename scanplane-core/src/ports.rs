//! Collaborators the orchestration core consults but does not own.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, ScanError};

/// Project metadata key holding the id of a project's scanner override.
pub const PROJECT_SCANNER_KEY: &str = "projectScanner";

/// Per-project key/value configuration.
#[async_trait]
pub trait ProjectMetadata: Send + Sync {
    async fn get(&self, namespace_id: i64) -> Result<HashMap<String, String>>;

    async fn set(&self, namespace_id: i64, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, namespace_id: i64, key: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryProjectMetadata {
    inner: Arc<RwLock<HashMap<i64, HashMap<String, String>>>>,
}

impl InMemoryProjectMetadata {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectMetadata for InMemoryProjectMetadata {
    async fn get(&self, namespace_id: i64) -> Result<HashMap<String, String>> {
        let guard = self.inner.read().await;
        Ok(guard.get(&namespace_id).cloned().unwrap_or_default())
    }

    async fn set(&self, namespace_id: i64, key: &str, value: &str) -> Result<()> {
        if namespace_id <= 0 {
            return Err(ScanError::Validation(format!(
                "invalid namespace id {namespace_id}"
            )));
        }
        let mut guard = self.inner.write().await;
        guard
            .entry(namespace_id)
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, namespace_id: i64, key: &str) -> Result<()> {
        let mut guard = self.inner.write().await;
        if let Some(entries) = guard.get_mut(&namespace_id) {
            entries.remove(key);
        }
        Ok(())
    }
}

/// Mints the short-lived pull credential handed to an adapter.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// `subject` identifies the adapter the token is issued to.
    async fn issue_pull_token(&self, repository: &str, subject: &str) -> Result<String>;
}

/// Hands out one pre-provisioned registry token for every request.
#[derive(Clone)]
pub struct StaticTokenIssuer {
    token: String,
}

impl fmt::Debug for StaticTokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenIssuer").finish_non_exhaustive()
    }
}

impl StaticTokenIssuer {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ScanError::Configuration(
                "registry pull token is empty".into(),
            ));
        }
        Ok(Self { token })
    }
}

#[async_trait]
impl TokenIssuer for StaticTokenIssuer {
    async fn issue_pull_token(&self, repository: &str, subject: &str) -> Result<String> {
        debug!(repository, subject, "issuing static pull token");
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn project_keys_are_scoped_per_namespace() {
        let metadata = InMemoryProjectMetadata::new();
        metadata.set(1, PROJECT_SCANNER_KEY, "trivy-1").await.unwrap();

        let project = metadata.get(1).await.unwrap();
        assert_eq!(project.get(PROJECT_SCANNER_KEY).map(String::as_str), Some("trivy-1"));
        assert!(metadata.get(2).await.unwrap().is_empty());

        metadata.remove(1, PROJECT_SCANNER_KEY).await.unwrap();
        assert!(metadata.get(1).await.unwrap().is_empty());
        assert!(metadata.set(0, PROJECT_SCANNER_KEY, "x").await.is_err());
    }

    #[tokio::test]
    async fn static_issuer_requires_a_token() {
        assert!(matches!(
            StaticTokenIssuer::new(" "),
            Err(ScanError::Configuration(_))
        ));
        let issuer = StaticTokenIssuer::new("pull").unwrap();
        assert_eq!(
            issuer.issue_pull_token("library/alpine", "trivy:1").await.unwrap(),
            "pull"
        );
    }
}
