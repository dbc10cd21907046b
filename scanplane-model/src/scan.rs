use crate::error::{Result, require};

/// Body of the adapter's submit-scan call.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanRequest {
    pub registry_url: String,
    /// Short-lived pull-scoped token the adapter uses to fetch layers.
    pub registry_token: String,
    pub repository: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub tag: String,
    pub digest: String,
}

impl ScanRequest {
    pub fn validate(&self) -> Result<()> {
        require("registry url", &self.registry_url)?;
        require("registry token", &self.registry_token)?;
        require("repository", &self.repository)?;
        require("digest", &self.digest)?;
        Ok(())
    }
}

/// Adapter reply to an accepted scan.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanResponse {
    pub details_key: String,
}
