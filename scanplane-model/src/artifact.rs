use crate::error::{Result, require};
use crate::error::ModelError;

/// The image manifest a scan is requested for. `digest` is the correlation
/// key for result rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Artifact {
    pub namespace_id: i64,
    pub namespace: String,
    pub repository: String,
    pub tag: String,
    pub digest: String,
    pub kind: String,
}

impl Artifact {
    pub fn validate(&self) -> Result<()> {
        if self.namespace_id <= 0 {
            return Err(ModelError::Invalid(format!(
                "namespace id must be positive, got {}",
                self.namespace_id
            )));
        }
        require("namespace", &self.namespace)?;
        require("repository", &self.repository)?;
        require("tag", &self.tag)?;
        require("digest", &self.digest)?;
        require("kind", &self.kind)?;
        Ok(())
    }
}
