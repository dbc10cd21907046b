use url::Url;

use crate::error::{Result, ScanError};

const API_PREFIX: &str = "/api/v1";
const FALLBACK_BASE: &str = "http://localhost";

/// URL layout of the v1 adapter REST protocol rooted at an endpoint's base
/// URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSpec {
    root: Url,
}

impl ApiSpec {
    /// An empty base falls back to `http://localhost`.
    pub fn new(base: &str) -> Result<Self> {
        let base = base.trim().trim_end_matches('/');
        let base = if base.is_empty() { FALLBACK_BASE } else { base };
        let root = Url::parse(&format!("{base}{API_PREFIX}")).map_err(|e| {
            ScanError::Validation(format!("invalid adapter url '{base}': {e}"))
        })?;
        Ok(Self { root })
    }

    pub fn health(&self) -> Url {
        self.root.clone()
    }

    pub fn metadata(&self) -> Url {
        self.join(&["metadata"])
    }

    pub fn scan(&self) -> Url {
        self.join(&["scan"])
    }

    /// The details key is percent-encoded as a single path segment.
    pub fn report(&self, details_key: &str) -> Url {
        self.join(&["scan", details_key])
    }

    fn join(&self, segments: &[&str]) -> Url {
        let mut url = self.root.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}
