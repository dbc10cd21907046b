use chrono::{DateTime, Utc};

use crate::error::{Result, require};
use crate::ids::AdapterId;

/// A registered scanner adapter: where it lives, how to authenticate to it
/// and whether it is the system default.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct Endpoint {
    #[cfg_attr(feature = "serde", serde(rename = "uid", default))]
    pub id: AdapterId,
    pub url: String,
    /// Auth mode name; empty means no authorization header.
    #[cfg_attr(feature = "serde", serde(default))]
    pub auth: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub access_credential: String,
    /// Vendor name of the adapter, e.g. `trivy`.
    pub adapter: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub disabled: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_default: bool,
    #[cfg_attr(feature = "serde", serde(default = "Utc::now"))]
    pub create_time: DateTime<Utc>,
    #[cfg_attr(feature = "serde", serde(default = "Utc::now"))]
    pub update_time: DateTime<Utc>,
}

impl Endpoint {
    pub fn new(
        id: impl Into<AdapterId>,
        url: impl Into<String>,
        adapter: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Endpoint {
            id: id.into(),
            url: url.into(),
            auth: String::new(),
            access_credential: String::new(),
            adapter: adapter.into(),
            disabled: false,
            is_default: false,
            create_time: now,
            update_time: now,
        }
    }

    pub fn with_auth(
        mut self,
        auth: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        self.auth = auth.into();
        self.access_credential = credential.into();
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    /// Full validation for an already registered endpoint.
    pub fn validate(&self) -> Result<()> {
        require("endpoint id", self.id.as_str())?;
        self.validate_for_create()
    }

    /// Validation before registration, when the id is not assigned yet.
    pub fn validate_for_create(&self) -> Result<()> {
        require("endpoint url", &self.url)?;
        require("adapter name", &self.adapter)?;
        Ok(())
    }
}
