//! Data model shared by the scanplane crates: artifacts, scanner adapter
//! endpoints, persisted scan results and the adapter wire types.
#![allow(missing_docs)]

pub use ::chrono;

pub mod artifact;
pub mod endpoint;
pub mod error;
pub mod hook;
pub mod ids;
pub mod report;
pub mod result;
pub mod scan;
pub mod status;

pub use artifact::Artifact;
pub use endpoint::Endpoint;
pub use error::{ModelError, Result as ModelResult};
pub use hook::StatusChange;
pub use ids::{AdapterId, ResultId};
pub use report::{
    ComponentsOverview, ReportStatus, ScanReport, Severity, SeverityCount,
    VulnerabilityItem,
};
pub use result::ScanResult;
pub use scan::{ScanRequest, ScanResponse};
pub use status::ScanStatus;
