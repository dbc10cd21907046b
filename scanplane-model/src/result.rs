use chrono::{DateTime, Utc};

use crate::ids::{AdapterId, ResultId};
use crate::status::ScanStatus;

/// The latest scan attempt for one (digest, adapter) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct ScanResult {
    pub id: ResultId,
    pub digest: String,
    pub adapter_id: AdapterId,
    /// Vendor name of the adapter that produced the row.
    pub vendor: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub job_id: String,
    pub status: ScanStatus,
    pub status_code: i32,
    /// Serialized report delivered by the job's check-in.
    #[cfg_attr(feature = "serde", serde(default))]
    pub report: String,
    pub start_time: DateTime<Utc>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub end_time: Option<DateTime<Utc>>,
}

impl ScanResult {
    /// A placeholder not yet persisted; the store assigns the id.
    pub fn new(
        digest: impl Into<String>,
        adapter_id: AdapterId,
        vendor: impl Into<String>,
    ) -> Self {
        ScanResult {
            id: ResultId(0),
            digest: digest.into(),
            adapter_id,
            vendor: vendor.into(),
            job_id: String::new(),
            status: ScanStatus::Pending,
            status_code: ScanStatus::Pending.code(),
            report: String::new(),
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn set_status(&mut self, status: ScanStatus) {
        self.status = status;
        self.status_code = status.code();
    }

    /// Marks the row as failed and stamps its end time.
    pub fn fail(&mut self) {
        self.set_status(ScanStatus::Error);
        self.end_time = Some(Utc::now());
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn has_report(&self) -> bool {
        !self.report.is_empty()
    }
}
