use crate::status::ScanStatus;

/// Payload the job runtime posts to a job's status hook.
///
/// A non-empty `check_in` is the final serialized report; otherwise the
/// change is a bare status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusChange {
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub job_id: Option<String>,
    pub status: String,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub check_in: Option<String>,
}

impl StatusChange {
    pub fn status(job_id: impl Into<String>, status: ScanStatus) -> Self {
        StatusChange {
            job_id: Some(job_id.into()),
            status: status.to_string(),
            check_in: None,
        }
    }

    pub fn check_in(job_id: impl Into<String>, payload: impl Into<String>) -> Self {
        StatusChange {
            job_id: Some(job_id.into()),
            status: ScanStatus::Running.to_string(),
            check_in: Some(payload.into()),
        }
    }

    /// The check-in payload when it carries anything.
    pub fn check_in_payload(&self) -> Option<&str> {
        self.check_in.as_deref().filter(|payload| !payload.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.status.trim().is_empty() && self.check_in_payload().is_none()
    }
}
