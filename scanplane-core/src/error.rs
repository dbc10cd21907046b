use scanplane_model::{ModelError, ScanStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("conflict: a previous scanning is {status}")]
    Conflict { status: ScanStatus },

    #[error("Resource conflict: {0}")]
    ResourceConflict(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Adapter error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Adapter { status: Option<u16>, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Job submission failed: {0}")]
    JobSubmission(String),

    #[error("Hook delivery failed: {0}")]
    HookDelivery(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// Whether the job runtime may run the failed work again.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ScanError::Validation(_)
                | ScanError::Configuration(_)
                | ScanError::Conflict { .. }
                | ScanError::ResourceConflict(_)
                | ScanError::Timeout(_)
                | ScanError::Serialization(_)
                | ScanError::NotFound(_)
        )
    }

    pub fn adapter(status: Option<u16>, message: impl Into<String>) -> Self {
        ScanError::Adapter {
            status,
            message: message.into(),
        }
    }
}

impl From<ModelError> for ScanError {
    fn from(err: ModelError) -> Self {
        ScanError::Validation(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for ScanError {
    fn from(err: sqlx::Error) -> Self {
        ScanError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
