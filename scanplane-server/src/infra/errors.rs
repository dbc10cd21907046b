use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use scanplane_core::ScanError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<ScanError> for AppError {
    fn from(err: ScanError) -> Self {
        let message = err.to_string();
        match err {
            ScanError::NotFound(_) => Self::not_found(message),
            ScanError::Conflict { .. } | ScanError::ResourceConflict(_) => Self::conflict(message),
            ScanError::Validation(_) => Self::bad_request(message),
            ScanError::Configuration(_) => Self::unprocessable(message),
            ScanError::Adapter { .. } | ScanError::Network(_) | ScanError::Timeout(_) => {
                Self::bad_gateway(message)
            }
            other => {
                tracing::error!(error = %other, "scan operation failed");
                Self::internal(message)
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use scanplane_core::model::ScanStatus;

    use super::*;

    #[test]
    fn scan_errors_map_to_http_statuses() {
        let cases = [
            (ScanError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                ScanError::Conflict {
                    status: ScanStatus::Running,
                },
                StatusCode::CONFLICT,
            ),
            (ScanError::ResourceConflict("x".into()), StatusCode::CONFLICT),
            (ScanError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                ScanError::Configuration("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (ScanError::adapter(Some(500), "boom"), StatusCode::BAD_GATEWAY),
            (ScanError::Timeout("x".into()), StatusCode::BAD_GATEWAY),
            (
                ScanError::JobSubmission("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ScanError::Store("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status, expected);
        }
    }

    #[test]
    fn conflict_message_names_the_blocking_status() {
        let err = AppError::from(ScanError::Conflict {
            status: ScanStatus::Pending,
        });
        assert!(err.message.contains("Pending"), "{}", err.message);
    }
}
