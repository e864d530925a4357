use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

use crate::{auth::AuthError, dao::storage::StorageError, state::session_machine::InvalidTransition};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Invalid input provided by the client.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Missing or unknown credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// Authenticated caller lacks the required role or ownership.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Uniqueness violation, such as a second answer to the same question.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Storage backend or authentication service is unavailable.
    #[error("service unavailable: {0}")]
    Unavailable(String),
    /// The session command lock could not be acquired in time.
    #[error("operation timed out")]
    Timeout,
    /// Unexpected failure; the details are logged, never returned.
    #[error("internal error")]
    Internal(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(message) => ServiceError::Conflict(message),
            StorageError::Missing(message) => ServiceError::NotFound(message),
            other => {
                error!(error = %other, "storage failure");
                ServiceError::Unavailable("storage unavailable".into())
            }
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        error!(error = %err, "authentication service failure");
        ServiceError::Unavailable("authentication service unavailable".into())
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input or an operation not allowed in the current state.
    #[error("{0}")]
    BadRequest(String),
    /// Missing or invalid credentials.
    #[error("{0}")]
    Unauthorized(String),
    /// Authenticated but not allowed.
    #[error("{0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Conflict with an existing record.
    #[error("{0}")]
    Conflict(String),
    /// Service unavailable or timed out.
    #[error("{0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Validation(_) | ServiceError::InvalidState(_) => {
                AppError::BadRequest(message)
            }
            ServiceError::Unauthenticated(_) => AppError::Unauthorized(message),
            ServiceError::Forbidden(_) => AppError::Forbidden(message),
            ServiceError::NotFound(_) => AppError::NotFound(message),
            ServiceError::Conflict(_) => AppError::Conflict(message),
            ServiceError::Unavailable(_) | ServiceError::Timeout => {
                AppError::ServiceUnavailable(message)
            }
            ServiceError::Internal(details) => {
                error!(details = %details, "internal error");
                AppError::Internal(message)
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
