use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    identity::IdentityError,
    state::{AbortError, ApplyError, PlanError, play_field::OutOfBounds},
};

/// Errors raised by the service layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A store call failed.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// No store is installed yet.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// The identity provider could not hand out an identity.
    #[error("identity unavailable")]
    Identity(#[source] IdentityError),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The session is in the wrong phase or a guard is unmet.
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Side-effect work of a transition took too long.
    #[error("operation timed out")]
    Timeout,
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<IdentityError> for ServiceError {
    fn from(err: IdentityError) -> Self {
        ServiceError::Identity(err)
    }
}

impl From<OutOfBounds> for ServiceError {
    fn from(err: OutOfBounds) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

impl From<PlanError> for ServiceError {
    fn from(err: PlanError) -> Self {
        let message = match err {
            PlanError::AlreadyPending => "another transition is in progress".to_owned(),
            PlanError::InvalidTransition(invalid) => invalid.to_string(),
            PlanError::Unmet(missing) => missing.to_string(),
        };
        ServiceError::InvalidState(message)
    }
}

impl From<ApplyError> for ServiceError {
    fn from(err: ApplyError) -> Self {
        let message = match err {
            ApplyError::NoPending => "no transition is pending".to_owned(),
            ApplyError::IdMismatch { .. } => "pending transition does not match".to_owned(),
            ApplyError::PhaseMismatch { expected, actual } => {
                format!("session moved from {expected:?} to {actual:?} mid-transition")
            }
            ApplyError::VersionMismatch { expected, actual } => {
                format!("session version changed mid-transition ({expected} -> {actual})")
            }
        };
        ServiceError::InvalidState(message)
    }
}

impl From<AbortError> for ServiceError {
    fn from(err: AbortError) -> Self {
        let message = match err {
            AbortError::NoPending => "no transition to abort",
            AbortError::IdMismatch { .. } => "aborted transition does not match",
        };
        ServiceError::InvalidState(message.to_owned())
    }
}

/// Errors returned by HTTP handlers as `{ "message": ... }` bodies.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// The request does not fit the session's current phase.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Storage or identity provider unavailable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Identity(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Timeout => AppError::ServiceUnavailable("operation timed out".into()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {err}"))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorBody {
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::state_machine::MissingRequirement;

    fn status_of(err: ServiceError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn service_errors_map_to_statuses() {
        assert_eq!(
            status_of(PlanError::Unmet(MissingRequirement::Avatar).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ServiceError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ServiceError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ServiceError::Degraded),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(IdentityError::Unavailable("down".into()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(
                OutOfBounds {
                    x: 9,
                    y: 0,
                    grid_size: 3
                }
                .into()
            ),
            StatusCode::BAD_REQUEST
        );
    }
}
