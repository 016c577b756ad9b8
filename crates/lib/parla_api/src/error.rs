//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use parla_core::auth::AuthError;
use parla_core::auth::session::Rejection;
use parla_core::chat::ChatError;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Session expired")]
    SessionExpired,

    #[error("Upstream provider failed: {0}")]
    BadGateway(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m.as_str()),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid email or password",
            ),
            AppError::AuthenticationRequired => (
                StatusCode::UNAUTHORIZED,
                "authentication_required",
                "Authentication required",
            ),
            AppError::SessionExpired => {
                (StatusCode::UNAUTHORIZED, "session_expired", "Session expired")
            }
            AppError::BadGateway(_) => (
                StatusCode::BAD_GATEWAY,
                "provider_error",
                "The language model provider failed",
            ),
            AppError::ServiceUnavailable(m) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", m.as_str())
            }
            AppError::Internal(detail) => {
                error!(%detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".into()),
            _ => AppError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => AppError::InvalidCredentials,
            AuthError::InvalidToken | AuthError::TokenExpired => AppError::SessionExpired,
            AuthError::EmailAlreadyExists => {
                AppError::Conflict("An account with this email already exists".into())
            }
            AuthError::ValidationError(msg) => AppError::Validation(msg),
            AuthError::NotFound(msg) => AppError::NotFound(msg),
            AuthError::InsertFailed => AppError::Internal("insert affected no rows".into()),
            AuthError::Storage(msg) | AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<Rejection> for AppError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::AuthenticationRequired => AppError::AuthenticationRequired,
            Rejection::SessionExpired => AppError::SessionExpired,
        }
    }
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::NotFound(msg) => AppError::NotFound(msg),
            ChatError::Validation(msg) => AppError::Validation(msg),
            ChatError::Provider(msg) => AppError::BadGateway(msg),
            ChatError::Config(msg) => AppError::ServiceUnavailable(msg),
            ChatError::Db(e) => AppError::from(e),
        }
    }
}
