//! Authentication and session logic.
//!
//! Password hashing, the two JWT signing domains, refresh-token persistence,
//! the rotation protocol and the per-request session decision. The use-case
//! layer in [`service`] ties them together for `parla_api`.

pub mod jwt;
pub mod memory;
pub mod password;
pub mod rotation;
pub mod service;
pub mod session;
pub mod store;
pub mod users;

use thiserror::Error;
use tracing::error;

/// Result alias used across the auth core.
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication errors.
///
/// `InvalidToken` and `TokenExpired` are deliberately coarse: callers never
/// learn whether a signature, issuer or expiry check failed.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Email already registered")]
    EmailAlreadyExists,

    #[error("Insert affected no rows")]
    InsertFailed,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Whether this error came from the persistence layer rather than from
    /// an authentication decision.
    pub fn is_storage(&self) -> bool {
        matches!(self, AuthError::Storage(_) | AuthError::InsertFailed)
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        error!(error = %e, "auth storage failure");
        AuthError::Storage(e.to_string())
    }
}
