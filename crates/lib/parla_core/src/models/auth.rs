//! Authentication domain models.
//!
//! These are internal domain models, distinct from the HTTP DTOs in
//! `parla_api::models` (which carry `#[serde(rename)]` for camelCase etc.).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthError;

/// Maximum stored length of an email address.
pub const MAX_EMAIL_LEN: usize = 255;

/// Opaque user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Parse a user id from its textual form.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| AuthError::ValidationError(format!("invalid user id: {raw}")))
    }

    /// Wrap a UUID already known to identify a user (e.g. read back from the
    /// `users` table).
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A syntactically valid email address, case preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Validate and wrap an email address.
    ///
    /// Surrounding whitespace is trimmed; case is kept as entered.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let email = raw.trim();
        if email.is_empty() {
            return Err(AuthError::ValidationError("Email is required".into()));
        }
        if email.len() > MAX_EMAIL_LEN {
            return Err(AuthError::ValidationError(format!(
                "Email must be at most {MAX_EMAIL_LEN} characters"
            )));
        }
        if email.chars().any(char::is_whitespace) {
            return Err(AuthError::ValidationError(
                "Email must not contain whitespace".into(),
            ));
        }
        let Some((local, domain)) = email.split_once('@') else {
            return Err(AuthError::ValidationError("Email must contain '@'".into()));
        };
        let domain_ok = !domain.contains('@')
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && !domain.contains("..");
        if local.is_empty() || !domain_ok {
            return Err(AuthError::ValidationError("Invalid email address".into()));
        }
        Ok(Self(email.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison used for uniqueness checks. Folds
    /// Unicode case like the `lower(email)` index does.
    pub fn matches(&self, other: &Email) -> bool {
        self.0.to_lowercase() == other.0.to_lowercase()
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Domain user.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub name: Option<String>,
}

/// User with password hash (for internal auth flows).
///
/// `password_hash` is `None` for accounts provisioned without a password;
/// such accounts can never log in with one.
#[derive(Debug, Clone)]
pub struct UserWithPassword {
    pub user: User,
    pub password_hash: Option<String>,
}

/// Refresh token row.
///
/// `used_at` and `replacement_token` are set together, once, when the token
/// is rotated; the row is kept so duplicate rotations can be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: UserId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub replacement_token: Option<String>,
}

impl RefreshToken {
    /// Whether the absolute expiry has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Identity carried inside both token kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    pub user_id: UserId,
    pub email: String,
}

impl From<&User> for TokenPayload {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.as_str().to_string(),
        }
    }
}

/// Freshly issued access/refresh pair.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}
