//! Authentication use cases over the hasher, signer and store collaborators:
//! register, login, logout, current user and token refresh.

use std::sync::Arc;

use tracing::{debug, info};

use super::jwt::TokenSigner;
use super::password::PasswordHasher;
use super::rotation::{Rotation, rotate_refresh_token};
use super::session::{SessionOutcome, authenticate_session};
use super::store::RefreshTokenStore;
use super::users::UserStore;
use super::{AuthError, AuthResult};
use crate::models::auth::{Email, TokenPair, TokenPayload, User, UserId};

/// Minimum password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// bcrypt only looks at the first 72 bytes of a password.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Maximum display name length.
pub const MAX_NAME_LEN: usize = 100;

/// A user together with a freshly issued token pair.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub tokens: TokenPair,
}

/// Authentication use cases.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn RefreshTokenStore>,
    signer: Arc<dyn TokenSigner>,
    hasher: Arc<dyn PasswordHasher>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn RefreshTokenStore>,
        signer: Arc<dyn TokenSigner>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self {
            users,
            tokens,
            signer,
            hasher,
        }
    }

    /// Register a new account and sign it in.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> AuthResult<Session> {
        let email = Email::parse(email)?;
        validate_password(password)?;
        let name = normalize_name(name)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailAlreadyExists);
        }

        let password_hash = self.hasher.hash(password)?;
        let user = self
            .users
            .create_user(&email, name.as_deref(), Some(&password_hash))
            .await?;
        info!(user_id = %user.id, "user registered");

        self.issue_session(user).await
    }

    /// Authenticate with email + password.
    ///
    /// Unknown emails, accounts without a password and wrong passwords all
    /// fail with the same [`AuthError::InvalidCredentials`].
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<Session> {
        let Ok(email) = Email::parse(email) else {
            return Err(AuthError::InvalidCredentials);
        };

        let Some(record) = self.users.find_by_email(&email).await? else {
            debug!("login for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        let Some(hash) = record.password_hash.as_deref() else {
            debug!(user_id = %record.user.id, "login for account without password");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.hasher.verify(password, hash)? {
            debug!(user_id = %record.user.id, "login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        info!(user_id = %record.user.id, "user logged in");
        self.issue_session(record.user).await
    }

    /// Revoke the presented refresh token, if any.
    pub async fn logout(&self, refresh_token: Option<&str>) -> AuthResult<()> {
        if let Some(token) = refresh_token.filter(|t| !t.is_empty()) {
            self.tokens.delete_by_token(token).await?;
        }
        Ok(())
    }

    /// Revoke every refresh token of a user.
    pub async fn logout_everywhere(&self, user_id: &UserId) -> AuthResult<()> {
        self.tokens.delete_all_for_user(user_id).await?;
        info!(user_id = %user_id, "all sessions revoked");
        Ok(())
    }

    /// Fetch the signed-in user.
    pub async fn current_user(&self, user_id: &UserId) -> AuthResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("user {user_id}")))
    }

    /// Exchange a refresh token for a new pair.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> AuthResult<Rotation> {
        rotate_refresh_token(self.tokens.as_ref(), self.signer.as_ref(), refresh_token).await
    }

    /// Decide the session state of a request from its cookies.
    pub async fn authenticate(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> AuthResult<SessionOutcome> {
        authenticate_session(
            self.signer.as_ref(),
            self.tokens.as_ref(),
            access_token,
            refresh_token,
        )
        .await
    }

    /// Remove refresh tokens past their absolute expiry.
    pub async fn purge_expired_tokens(&self) -> AuthResult<u64> {
        self.tokens.delete_expired().await
    }

    async fn issue_session(&self, user: User) -> AuthResult<Session> {
        let payload = TokenPayload::from(&user);
        let access_token = self.signer.create_access_token(&payload)?;
        let refresh_token = self.signer.create_refresh_token(&payload)?;
        self.tokens
            .save(&user.id, &refresh_token, self.signer.refresh_token_expiry())
            .await?;
        Ok(Session {
            user,
            tokens: TokenPair {
                access_token,
                refresh_token,
            },
        })
    }
}

fn validate_password(password: &str) -> AuthResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::ValidationError(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AuthError::ValidationError(format!(
            "Password must be at most {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    Ok(())
}

fn normalize_name(name: Option<&str>) -> AuthResult<Option<String>> {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AuthError::ValidationError(format!(
            "Name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(Some(name.to_string()))
}
