//! Per-request session decision.
//!
//! Given whichever of the two cookie-carried tokens are present, decide
//! whether the request is authenticated, rotating the refresh token when the
//! access token is missing or no longer valid:
//!
//! ```text
//! no tokens                    -> Rejected(AuthenticationRequired)
//! valid access                 -> Authenticated
//! invalid access, no refresh   -> Rejected(SessionExpired)
//! refresh present              -> rotate -> Authenticated { renewed } | Rejected(SessionExpired)
//! ```
//!
//! Only storage faults escape as `Err`; every authentication failure is a
//! [`SessionOutcome::Rejected`].

use tracing::debug;

use super::AuthResult;
use super::jwt::TokenSigner;
use super::rotation::rotate_refresh_token;
use super::store::RefreshTokenStore;
use crate::models::auth::{TokenPair, UserId};

/// Why a request was not authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No session tokens were presented at all.
    AuthenticationRequired,
    /// Tokens were presented but none of them could be used.
    SessionExpired,
}

/// Identity established for one request.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub user_id: UserId,
    pub email: String,
    /// Set when the refresh token was rotated; the caller must write these
    /// to the client before the response is sent.
    pub renewed: Option<TokenPair>,
}

/// Result of [`authenticate_session`].
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    Authenticated(SessionIdentity),
    Rejected(Rejection),
}

/// Decide the session state for one request.
///
/// Empty strings count as absent (cleared cookies come back empty).
pub async fn authenticate_session(
    signer: &dyn TokenSigner,
    store: &dyn RefreshTokenStore,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
) -> AuthResult<SessionOutcome> {
    let access_token = access_token.filter(|t| !t.is_empty());
    let refresh_token = refresh_token.filter(|t| !t.is_empty());

    if access_token.is_none() && refresh_token.is_none() {
        return Ok(SessionOutcome::Rejected(Rejection::AuthenticationRequired));
    }

    if let Some(token) = access_token {
        match signer.verify_access_token(token) {
            Ok(payload) => {
                return Ok(SessionOutcome::Authenticated(SessionIdentity {
                    user_id: payload.user_id,
                    email: payload.email,
                    renewed: None,
                }));
            }
            Err(_) => debug!("access token rejected, trying refresh"),
        }
    }

    let Some(refresh_token) = refresh_token else {
        return Ok(SessionOutcome::Rejected(Rejection::SessionExpired));
    };

    match rotate_refresh_token(store, signer, refresh_token).await {
        Ok(rotation) => Ok(SessionOutcome::Authenticated(SessionIdentity {
            user_id: rotation.payload.user_id,
            email: rotation.payload.email,
            renewed: Some(rotation.tokens),
        })),
        Err(e) if e.is_storage() => Err(e),
        Err(e) => {
            debug!(reason = %e, "refresh during session check failed");
            Ok(SessionOutcome::Rejected(Rejection::SessionExpired))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::auth::AuthError;
    use crate::auth::jwt::JwtSigner;
    use crate::auth::memory::MemoryRefreshTokenStore;
    use crate::auth::store::MarkUsedOutcome;
    use crate::models::auth::{RefreshToken, TokenPayload};

    /// Store wrapper that counts every call.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryRefreshTokenStore,
        calls: AtomicUsize,
    }

    impl CountingStore {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn tick(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl RefreshTokenStore for CountingStore {
        async fn save(
            &self,
            user_id: &UserId,
            token: &str,
            expires_at: DateTime<Utc>,
        ) -> AuthResult<RefreshToken> {
            self.tick();
            self.inner.save(user_id, token, expires_at).await
        }

        async fn get_by_token(&self, token: &str) -> AuthResult<Option<RefreshToken>> {
            self.tick();
            self.inner.get_by_token(token).await
        }

        async fn delete_by_token(&self, token: &str) -> AuthResult<()> {
            self.tick();
            self.inner.delete_by_token(token).await
        }

        async fn delete_all_for_user(&self, user_id: &UserId) -> AuthResult<()> {
            self.tick();
            self.inner.delete_all_for_user(user_id).await
        }

        async fn try_mark_used(
            &self,
            token: &str,
            replacement: &str,
            used_at: DateTime<Utc>,
        ) -> AuthResult<MarkUsedOutcome> {
            self.tick();
            self.inner.try_mark_used(token, replacement, used_at).await
        }

        async fn delete_expired(&self) -> AuthResult<u64> {
            self.tick();
            self.inner.delete_expired().await
        }
    }

    /// Store whose every call fails like a dropped database connection.
    struct BrokenStore;

    #[async_trait]
    impl RefreshTokenStore for BrokenStore {
        async fn save(&self, _: &UserId, _: &str, _: DateTime<Utc>) -> AuthResult<RefreshToken> {
            Err(AuthError::Storage("connection reset".into()))
        }

        async fn get_by_token(&self, _: &str) -> AuthResult<Option<RefreshToken>> {
            Err(AuthError::Storage("connection reset".into()))
        }

        async fn delete_by_token(&self, _: &str) -> AuthResult<()> {
            Err(AuthError::Storage("connection reset".into()))
        }

        async fn delete_all_for_user(&self, _: &UserId) -> AuthResult<()> {
            Err(AuthError::Storage("connection reset".into()))
        }

        async fn try_mark_used(
            &self,
            _: &str,
            _: &str,
            _: DateTime<Utc>,
        ) -> AuthResult<MarkUsedOutcome> {
            Err(AuthError::Storage("connection reset".into()))
        }

        async fn delete_expired(&self) -> AuthResult<u64> {
            Err(AuthError::Storage("connection reset".into()))
        }
    }

    fn signer() -> JwtSigner {
        JwtSigner::new(b"session-access-secret", b"session-refresh-secret").unwrap()
    }

    fn payload() -> TokenPayload {
        TokenPayload {
            user_id: UserId::generate(),
            email: "ana@example.com".into(),
        }
    }

    #[tokio::test]
    async fn no_tokens_requires_authentication_without_touching_storage() {
        let store = CountingStore::default();
        let outcome = authenticate_session(&signer(), &store, None, None)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            SessionOutcome::Rejected(Rejection::AuthenticationRequired)
        ));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn empty_cookies_count_as_absent() {
        let store = CountingStore::default();
        let outcome = authenticate_session(&signer(), &store, Some(""), Some(""))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            SessionOutcome::Rejected(Rejection::AuthenticationRequired)
        ));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn valid_access_token_skips_storage() {
        let store = CountingStore::default();
        let signer = signer();
        let p = payload();
        let access = signer.create_access_token(&p).unwrap();

        let outcome = authenticate_session(&signer, &store, Some(&access), Some("ignored"))
            .await
            .unwrap();
        let SessionOutcome::Authenticated(identity) = outcome else {
            panic!("expected authenticated session");
        };
        assert_eq!(identity.user_id, p.user_id);
        assert_eq!(identity.email, p.email);
        assert!(identity.renewed.is_none());
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn invalid_access_without_refresh_is_expired() {
        let store = CountingStore::default();
        let outcome = authenticate_session(&signer(), &store, Some("garbage"), None)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            SessionOutcome::Rejected(Rejection::SessionExpired)
        ));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn refresh_only_rotates_and_renews() {
        let store = CountingStore::default();
        let signer = signer();
        let p = payload();
        let refresh = signer.create_refresh_token(&p).unwrap();
        store
            .inner
            .save(&p.user_id, &refresh, signer.refresh_token_expiry())
            .await
            .unwrap();

        let outcome = authenticate_session(&signer, &store, None, Some(&refresh))
            .await
            .unwrap();
        let SessionOutcome::Authenticated(identity) = outcome else {
            panic!("expected authenticated session");
        };
        assert_eq!(identity.user_id, p.user_id);
        let renewed = identity.renewed.expect("tokens renewed");
        assert_ne!(renewed.refresh_token, refresh);
        assert!(signer.verify_access_token(&renewed.access_token).is_ok());
    }

    #[tokio::test]
    async fn failed_refresh_with_both_tokens_is_expired() {
        let store = CountingStore::default();
        let outcome = authenticate_session(&signer(), &store, Some("stale"), Some("unknown"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            SessionOutcome::Rejected(Rejection::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn storage_faults_are_not_rejections() {
        let err = authenticate_session(&signer(), &BrokenStore, None, Some("anything"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Storage(_)));
    }
}
