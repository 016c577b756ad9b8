//! JWT token generation and verification.
//!
//! Access and refresh tokens live in separate signing domains: different
//! secrets and different audiences, so a token from one domain never
//! verifies in the other.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AuthError, AuthResult};
use crate::models::auth::{TokenPayload, UserId};

/// Access token lifetime: 15 minutes.
pub const ACCESS_TOKEN_EXPIRY_SECS: i64 = 15 * 60;

/// Refresh token lifetime: 7 days.
pub const REFRESH_TOKEN_EXPIRY_SECS: i64 = 7 * 24 * 60 * 60;

const ISSUER: &str = "parla";
const ACCESS_AUDIENCE: &str = "parla:access";
const REFRESH_AUDIENCE: &str = "parla:refresh";

/// Claims embedded in both token kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenClaims {
    /// Subject (user ID).
    sub: String,
    email: String,
    iss: String,
    aud: String,
    /// Expiry (unix timestamp).
    exp: i64,
    /// Issued at (unix timestamp).
    iat: i64,
    /// Unique id; keeps two refresh tokens minted in the same second distinct.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jti: Option<String>,
}

/// Signs and verifies session tokens.
///
/// Every verification failure (signature, algorithm, issuer, audience,
/// expiry, malformed subject) is reported as [`AuthError::InvalidToken`].
pub trait TokenSigner: Send + Sync {
    fn create_access_token(&self, payload: &TokenPayload) -> AuthResult<String>;

    fn create_refresh_token(&self, payload: &TokenPayload) -> AuthResult<String>;

    fn verify_access_token(&self, token: &str) -> AuthResult<TokenPayload>;

    fn verify_refresh_token(&self, token: &str) -> AuthResult<TokenPayload>;

    /// Absolute expiry recorded alongside a newly persisted refresh token.
    fn refresh_token_expiry(&self) -> DateTime<Utc> {
        Utc::now() + Duration::seconds(REFRESH_TOKEN_EXPIRY_SECS)
    }
}

/// One signing domain: key material plus the claims it stamps and expects.
struct SigningDomain {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    audience: &'static str,
    ttl_secs: i64,
    unique: bool,
}

impl SigningDomain {
    fn new(secret: &[u8], audience: &'static str, ttl_secs: i64, unique: bool) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            audience,
            ttl_secs,
            unique,
        }
    }

    fn sign(&self, payload: &TokenPayload) -> AuthResult<String> {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: payload.user_id.to_string(),
            email: payload.email.clone(),
            iss: ISSUER.to_string(),
            aud: self.audience.to_string(),
            exp: (now + Duration::seconds(self.ttl_secs)).timestamp(),
            iat: now.timestamp(),
            jti: self.unique.then(|| Uuid::new_v4().to_string()),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    fn verify(&self, token: &str) -> AuthResult<TokenPayload> {
        let data = decode::<TokenClaims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!(audience = self.audience, error = %e, "token verification failed");
            AuthError::InvalidToken
        })?;
        let user_id = UserId::parse(&data.claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(TokenPayload {
            user_id,
            email: data.claims.email,
        })
    }
}

/// HS256 [`TokenSigner`] with one secret per domain.
pub struct JwtSigner {
    access: SigningDomain,
    refresh: SigningDomain,
}

impl JwtSigner {
    /// Build a signer from the access and refresh secrets.
    ///
    /// The secrets must be non-empty and distinct.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> AuthResult<Self> {
        if access_secret.is_empty() || refresh_secret.is_empty() {
            return Err(AuthError::ValidationError(
                "token secrets must not be empty".into(),
            ));
        }
        if access_secret == refresh_secret {
            return Err(AuthError::ValidationError(
                "access and refresh token secrets must differ".into(),
            ));
        }
        Ok(Self {
            access: SigningDomain::new(
                access_secret,
                ACCESS_AUDIENCE,
                ACCESS_TOKEN_EXPIRY_SECS,
                false,
            ),
            refresh: SigningDomain::new(
                refresh_secret,
                REFRESH_AUDIENCE,
                REFRESH_TOKEN_EXPIRY_SECS,
                true,
            ),
        })
    }
}

impl TokenSigner for JwtSigner {
    fn create_access_token(&self, payload: &TokenPayload) -> AuthResult<String> {
        self.access.sign(payload)
    }

    fn create_refresh_token(&self, payload: &TokenPayload) -> AuthResult<String> {
        self.refresh.sign(payload)
    }

    fn verify_access_token(&self, token: &str) -> AuthResult<TokenPayload> {
        self.access.verify(token)
    }

    fn verify_refresh_token(&self, token: &str) -> AuthResult<TokenPayload> {
        self.refresh.verify(token)
    }
}

/// Resolve a signing secret: env var `env_key` → persisted file → generated.
///
/// Generated secrets are written to `<data dir>/parla/<file_name>` so that
/// sessions survive restarts of a local server.
pub fn resolve_secret(env_key: &str, file_name: &str) -> String {
    if let Ok(secret) = std::env::var(env_key)
        && !secret.is_empty()
    {
        return secret;
    }
    let secret_path = secret_path(file_name);
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::write(&secret_path, &secret) {
        Ok(()) => info!(path = %secret_path.display(), env_key, "generated new token secret"),
        Err(e) => warn!(path = %secret_path.display(), error = %e, "could not persist token secret"),
    }
    secret
}

/// Path to a persisted secret file.
fn secret_path(file_name: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parla")
        .join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> JwtSigner {
        JwtSigner::new(b"access-secret-for-tests", b"refresh-secret-for-tests").unwrap()
    }

    fn payload() -> TokenPayload {
        TokenPayload {
            user_id: UserId::generate(),
            email: "ana@example.com".into(),
        }
    }

    #[test]
    fn access_token_round_trips() {
        let s = signer();
        let p = payload();
        let token = s.create_access_token(&p).unwrap();
        assert_eq!(s.verify_access_token(&token).unwrap(), p);
    }

    #[test]
    fn refresh_token_round_trips() {
        let s = signer();
        let p = payload();
        let token = s.create_refresh_token(&p).unwrap();
        assert_eq!(s.verify_refresh_token(&token).unwrap(), p);
    }

    #[test]
    fn domains_do_not_cross_verify() {
        let s = signer();
        let p = payload();
        let access = s.create_access_token(&p).unwrap();
        let refresh = s.create_refresh_token(&p).unwrap();
        assert!(matches!(
            s.verify_refresh_token(&access),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            s.verify_access_token(&refresh),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn refresh_tokens_are_unique_per_call() {
        let s = signer();
        let p = payload();
        let a = s.create_refresh_token(&p).unwrap();
        let b = s.create_refresh_token(&p).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let other = JwtSigner::new(b"another-access", b"another-refresh").unwrap();
        let token = other.create_refresh_token(&payload()).unwrap();
        assert!(matches!(
            signer().verify_refresh_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_reported_as_invalid() {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: UserId::generate().to_string(),
            email: "ana@example.com".into(),
            iss: ISSUER.into(),
            aud: ACCESS_AUDIENCE.into(),
            exp: (now - Duration::hours(1)).timestamp(),
            iat: (now - Duration::hours(2)).timestamp(),
            jti: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"access-secret-for-tests"),
        )
        .unwrap();
        assert!(matches!(
            signer().verify_access_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: UserId::generate().to_string(),
            email: "ana@example.com".into(),
            iss: "someone-else".into(),
            aud: ACCESS_AUDIENCE.into(),
            exp: (now + Duration::minutes(5)).timestamp(),
            iat: now.timestamp(),
            jti: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"access-secret-for-tests"),
        )
        .unwrap();
        assert!(matches!(
            signer().verify_access_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            signer().verify_access_token("not.a.jwt"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn identical_or_empty_secrets_are_refused() {
        assert!(JwtSigner::new(b"same", b"same").is_err());
        assert!(JwtSigner::new(b"", b"other").is_err());
    }

    #[test]
    fn refresh_expiry_is_seven_days_out() {
        let expiry = signer().refresh_token_expiry();
        let delta = expiry - Utc::now();
        assert!(delta > Duration::days(7) - Duration::minutes(1));
        assert!(delta <= Duration::days(7));
    }
}
