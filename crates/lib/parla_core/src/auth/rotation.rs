//! Refresh token rotation.
//!
//! A refresh token is exchanged for exactly one successor. The consumed row
//! is kept, marked used and pointing at that successor, so that duplicate
//! requests presenting the same token shortly afterwards (two tabs, a
//! network retry) converge on the same successor instead of logging the
//! user out. Replays after [`REFRESH_GRACE_PERIOD_SECS`] are refused.
//!
//! Steps, each short-circuiting:
//!
//! 1. look the row up (absent ⇒ `InvalidToken`);
//! 2. check the row's absolute expiry (past ⇒ `TokenExpired`);
//! 3. verify the token signature (failure or foreign subject ⇒ `InvalidToken`);
//! 4. mint a new pair;
//! 5. conditionally mark the old row used: the winner persists the new
//!    refresh token, everyone else is answered from the grace window.

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use super::jwt::TokenSigner;
use super::store::RefreshTokenStore;
use super::{AuthError, AuthResult};
use crate::models::auth::{TokenPair, TokenPayload};

/// How long after a rotation the consumed token may still be presented.
pub const REFRESH_GRACE_PERIOD_SECS: i64 = 30;

/// Which branch of the protocol answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPath {
    /// This call consumed the token and persisted a new successor.
    Rotated,
    /// The token was already consumed within the grace period; the existing
    /// successor was handed back.
    Replayed,
}

/// Outcome of a successful rotation.
#[derive(Debug, Clone)]
pub struct Rotation {
    pub tokens: TokenPair,
    pub payload: TokenPayload,
    pub path: RotationPath,
}

/// Exchange `presented` for a new token pair.
pub async fn rotate_refresh_token(
    store: &dyn RefreshTokenStore,
    signer: &dyn TokenSigner,
    presented: &str,
) -> AuthResult<Rotation> {
    let Some(row) = store.get_by_token(presented).await? else {
        debug!("refresh token not found");
        return Err(AuthError::InvalidToken);
    };

    let now = Utc::now();
    if row.is_expired_at(now) {
        debug!(user_id = %row.user_id, "refresh token past its absolute expiry");
        return Err(AuthError::TokenExpired);
    }

    let payload = signer.verify_refresh_token(presented)?;
    if payload.user_id != row.user_id {
        warn!(
            row_user = %row.user_id,
            token_user = %payload.user_id,
            "refresh token subject does not match its row"
        );
        return Err(AuthError::InvalidToken);
    }

    let access_token = signer.create_access_token(&payload)?;
    let refresh_token = signer.create_refresh_token(&payload)?;

    let outcome = store.try_mark_used(presented, &refresh_token, now).await?;

    if outcome.marked {
        store
            .save(&payload.user_id, &refresh_token, signer.refresh_token_expiry())
            .await?;
        info!(user_id = %payload.user_id, "refresh token rotated");
        return Ok(Rotation {
            tokens: TokenPair {
                access_token,
                refresh_token,
            },
            payload,
            path: RotationPath::Rotated,
        });
    }

    // Someone else consumed this token first; the refresh token minted above
    // is discarded.
    let record = outcome.record;
    let (Some(used_at), Some(replacement)) = (record.used_at, record.replacement_token) else {
        warn!(user_id = %payload.user_id, "consumed refresh token has no rotation record");
        return Err(AuthError::InvalidToken);
    };

    let elapsed = now - used_at;
    if elapsed > Duration::seconds(REFRESH_GRACE_PERIOD_SECS) {
        warn!(
            user_id = %payload.user_id,
            elapsed_secs = elapsed.num_seconds(),
            "rotated refresh token replayed after grace period"
        );
        return Err(AuthError::TokenExpired);
    }

    debug!(
        user_id = %payload.user_id,
        elapsed_ms = elapsed.num_milliseconds(),
        "duplicate rotation within grace period"
    );
    Ok(Rotation {
        tokens: TokenPair {
            access_token,
            refresh_token: replacement,
        },
        payload,
        path: RotationPath::Replayed,
    })
}
