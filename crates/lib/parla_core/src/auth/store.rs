//! Refresh token persistence.
//!
//! [`RefreshTokenStore::try_mark_used`] is the only place where two requests
//! touching the same row must be serialised, and it leans on the storage's
//! own atomicity: a single conditional `UPDATE` in PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error};
use uuid::Uuid;

use super::{AuthError, AuthResult};
use crate::models::auth::{RefreshToken, UserId};

/// Result of a conditional "mark as used" write.
#[derive(Debug, Clone)]
pub struct MarkUsedOutcome {
    /// `true` when this call performed the transition.
    pub marked: bool,
    /// The row after the attempt. When `marked` is `false` it carries the
    /// values written by whichever call won.
    pub record: RefreshToken,
}

/// Storage of issued refresh tokens and their rotation state.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Persist a new token. Fails with [`AuthError::InsertFailed`] if nothing
    /// was written.
    async fn save(
        &self,
        user_id: &UserId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<RefreshToken>;

    /// Look a token up. Absence is not an error.
    async fn get_by_token(&self, token: &str) -> AuthResult<Option<RefreshToken>>;

    /// Delete one token. Deleting nothing succeeds.
    async fn delete_by_token(&self, token: &str) -> AuthResult<()>;

    /// Delete every token of a user. Deleting nothing succeeds.
    async fn delete_all_for_user(&self, user_id: &UserId) -> AuthResult<()>;

    /// Atomically set `used_at` and `replacement_token` on a row that has not
    /// been used yet.
    ///
    /// `used_at` is supplied by the caller so that the grace period is always
    /// measured against a single clock.
    ///
    /// If another call got there first, the current row is returned with
    /// `marked = false`. A row that has vanished entirely is a storage
    /// inconsistency and fails with [`AuthError::Storage`].
    async fn try_mark_used(
        &self,
        token: &str,
        replacement: &str,
        used_at: DateTime<Utc>,
    ) -> AuthResult<MarkUsedOutcome>;

    /// Remove rows past their absolute expiry, returning how many went.
    async fn delete_expired(&self) -> AuthResult<u64>;
}

/// Row returned by refresh token queries.
#[derive(Debug, Clone, sqlx::FromRow)]
struct RefreshTokenRow {
    id: Uuid,
    user_id: Uuid,
    token: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
    replacement_token: Option<String>,
}

impl From<RefreshTokenRow> for RefreshToken {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            id: row.id,
            user_id: UserId::from_uuid(row.user_id),
            token: row.token,
            expires_at: row.expires_at,
            created_at: row.created_at,
            used_at: row.used_at,
            replacement_token: row.replacement_token,
        }
    }
}

/// PostgreSQL-backed [`RefreshTokenStore`] over the `refresh_tokens` table.
#[derive(Debug, Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn save(
        &self,
        user_id: &UserId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<RefreshToken> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, token, expires_at, created_at, used_at, replacement_token
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(user_id.as_uuid())
        .bind(token)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => {
                error!(user_id = %user_id, "refresh token insert affected no rows");
                Err(AuthError::InsertFailed)
            }
        }
    }

    async fn get_by_token(&self, token: &str) -> AuthResult<Option<RefreshToken>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT id, user_id, token, expires_at, created_at, used_at, replacement_token
            FROM refresh_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn delete_by_token(&self, token: &str) -> AuthResult<()> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: &UserId) -> AuthResult<()> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?;
        debug!(user_id = %user_id, deleted = result.rows_affected(), "purged refresh tokens");
        Ok(())
    }

    async fn try_mark_used(
        &self,
        token: &str,
        replacement: &str,
        used_at: DateTime<Utc>,
    ) -> AuthResult<MarkUsedOutcome> {
        let updated = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            UPDATE refresh_tokens
            SET used_at = $3, replacement_token = $2
            WHERE token = $1 AND used_at IS NULL
            RETURNING id, user_id, token, expires_at, created_at, used_at, replacement_token
            "#,
        )
        .bind(token)
        .bind(replacement)
        .bind(used_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(MarkUsedOutcome {
                marked: true,
                record: row.into(),
            });
        }

        // Lost the race (or the token was already rotated): report the winner.
        match self.get_by_token(token).await? {
            Some(record) => Ok(MarkUsedOutcome {
                marked: false,
                record,
            }),
            None => {
                error!("refresh token row disappeared during rotation");
                Err(AuthError::Storage(
                    "refresh token row missing after conditional update".into(),
                ))
            }
        }
    }

    async fn delete_expired(&self) -> AuthResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
