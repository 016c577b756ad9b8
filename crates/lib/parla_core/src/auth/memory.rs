//! In-process stores.
//!
//! Used by tests and by local runs without PostgreSQL. Each operation holds
//! the store's mutex for its whole critical section, which gives
//! [`RefreshTokenStore::try_mark_used`] the same all-or-nothing behaviour as
//! the conditional `UPDATE` of the PostgreSQL store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::store::{MarkUsedOutcome, RefreshTokenStore};
use super::users::UserStore;
use super::{AuthError, AuthResult};
use crate::models::auth::{Email, RefreshToken, User, UserId, UserWithPassword};

fn poisoned() -> AuthError {
    AuthError::Storage("in-memory store lock poisoned".into())
}

/// In-memory [`RefreshTokenStore`] keyed by token string.
#[derive(Debug, Default)]
pub struct MemoryRefreshTokenStore {
    rows: Mutex<HashMap<String, RefreshToken>>,
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> AuthResult<MutexGuard<'_, HashMap<String, RefreshToken>>> {
        self.rows.lock().map_err(|_| poisoned())
    }

    /// Insert a row as-is, bypassing `save` (e.g. to load a snapshot).
    pub fn insert(&self, record: RefreshToken) -> AuthResult<()> {
        self.rows()?.insert(record.token.clone(), record);
        Ok(())
    }

    /// Number of stored rows, consumed ones included.
    pub fn len(&self) -> AuthResult<usize> {
        Ok(self.rows()?.len())
    }

    pub fn is_empty(&self) -> AuthResult<bool> {
        Ok(self.rows()?.is_empty())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn save(
        &self,
        user_id: &UserId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<RefreshToken> {
        let mut rows = self.rows()?;
        if rows.contains_key(token) {
            return Err(AuthError::InsertFailed);
        }
        let record = RefreshToken {
            id: Uuid::now_v7(),
            user_id: *user_id,
            token: token.to_string(),
            expires_at,
            created_at: Utc::now(),
            used_at: None,
            replacement_token: None,
        };
        rows.insert(record.token.clone(), record.clone());
        Ok(record)
    }

    async fn get_by_token(&self, token: &str) -> AuthResult<Option<RefreshToken>> {
        Ok(self.rows()?.get(token).cloned())
    }

    async fn delete_by_token(&self, token: &str) -> AuthResult<()> {
        self.rows()?.remove(token);
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: &UserId) -> AuthResult<()> {
        self.rows()?.retain(|_, row| row.user_id != *user_id);
        Ok(())
    }

    async fn try_mark_used(
        &self,
        token: &str,
        replacement: &str,
        used_at: DateTime<Utc>,
    ) -> AuthResult<MarkUsedOutcome> {
        let mut rows = self.rows()?;
        let row = rows.get_mut(token).ok_or_else(|| {
            AuthError::Storage("refresh token row missing after conditional update".into())
        })?;
        if row.used_at.is_some() {
            return Ok(MarkUsedOutcome {
                marked: false,
                record: row.clone(),
            });
        }
        row.used_at = Some(used_at);
        row.replacement_token = Some(replacement.to_string());
        Ok(MarkUsedOutcome {
            marked: true,
            record: row.clone(),
        })
    }

    async fn delete_expired(&self) -> AuthResult<u64> {
        let now = Utc::now();
        let mut rows = self.rows()?;
        let before = rows.len();
        rows.retain(|_, row| !row.is_expired_at(now));
        Ok((before - rows.len()) as u64)
    }
}

/// In-memory [`UserStore`].
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<UserId, UserWithPassword>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn users(&self) -> AuthResult<MutexGuard<'_, HashMap<UserId, UserWithPassword>>> {
        self.users.lock().map_err(|_| poisoned())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(
        &self,
        email: &Email,
        name: Option<&str>,
        password_hash: Option<&str>,
    ) -> AuthResult<User> {
        let mut users = self.users()?;
        if users.values().any(|u| u.user.email.matches(email)) {
            return Err(AuthError::EmailAlreadyExists);
        }
        let user = User {
            id: UserId::generate(),
            email: email.clone(),
            name: name.map(str::to_string),
        };
        users.insert(
            user.id,
            UserWithPassword {
                user: user.clone(),
                password_hash: password_hash.map(str::to_string),
            },
        );
        Ok(user)
    }

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<UserWithPassword>> {
        Ok(self
            .users()?
            .values()
            .find(|u| u.user.email.matches(email))
            .cloned())
    }

    async fn find_by_id(&self, id: &UserId) -> AuthResult<Option<User>> {
        Ok(self.users()?.get(id).map(|u| u.user.clone()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn in_a_week() -> DateTime<Utc> {
        Utc::now() + Duration::days(7)
    }

    #[tokio::test]
    async fn save_then_get() {
        let store = MemoryRefreshTokenStore::new();
        let user = UserId::generate();
        let saved = store.save(&user, "tok-1", in_a_week()).await.unwrap();
        assert_eq!(saved.user_id, user);
        assert!(saved.used_at.is_none());
        assert_eq!(store.get_by_token("tok-1").await.unwrap(), Some(saved));
        assert_eq!(store.get_by_token("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_token_insert_fails() {
        let store = MemoryRefreshTokenStore::new();
        let user = UserId::generate();
        store.save(&user, "tok-1", in_a_week()).await.unwrap();
        let err = store.save(&user, "tok-1", in_a_week()).await.unwrap_err();
        assert!(matches!(err, AuthError::InsertFailed));
    }

    #[tokio::test]
    async fn mark_used_is_write_once() {
        let store = MemoryRefreshTokenStore::new();
        store
            .save(&UserId::generate(), "tok-1", in_a_week())
            .await
            .unwrap();

        let used_at = Utc::now();
        let first = store.try_mark_used("tok-1", "tok-2", used_at).await.unwrap();
        assert!(first.marked);
        assert_eq!(first.record.replacement_token.as_deref(), Some("tok-2"));
        assert_eq!(first.record.used_at, Some(used_at));

        let later = used_at + chrono::Duration::seconds(5);
        let second = store.try_mark_used("tok-1", "tok-3", later).await.unwrap();
        assert!(!second.marked);
        assert_eq!(second.record.used_at, Some(used_at));
        assert_eq!(second.record.replacement_token.as_deref(), Some("tok-2"));
    }

    #[tokio::test]
    async fn mark_used_on_missing_row_is_a_storage_error() {
        let store = MemoryRefreshTokenStore::new();
        let err = store.try_mark_used("ghost", "next", Utc::now()).await.unwrap_err();
        assert!(matches!(err, AuthError::Storage(_)));
    }

    #[tokio::test]
    async fn deletes_are_idempotent() {
        let store = MemoryRefreshTokenStore::new();
        let user = UserId::generate();
        let other = UserId::generate();
        store.save(&user, "a", in_a_week()).await.unwrap();
        store.save(&user, "b", in_a_week()).await.unwrap();
        store.save(&other, "c", in_a_week()).await.unwrap();

        store.delete_by_token("a").await.unwrap();
        store.delete_by_token("a").await.unwrap();
        store.delete_all_for_user(&user).await.unwrap();
        store.delete_all_for_user(&user).await.unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert!(store.get_by_token("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_expired_keeps_live_rows() {
        let store = MemoryRefreshTokenStore::new();
        let user = UserId::generate();
        store
            .save(&user, "old", Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
        store.save(&user, "live", in_a_week()).await.unwrap();

        assert_eq!(store.delete_expired().await.unwrap(), 1);
        assert!(store.get_by_token("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn user_emails_are_unique_ignoring_case() {
        let users = MemoryUserStore::new();
        let email = Email::parse("Ana@Example.com").unwrap();
        let created = users.create_user(&email, Some("Ana"), None).await.unwrap();
        assert_eq!(created.email.as_str(), "Ana@Example.com");

        let shouted = Email::parse("ANA@EXAMPLE.COM").unwrap();
        let err = users.create_user(&shouted, None, None).await.unwrap_err();
        assert!(matches!(err, AuthError::EmailAlreadyExists));

        let found = users.find_by_email(&shouted).await.unwrap().unwrap();
        assert_eq!(found.user.id, created.id);
        assert!(found.password_hash.is_none());
    }
}
