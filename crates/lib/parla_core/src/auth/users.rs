//! User credential persistence.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{AuthError, AuthResult};
use crate::models::auth::{Email, User, UserId, UserWithPassword};

/// Storage of user credentials.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user. Fails with [`AuthError::EmailAlreadyExists`] when the
    /// email (compared case-insensitively) is taken.
    async fn create_user(
        &self,
        email: &Email,
        name: Option<&str>,
        password_hash: Option<&str>,
    ) -> AuthResult<User>;

    /// Fetch a user and their password hash by email.
    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<UserWithPassword>>;

    /// Fetch a user by id.
    async fn find_by_id(&self, id: &UserId) -> AuthResult<Option<User>>;
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: Option<String>,
    password_hash: Option<String>,
}

impl UserRow {
    fn into_user_with_password(self) -> AuthResult<UserWithPassword> {
        let email = Email::parse(&self.email)
            .map_err(|_| AuthError::Internal(format!("stored email for {} is invalid", self.id)))?;
        Ok(UserWithPassword {
            user: User {
                id: UserId::from_uuid(self.id),
                email,
                name: self.name,
            },
            password_hash: self.password_hash,
        })
    }
}

/// PostgreSQL-backed [`UserStore`] over the `users` table.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create_user(
        &self,
        email: &Email,
        name: Option<&str>,
        password_hash: Option<&str>,
    ) -> AuthResult<User> {
        let result = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (email, name, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, name, password_hash
            "#,
        )
        .bind(email.as_str())
        .bind(name)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(row)) => Ok(row.into_user_with_password()?.user),
            Ok(None) => Err(AuthError::InsertFailed),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AuthError::EmailAlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<UserWithPassword>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, password_hash FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(UserRow::into_user_with_password).transpose()
    }

    async fn find_by_id(&self, id: &UserId) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, password_hash FROM users WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row
            .map(UserRow::into_user_with_password)
            .transpose()?
            .map(|u| u.user))
    }
}
