//! Password hashing via bcrypt.

use super::{AuthError, AuthResult};

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

/// One-way password hashing.
///
/// `hash` salts every call, so hashing the same password twice yields two
/// different strings. `verify` returns `Ok(false)` on a mismatch and only
/// errors when the hash itself is unusable.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> AuthResult<String>;

    fn verify(&self, password: &str, hash: &str) -> AuthResult<bool>;
}

/// bcrypt-backed [`PasswordHasher`].
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    /// Hasher with the production cost factor.
    pub fn new() -> Self {
        Self { cost: BCRYPT_COST }
    }

    /// Hasher with an explicit cost (tests use bcrypt's minimum of 4).
    pub fn with_cost(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, password: &str) -> AuthResult<String> {
        bcrypt::hash(password, self.cost)
            .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
    }

    fn verify(&self, password: &str, hash: &str) -> AuthResult<bool> {
        bcrypt::verify(password, hash)
            .map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))
    }
}
