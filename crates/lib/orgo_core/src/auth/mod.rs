//! Authentication and authorization logic.
//!
//! Provides the credential codec, token stores and cache, the session
//! lifecycle, RBAC evaluation, password handling and account flows shared
//! by `orgo_api` and the server binary.

pub mod cache;
pub mod jwt;
pub mod memory;
pub mod password;
pub mod password_reset;
pub mod principals;
pub mod queries;
pub mod rbac;
pub mod service;
pub mod session;
pub mod store;

use std::future::Future;
use std::time::Duration;

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad username/password or a bad, expired or malformed token.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Store/cache failures; safe to retry for reads.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AuthError::DbError(_) | AuthError::Timeout(_) | AuthError::Internal(_)
        )
    }
}

/// SHA-256 hash a token for storage and cache keys.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Run a store call with an upper bound on its duration.
pub(crate) async fn bounded<T, F>(limit: Duration, what: &'static str, fut: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, AuthError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| AuthError::Timeout(what))?
}
