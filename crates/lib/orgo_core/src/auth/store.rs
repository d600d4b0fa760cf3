//! Durable session-token store interface.
//!
//! The store is the source of truth for token validity. Implementations:
//! [`super::queries::PgTokenStore`] and [`super::memory::MemoryTokenStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::AuthError;
use crate::models::auth::SessionTokenRecord;

/// Persisted record of every issued session token, keyed by token digest.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert a freshly issued record.
    async fn save(&self, record: &SessionTokenRecord) -> Result<(), AuthError>;

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<SessionTokenRecord>, AuthError>;

    /// Record for `token_hash` iff it is not revoked and `now < expires_at`.
    async fn find_valid(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionTokenRecord>, AuthError>;

    /// All valid records for a principal, newest first.
    async fn find_active_by_principal(
        &self,
        principal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionTokenRecord>, AuthError>;

    /// Flip the revoked flag. Idempotent: returns `false` when the record is
    /// missing or already revoked.
    async fn revoke(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, AuthError>;

    /// Revoke every unrevoked record of a principal in one statement.
    async fn revoke_all_for_principal(
        &self,
        principal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError>;

    /// Delete records that expired before `threshold`.
    async fn purge_expired_before(&self, threshold: DateTime<Utc>) -> Result<u64, AuthError>;
}
