//! Principal and password-reset persistence interface.
//!
//! Principals are owned by user management; the token engine reads them,
//! creates them at registration and updates only the password hash (during
//! reset) and the deletion markers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::AuthError;
use crate::models::auth::{NewPrincipal, PasswordResetToken, Principal};

#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Create a principal with its roles. Duplicate username or email
    /// fails with [`AuthError::Conflict`].
    async fn create(&self, new: NewPrincipal) -> Result<Principal, AuthError>;

    async fn find_active_by_username(&self, username: &str) -> Result<Option<Principal>, AuthError>;

    async fn find_active_by_email(&self, email: &str) -> Result<Option<Principal>, AuthError>;

    async fn find_active_by_id(&self, id: Uuid) -> Result<Option<Principal>, AuthError>;

    /// Persist the deletion markers of a soft-deleted principal.
    async fn save_deleted(&self, principal: &Principal) -> Result<(), AuthError>;

    /// Remove a principal outright. Returns `false` if it did not exist.
    async fn hard_delete(&self, id: Uuid) -> Result<bool, AuthError>;

    async fn insert_reset_token(&self, token: &PasswordResetToken) -> Result<(), AuthError>;

    async fn find_reset_token(&self, token_hash: &str) -> Result<Option<PasswordResetToken>, AuthError>;

    /// Mark the reset token used and replace the password hash in one
    /// atomic step. Returns `false`, changing nothing, when the token is
    /// unknown, used, expired, or its principal is gone.
    async fn redeem_reset_token(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError>;
}
