//! Single-use password reset tokens.
//!
//! Delivery of the token (email etc.) is the caller's concern. Only the
//! SHA-256 digest of the token is stored.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::info;
use uuid::Uuid;

use super::password::{hash_password, require_password};
use super::principals::PrincipalStore;
use super::{AuthError, bounded, hash_token};
use crate::clock::Clock;
use crate::models::auth::PasswordResetToken;

/// Plaintext reset token handed to the delivery channel.
#[derive(Debug, Clone)]
pub struct ResetTicket {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Generate a random reset token (48 alphanumeric chars).
fn generate_reset_token() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

pub struct PasswordResetService {
    principals: Arc<dyn PrincipalStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    store_timeout: StdDuration,
}

impl PasswordResetService {
    pub fn new(
        principals: Arc<dyn PrincipalStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        store_timeout: StdDuration,
    ) -> Self {
        Self {
            principals,
            clock,
            ttl,
            store_timeout,
        }
    }

    /// Create a reset token for the active principal registered under `email`.
    pub async fn initiate(&self, email: &str) -> Result<ResetTicket, AuthError> {
        let principal = bounded(
            self.store_timeout,
            "principal store",
            self.principals.find_active_by_email(email),
        )
        .await?
        .ok_or_else(|| AuthError::NotFound("User not found".into()))?;

        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AuthError::Internal(format!("reset ttl out of range: {}", self.ttl)))?;
        let token = generate_reset_token();
        let record = PasswordResetToken {
            id: Uuid::now_v7(),
            principal_id: principal.id,
            token_hash: hash_token(&token),
            created_at: now,
            expires_at,
            used: false,
            used_at: None,
        };
        bounded(
            self.store_timeout,
            "principal store",
            self.principals.insert_reset_token(&record),
        )
        .await?;
        info!(principal_id = %principal.id, "password reset initiated");
        Ok(ResetTicket {
            token,
            expires_at: record.expires_at,
        })
    }

    /// Whether `token` is unused and unexpired.
    pub async fn validate(&self, token: &str) -> Result<bool, AuthError> {
        let record = bounded(
            self.store_timeout,
            "principal store",
            self.principals.find_reset_token(&hash_token(token)),
        )
        .await?;
        Ok(record.is_some_and(|r| r.is_valid(self.clock.now())))
    }

    /// Replace the password and consume the token in one step.
    ///
    /// Used, expired or unknown tokens fail with `InvalidCredentials` and
    /// leave the password untouched.
    pub async fn reset(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        require_password(new_password)?;
        let new_hash = hash_password(new_password)?;
        let redeemed = bounded(
            self.store_timeout,
            "principal store",
            self.principals
                .redeem_reset_token(&hash_token(token), &new_hash, self.clock.now()),
        )
        .await?;
        if !redeemed {
            return Err(AuthError::InvalidCredentials);
        }
        info!("password reset completed");
        Ok(())
    }
}
