//! Account flows: register, login, logout and account deletion.
//!
//! Every operation receives the verified claims of the caller explicitly;
//! nothing here reads ambient request state.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use tracing::info;
use uuid::Uuid;

use super::password::{hash_password, require_password, verify_dummy_password, verify_password};
use super::principals::PrincipalStore;
use super::rbac::has_permission;
use super::session::{IssuedSession, SessionManager};
use super::{AuthError, bounded};
use crate::clock::Clock;
use crate::config::DeleteScheme;
use crate::models::auth::{DEFAULT_ROLE, NewPrincipal, Principal, SessionClaims, soft_delete};

/// Permission required to delete another principal's account.
pub const MANAGE_USERS: &str = "MANAGE_USERS";

/// Registration input.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub created_by: Option<String>,
}

/// A principal together with the session token just issued for it.
#[derive(Debug, Clone)]
pub struct Session {
    pub principal: Principal,
    pub issued: IssuedSession,
}

pub struct Authenticator {
    principals: Arc<dyn PrincipalStore>,
    sessions: Arc<SessionManager>,
    clock: Arc<dyn Clock>,
    delete_scheme: DeleteScheme,
    store_timeout: StdDuration,
}

impl Authenticator {
    pub fn new(
        principals: Arc<dyn PrincipalStore>,
        sessions: Arc<SessionManager>,
        clock: Arc<dyn Clock>,
        delete_scheme: DeleteScheme,
        store_timeout: StdDuration,
    ) -> Self {
        Self {
            principals,
            sessions,
            clock,
            delete_scheme,
            store_timeout,
        }
    }

    /// Create an account with the default role and issue its first token.
    pub async fn register(&self, account: NewAccount) -> Result<Session, AuthError> {
        if account.username.trim().is_empty() || account.email.trim().is_empty() {
            return Err(AuthError::ValidationError(
                "Username and email are required".into(),
            ));
        }
        require_password(&account.password)?;
        if !self.sessions.roles().contains_role(DEFAULT_ROLE) {
            return Err(AuthError::Internal(format!(
                "default role {DEFAULT_ROLE} missing from role table"
            )));
        }

        let password_hash = hash_password(&account.password)?;
        let principal = bounded(
            self.store_timeout,
            "principal store",
            self.principals.create(NewPrincipal {
                username: account.username,
                email: account.email,
                password_hash,
                roles: vec![DEFAULT_ROLE.to_string()],
                created_by: account.created_by,
            }),
        )
        .await?;
        info!(principal_id = %principal.id, username = %principal.username, "registered principal");

        let issued = self.sessions.issue_for(&principal).await?;
        Ok(Session { principal, issued })
    }

    /// Check username and password, then issue a session token.
    ///
    /// Unknown user and wrong password are indistinguishable to the caller.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let principal = bounded(
            self.store_timeout,
            "principal store",
            self.principals.find_active_by_username(username),
        )
        .await?;
        let Some(principal) = principal else {
            verify_dummy_password(password);
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(password, &principal.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let issued = self.sessions.issue_for(&principal).await?;
        Ok(Session { principal, issued })
    }

    /// Revoke the presented token.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.sessions.revoke(token).await
    }

    /// Revoke every session token of the caller.
    pub async fn logout_all(&self, caller: &SessionClaims) -> Result<u64, AuthError> {
        self.sessions.revoke_all_for_principal(caller.uid).await
    }

    /// The caller's own principal record.
    pub async fn current_user(&self, caller: &SessionClaims) -> Result<Principal, AuthError> {
        bounded(
            self.store_timeout,
            "principal store",
            self.principals.find_active_by_id(caller.uid),
        )
        .await?
        .ok_or_else(|| AuthError::NotFound("User not found".into()))
    }

    /// Delete the caller's own account and revoke all its sessions.
    pub async fn delete_own_account(&self, caller: &SessionClaims) -> Result<(), AuthError> {
        self.delete(caller.uid, caller.uid).await
    }

    /// Delete another principal. Requires the `MANAGE_USERS` permission.
    pub async fn delete_user(&self, target: Uuid, caller: &SessionClaims) -> Result<(), AuthError> {
        if target != caller.uid && !has_permission(caller, MANAGE_USERS) {
            return Err(AuthError::Forbidden(
                "Insufficient permissions to delete users".into(),
            ));
        }
        self.delete(target, caller.uid).await
    }

    async fn delete(&self, target: Uuid, actor: Uuid) -> Result<(), AuthError> {
        let principal = bounded(
            self.store_timeout,
            "principal store",
            self.principals.find_active_by_id(target),
        )
        .await?
        .ok_or_else(|| AuthError::NotFound("User not found".into()))?;

        // Revoke before the principal record changes.
        self.sessions.revoke_all_for_principal(principal.id).await?;

        match self.delete_scheme {
            DeleteScheme::Soft => {
                let deleted = soft_delete(principal, actor, self.clock.now());
                bounded(
                    self.store_timeout,
                    "principal store",
                    self.principals.save_deleted(&deleted),
                )
                .await?;
            }
            DeleteScheme::Hard => {
                bounded(
                    self.store_timeout,
                    "principal store",
                    self.principals.hard_delete(principal.id),
                )
                .await?;
            }
        }
        info!(target = %target, actor = %actor, scheme = ?self.delete_scheme, "deleted principal");
        Ok(())
    }
}
