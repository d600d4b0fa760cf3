//! Authentication domain models.
//!
//! These are internal domain models, distinct from the API DTOs
//! (which have `#[serde(rename)]` for camelCase etc.).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role granted to every newly registered principal.
pub const DEFAULT_ROLE: &str = "USER";

/// Domain principal (a registered user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Role names, e.g. `["USER"]`.
    pub roles: Vec<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

/// Input for creating a principal.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub roles: Vec<String>,
    pub created_by: Option<String>,
}

/// Mark a principal as deleted on behalf of `actor_id`.
///
/// Returns the updated value; persisting it is the caller's job.
pub fn soft_delete(principal: Principal, actor_id: Uuid, now: DateTime<Utc>) -> Principal {
    Principal {
        is_deleted: true,
        deleted_at: Some(now),
        deleted_by: Some(actor_id),
        ..principal
    }
}

/// Session token record stored in the database.
///
/// Only the SHA-256 digest of the signed token is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokenRecord {
    pub id: Uuid,
    pub principal_id: Uuid,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl SessionTokenRecord {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }
}

/// Single-use password reset token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub principal_id: Uuid,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

impl PasswordResetToken {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.used && now < self.expires_at
    }
}

/// Discriminates the two signed token shapes so one can never be
/// accepted in place of the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Session,
    ProjectAccess,
}

/// JWT claims embedded in session tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: username (standard JWT `sub` claim).
    pub sub: String,
    /// Principal ID.
    pub uid: Uuid,
    /// Role names granted at issuance.
    pub roles: Vec<String>,
    /// Resolved permission names at issuance.
    pub permissions: Vec<String>,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Unique token ID; two tokens issued in the same second still differ.
    pub jti: Uuid,
    pub typ: TokenKind,
}

/// Role a principal holds within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectRole {
    Owner,
    Admin,
    User,
}

impl ProjectRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectRole::Owner => "OWNER",
            ProjectRole::Admin => "ADMIN",
            ProjectRole::User => "USER",
        }
    }

    /// Whether this role may mint, list and revoke project tokens.
    pub fn can_manage_tokens(&self) -> bool {
        matches!(self, ProjectRole::Owner | ProjectRole::Admin)
    }
}

impl std::fmt::Display for ProjectRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProjectRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OWNER" => Ok(ProjectRole::Owner),
            "ADMIN" => Ok(ProjectRole::Admin),
            "USER" => Ok(ProjectRole::User),
            other => Err(format!("unknown project role: {other}")),
        }
    }
}

/// Project as seen by the token engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub key: String,
    pub name: String,
}

/// JWT claims embedded in project access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectClaims {
    /// Always `"project_access"`.
    pub sub: String,
    /// Principal that minted the token.
    pub uid: Uuid,
    pub project_id: Uuid,
    pub role: ProjectRole,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
    pub typ: TokenKind,
}

/// Project access token record stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAccessTokenRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub issued_by: Uuid,
    pub role: ProjectRole,
    pub description: Option<String>,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl ProjectAccessTokenRecord {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        Principal {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: "hash".into(),
            roles: vec![DEFAULT_ROLE.to_string()],
            created_by: None,
            created_at: Utc::now(),
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
        }
    }

    #[test]
    fn soft_delete_records_actor_and_time() {
        let p = principal();
        let actor = Uuid::new_v4();
        let now = Utc::now();
        let deleted = soft_delete(p.clone(), actor, now);
        assert!(deleted.is_deleted);
        assert_eq!(deleted.deleted_by, Some(actor));
        assert_eq!(deleted.deleted_at, Some(now));
        assert_eq!(deleted.username, p.username);
        assert!(!p.is_deleted);
    }

    #[test]
    fn session_record_validity_window() {
        let now = Utc::now();
        let mut record = SessionTokenRecord {
            id: Uuid::new_v4(),
            principal_id: Uuid::new_v4(),
            token_hash: "h".into(),
            issued_at: now,
            expires_at: now + chrono::Duration::seconds(10),
            revoked: false,
            revoked_at: None,
        };
        assert!(record.is_valid(now));
        assert!(!record.is_valid(record.expires_at));
        record.revoked = true;
        assert!(!record.is_valid(now));
    }

    #[test]
    fn project_role_parses_wire_names() {
        assert_eq!("OWNER".parse::<ProjectRole>(), Ok(ProjectRole::Owner));
        assert!("owner".parse::<ProjectRole>().is_err());
        assert_eq!(
            serde_json::to_string(&ProjectRole::Admin).unwrap(),
            "\"ADMIN\""
        );
        assert!(ProjectRole::Owner.can_manage_tokens());
        assert!(ProjectRole::Admin.can_manage_tokens());
        assert!(!ProjectRole::User.can_manage_tokens());
    }
}
