//! Request and response bodies. JSON field names are camelCase.

use chrono::{DateTime, Utc};
use orgo_core::models::auth::{Principal, ProjectAccessTokenRecord, ProjectRole};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// `None` when running without a database.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_connected: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Principal> for UserResponse {
    fn from(p: Principal) -> Self {
        Self {
            id: p.id,
            username: p.username,
            email: p.email,
            roles: p.roles,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RevokedResponse {
    pub revoked: u64,
}

#[derive(Debug, Deserialize)]
pub struct RoleQuery {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct PermissionQuery {
    pub permission: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordResponse {
    pub message: String,
    pub expires_at: DateTime<Utc>,
    /// Only present when the deployment exposes reset tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetTokenStatus {
    pub valid: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectTokenRequest {
    pub role: ProjectRole,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ttl_days: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTokenInfo {
    pub id: Uuid,
    pub project_id: Uuid,
    pub issued_by: Uuid,
    pub role: ProjectRole,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl From<ProjectAccessTokenRecord> for ProjectTokenInfo {
    fn from(r: ProjectAccessTokenRecord) -> Self {
        Self {
            id: r.id,
            project_id: r.project_id,
            issued_by: r.issued_by,
            role: r.role,
            description: r.description,
            created_at: r.created_at,
            expires_at: r.expires_at,
            revoked: r.revoked,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateProjectTokenResponse {
    pub token: String,
    #[serde(flatten)]
    pub info: ProjectTokenInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectTokenListResponse {
    pub tokens: Vec<ProjectTokenInfo>,
}
