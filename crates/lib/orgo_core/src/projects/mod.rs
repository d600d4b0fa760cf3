//! Projects and project-scoped access tokens.
//!
//! Project CRUD lives elsewhere; the token issuer only needs to resolve a
//! project by key and read the requester's membership role.

pub mod memory;
pub mod queries;
pub mod tokens;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::AuthError;
use crate::models::auth::{Project, ProjectRole};

/// Read access to projects and their memberships.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    /// Create a project with `owner` as its OWNER member.
    ///
    /// Fails with `Conflict` when the key is taken.
    async fn create_project(&self, key: &str, name: &str, owner: Uuid) -> Result<Project, AuthError>;

    /// Add or update a membership.
    async fn set_member(
        &self,
        project_id: Uuid,
        principal_id: Uuid,
        role: ProjectRole,
    ) -> Result<(), AuthError>;

    async fn find_project_by_key(&self, key: &str) -> Result<Option<Project>, AuthError>;

    /// The principal's role on the project, if a member.
    async fn member_role(
        &self,
        project_id: Uuid,
        principal_id: Uuid,
    ) -> Result<Option<ProjectRole>, AuthError>;
}
