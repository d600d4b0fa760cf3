//! Project directory and project token queries (PostgreSQL).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::ProjectDirectory;
use super::tokens::ProjectTokenStore;
use crate::auth::AuthError;
use crate::models::auth::{Project, ProjectAccessTokenRecord, ProjectRole};

fn parse_role(raw: &str) -> Result<ProjectRole, AuthError> {
    raw.parse().map_err(AuthError::Internal)
}

/// Projects and memberships in `projects` / `project_users`.
#[derive(Clone)]
pub struct PgProjectDirectory {
    pool: PgPool,
}

impl PgProjectDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectDirectory for PgProjectDirectory {
    async fn create_project(&self, key: &str, name: &str, owner: Uuid) -> Result<Project, AuthError> {
        let mut tx = self.pool.begin().await?;
        let (id,) = sqlx::query_as::<_, (Uuid,)>(
            "INSERT INTO projects (id, project_key, name) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(Uuid::now_v7())
        .bind(key)
        .bind(name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AuthError::Conflict(format!("Project key {key} already exists"))
            }
            _ => AuthError::DbError(e),
        })?;

        sqlx::query("INSERT INTO project_users (project_id, user_id, role) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(owner)
            .bind(ProjectRole::Owner.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Project {
            id,
            key: key.to_string(),
            name: name.to_string(),
        })
    }

    async fn set_member(
        &self,
        project_id: Uuid,
        principal_id: Uuid,
        role: ProjectRole,
    ) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO project_users (project_id, user_id, role) VALUES ($1, $2, $3) \
             ON CONFLICT (project_id, user_id) DO UPDATE SET role = EXCLUDED.role",
        )
        .bind(project_id)
        .bind(principal_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_project_by_key(&self, key: &str) -> Result<Option<Project>, AuthError> {
        let row = sqlx::query_as::<_, (Uuid, String, String)>(
            "SELECT id, project_key, name FROM projects WHERE project_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, key, name)| Project { id, key, name }))
    }

    async fn member_role(
        &self,
        project_id: Uuid,
        principal_id: Uuid,
    ) -> Result<Option<ProjectRole>, AuthError> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT role FROM project_users WHERE project_id = $1 AND user_id = $2",
        )
        .bind(project_id)
        .bind(principal_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(role,)| parse_role(&role)).transpose()
    }
}

const PROJECT_TOKEN_COLUMNS: &str =
    "id, project_id, issued_by, role, description, token_hash, created_at, expires_at, is_revoked";

#[derive(FromRow)]
struct ProjectTokenRow {
    id: Uuid,
    project_id: Uuid,
    issued_by: Uuid,
    role: String,
    description: Option<String>,
    token_hash: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_revoked: bool,
}

impl TryFrom<ProjectTokenRow> for ProjectAccessTokenRecord {
    type Error = AuthError;

    fn try_from(row: ProjectTokenRow) -> Result<Self, Self::Error> {
        Ok(ProjectAccessTokenRecord {
            id: row.id,
            project_id: row.project_id,
            issued_by: row.issued_by,
            role: parse_role(&row.role)?,
            description: row.description,
            token_hash: row.token_hash,
            created_at: row.created_at,
            expires_at: row.expires_at,
            revoked: row.is_revoked,
        })
    }
}

fn into_records(rows: Vec<ProjectTokenRow>) -> Result<Vec<ProjectAccessTokenRecord>, AuthError> {
    rows.into_iter().map(TryInto::try_into).collect()
}

/// Project tokens in `project_access_tokens`.
#[derive(Clone)]
pub struct PgProjectTokenStore {
    pool: PgPool,
}

impl PgProjectTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectTokenStore for PgProjectTokenStore {
    async fn save(&self, record: &ProjectAccessTokenRecord) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO project_access_tokens \
             (id, project_id, issued_by, role, description, token_hash, created_at, expires_at, is_revoked) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.id)
        .bind(record.project_id)
        .bind(record.issued_by)
        .bind(record.role.as_str())
        .bind(&record.description)
        .bind(&record.token_hash)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.revoked)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ProjectAccessTokenRecord>, AuthError> {
        let row = sqlx::query_as::<_, ProjectTokenRow>(&format!(
            "SELECT {PROJECT_TOKEN_COLUMNS} FROM project_access_tokens WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ProjectAccessTokenRecord>, AuthError> {
        let row = sqlx::query_as::<_, ProjectTokenRow>(&format!(
            "SELECT {PROJECT_TOKEN_COLUMNS} FROM project_access_tokens WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<ProjectAccessTokenRecord>, AuthError> {
        let rows = sqlx::query_as::<_, ProjectTokenRow>(&format!(
            "SELECT {PROJECT_TOKEN_COLUMNS} FROM project_access_tokens \
             WHERE project_id = $1 AND is_revoked = false \
             ORDER BY created_at DESC"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        into_records(rows)
    }

    async fn list_issued_by(
        &self,
        principal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProjectAccessTokenRecord>, AuthError> {
        let rows = sqlx::query_as::<_, ProjectTokenRow>(&format!(
            "SELECT {PROJECT_TOKEN_COLUMNS} FROM project_access_tokens \
             WHERE issued_by = $1 AND is_revoked = false AND expires_at > $2 \
             ORDER BY created_at DESC"
        ))
        .bind(principal_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        into_records(rows)
    }

    async fn revoke(&self, id: Uuid) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE project_access_tokens SET is_revoked = true WHERE id = $1 AND is_revoked = false",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_issued_by(&self, principal_id: Uuid) -> Result<u64, AuthError> {
        let result = sqlx::query(
            "UPDATE project_access_tokens SET is_revoked = true \
             WHERE issued_by = $1 AND is_revoked = false",
        )
        .bind(principal_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
