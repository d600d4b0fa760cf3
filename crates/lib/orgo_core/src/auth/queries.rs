//! Auth-related database queries (PostgreSQL).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::AuthError;
use super::principals::PrincipalStore;
use super::store::TokenStore;
use crate::models::auth::{NewPrincipal, PasswordResetToken, Principal, SessionTokenRecord};

const TOKEN_COLUMNS: &str =
    "id, user_id, token_hash, issued_at, expires_at, is_revoked, revoked_at";

#[derive(FromRow)]
struct TokenRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_revoked: bool,
    revoked_at: Option<DateTime<Utc>>,
}

impl From<TokenRow> for SessionTokenRecord {
    fn from(row: TokenRow) -> Self {
        SessionTokenRecord {
            id: row.id,
            principal_id: row.user_id,
            token_hash: row.token_hash,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            revoked: row.is_revoked,
            revoked_at: row.revoked_at,
        }
    }
}

/// Session tokens in the `tokens` table.
#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn save(&self, record: &SessionTokenRecord) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO tokens (id, user_id, token_hash, issued_at, expires_at, is_revoked, revoked_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.id)
        .bind(record.principal_id)
        .bind(&record.token_hash)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(record.revoked_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<SessionTokenRecord>, AuthError> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn find_valid(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionTokenRecord>, AuthError> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens \
             WHERE token_hash = $1 AND is_revoked = false AND expires_at > $2"
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn find_active_by_principal(
        &self,
        principal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionTokenRecord>, AuthError> {
        let rows = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens \
             WHERE user_id = $1 AND is_revoked = false AND expires_at > $2 \
             ORDER BY issued_at DESC"
        ))
        .bind(principal_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn revoke(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE tokens SET is_revoked = true, revoked_at = $2 \
             WHERE token_hash = $1 AND is_revoked = false",
        )
        .bind(token_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_principal(
        &self,
        principal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let result = sqlx::query(
            "UPDATE tokens SET is_revoked = true, revoked_at = $2 \
             WHERE user_id = $1 AND is_revoked = false",
        )
        .bind(principal_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn purge_expired_before(&self, threshold: DateTime<Utc>) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM tokens WHERE expires_at < $1")
            .bind(threshold)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, created_by, created_at, is_deleted, deleted_at, deleted_by";

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<Uuid>,
}

impl UserRow {
    fn into_principal(self, roles: Vec<String>) -> Principal {
        Principal {
            id: self.id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            roles,
            created_by: self.created_by,
            created_at: self.created_at,
            is_deleted: self.is_deleted,
            deleted_at: self.deleted_at,
            deleted_by: self.deleted_by,
        }
    }
}

#[derive(FromRow)]
struct ResetRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_used: bool,
    used_at: Option<DateTime<Utc>>,
}

impl From<ResetRow> for PasswordResetToken {
    fn from(row: ResetRow) -> Self {
        PasswordResetToken {
            id: row.id,
            principal_id: row.user_id,
            token_hash: row.token_hash,
            created_at: row.created_at,
            expires_at: row.expires_at,
            used: row.is_used,
            used_at: row.used_at,
        }
    }
}

/// Principals in `users` / `user_roles`, reset tokens in `password_reset_tokens`.
#[derive(Clone)]
pub struct PgPrincipalStore {
    pool: PgPool,
}

impl PgPrincipalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch role names for a user.
    async fn roles_of(&self, user_id: Uuid) -> Result<Vec<String>, AuthError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT role FROM user_roles WHERE user_id = $1 ORDER BY role",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Attach roles to a fetched user row.
    async fn hydrate(&self, row: Option<UserRow>) -> Result<Option<Principal>, AuthError> {
        match row {
            Some(row) => {
                let roles = self.roles_of(row.id).await?;
                Ok(Some(row.into_principal(roles)))
            }
            None => Ok(None),
        }
    }
}

/// Map unique-constraint violations to `Conflict`.
fn conflict_on_unique(e: sqlx::Error) -> AuthError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            let what = match db.constraint() {
                Some(c) if c.contains("email") => "Email already exists",
                _ => "Username already exists",
            };
            AuthError::Conflict(what.into())
        }
        _ => AuthError::DbError(e),
    }
}

#[async_trait]
impl PrincipalStore for PgPrincipalStore {
    async fn create(&self, new: NewPrincipal) -> Result<Principal, AuthError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (username, email, password_hash, created_by) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(conflict_on_unique)?;

        for role in &new.roles {
            sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2)")
                .bind(row.id)
                .bind(role)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(row.into_principal(new.roles))
    }

    async fn find_active_by_username(&self, username: &str) -> Result<Option<Principal>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND is_deleted = false"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        self.hydrate(row).await
    }

    async fn find_active_by_email(&self, email: &str) -> Result<Option<Principal>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND is_deleted = false"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        self.hydrate(row).await
    }

    async fn find_active_by_id(&self, id: Uuid) -> Result<Option<Principal>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND is_deleted = false"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        self.hydrate(row).await
    }

    async fn save_deleted(&self, principal: &Principal) -> Result<(), AuthError> {
        sqlx::query(
            "UPDATE users SET is_deleted = $2, deleted_at = $3, deleted_by = $4 WHERE id = $1",
        )
        .bind(principal.id)
        .bind(principal.is_deleted)
        .bind(principal.deleted_at)
        .bind(principal.deleted_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn hard_delete(&self, id: Uuid) -> Result<bool, AuthError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_reset_token(&self, token: &PasswordResetToken) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO password_reset_tokens (id, user_id, token_hash, created_at, expires_at, is_used, used_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(token.id)
        .bind(token.principal_id)
        .bind(&token.token_hash)
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(token.used)
        .bind(token.used_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_reset_token(&self, token_hash: &str) -> Result<Option<PasswordResetToken>, AuthError> {
        let row = sqlx::query_as::<_, ResetRow>(
            "SELECT id, user_id, token_hash, created_at, expires_at, is_used, used_at \
             FROM password_reset_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn redeem_reset_token(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the token serializes concurrent redemptions.
        let user_id = sqlx::query_scalar::<_, Uuid>(
            "UPDATE password_reset_tokens SET is_used = true, used_at = $2 \
             WHERE token_hash = $1 AND is_used = false AND expires_at > $2 \
             RETURNING user_id",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_id) = user_id else {
            tx.rollback().await?;
            return Ok(false);
        };

        let updated = sqlx::query(
            "UPDATE users SET password_hash = $2 WHERE id = $1 AND is_deleted = false",
        )
        .bind(user_id)
        .bind(new_password_hash)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }
}
