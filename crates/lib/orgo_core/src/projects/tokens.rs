//! Project access tokens.
//!
//! A project token delegates access to one project at one role. It is signed
//! with the same codec as session tokens but lives in its own table, so bulk
//! session revocation never touches it and vice versa.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::ProjectDirectory;
use crate::auth::jwt::TokenCodec;
use crate::auth::{AuthError, bounded, hash_token};
use crate::clock::Clock;
use crate::models::auth::{
    Project, ProjectAccessTokenRecord, ProjectClaims, ProjectRole, SessionClaims, TokenKind,
};

/// Lifetime used when the caller does not pick one.
pub const DEFAULT_TTL_DAYS: i64 = 30;
/// Upper bound on requested lifetimes.
pub const MAX_TTL_DAYS: i64 = 3650;

const PROJECT_ACCESS_SUBJECT: &str = "project_access";

/// Durable storage for project access token records.
#[async_trait]
pub trait ProjectTokenStore: Send + Sync {
    async fn save(&self, record: &ProjectAccessTokenRecord) -> Result<(), AuthError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ProjectAccessTokenRecord>, AuthError>;

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ProjectAccessTokenRecord>, AuthError>;

    /// Non-revoked records of a project, newest first.
    async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<ProjectAccessTokenRecord>, AuthError>;

    /// Records minted by `principal_id` that are still valid at `now`, newest first.
    async fn list_issued_by(
        &self,
        principal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProjectAccessTokenRecord>, AuthError>;

    /// Flip the revoked flag. Returns `false` if already revoked or unknown.
    async fn revoke(&self, id: Uuid) -> Result<bool, AuthError>;

    /// Revoke every non-revoked record minted by `principal_id`.
    async fn revoke_all_issued_by(&self, principal_id: Uuid) -> Result<u64, AuthError>;
}

/// Input for [`ProjectTokenIssuer::generate`].
#[derive(Debug, Clone)]
pub struct ProjectTokenRequest {
    pub project_key: String,
    pub role: ProjectRole,
    pub description: Option<String>,
    pub ttl_days: Option<i64>,
}

/// A freshly minted project token. `token` is only ever returned here.
#[derive(Debug, Clone)]
pub struct IssuedProjectToken {
    pub token: String,
    pub record: ProjectAccessTokenRecord,
}

pub struct ProjectTokenIssuer {
    codec: Arc<TokenCodec>,
    directory: Arc<dyn ProjectDirectory>,
    store: Arc<dyn ProjectTokenStore>,
    clock: Arc<dyn Clock>,
    store_timeout: StdDuration,
}

impl ProjectTokenIssuer {
    pub fn new(
        codec: Arc<TokenCodec>,
        directory: Arc<dyn ProjectDirectory>,
        store: Arc<dyn ProjectTokenStore>,
        clock: Arc<dyn Clock>,
        store_timeout: StdDuration,
    ) -> Self {
        Self {
            codec,
            directory,
            store,
            clock,
            store_timeout,
        }
    }

    /// Resolve the project and make sure `requester` is an OWNER or ADMIN of it.
    async fn authorize(
        &self,
        project_key: &str,
        requester: &SessionClaims,
    ) -> Result<(Project, ProjectRole), AuthError> {
        let project = bounded(
            self.store_timeout,
            "project directory",
            self.directory.find_project_by_key(project_key),
        )
        .await?
        .ok_or_else(|| AuthError::NotFound(format!("Project {project_key} not found")))?;

        let role = bounded(
            self.store_timeout,
            "project directory",
            self.directory.member_role(project.id, requester.uid),
        )
        .await?
        .ok_or_else(|| AuthError::Forbidden("Not a member of this project".into()))?;

        if !role.can_manage_tokens() {
            return Err(AuthError::Forbidden(
                "Only project owners and admins can manage access tokens".into(),
            ));
        }
        Ok((project, role))
    }

    /// Mint a project token.
    ///
    /// Only OWNER and ADMIN members may mint; an OWNER-level token can only
    /// be minted by an OWNER.
    pub async fn generate(
        &self,
        request: ProjectTokenRequest,
        requester: &SessionClaims,
    ) -> Result<IssuedProjectToken, AuthError> {
        let ttl_days = request.ttl_days.unwrap_or(DEFAULT_TTL_DAYS);
        if !(1..=MAX_TTL_DAYS).contains(&ttl_days) {
            return Err(AuthError::ValidationError(format!(
                "ttlDays must be between 1 and {MAX_TTL_DAYS}"
            )));
        }

        let (project, requester_role) = self.authorize(&request.project_key, requester).await?;
        if request.role == ProjectRole::Owner && requester_role != ProjectRole::Owner {
            return Err(AuthError::Forbidden(
                "Only project owners can issue OWNER tokens".into(),
            ));
        }

        let now = self.clock.now();
        let expires_at = now + Duration::days(ttl_days);
        let claims = ProjectClaims {
            sub: PROJECT_ACCESS_SUBJECT.to_string(),
            uid: requester.uid,
            project_id: project.id,
            role: request.role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
            typ: TokenKind::ProjectAccess,
        };
        let token = self.codec.issue(&claims)?;
        let record = ProjectAccessTokenRecord {
            id: Uuid::now_v7(),
            project_id: project.id,
            issued_by: requester.uid,
            role: request.role,
            description: request.description,
            token_hash: hash_token(&token),
            created_at: now,
            expires_at,
            revoked: false,
        };

        // Detached so a cancelled caller still leaves a consistent record.
        let store = self.store.clone();
        let limit = self.store_timeout;
        let to_save = record.clone();
        tokio::spawn(async move { bounded(limit, "project token store", store.save(&to_save)).await })
            .await
            .map_err(|e| AuthError::Internal(format!("issuance task: {e}")))??;

        info!(
            project = %project.key,
            token_id = %record.id,
            role = %record.role,
            issued_by = %requester.uid,
            "issued project access token"
        );
        Ok(IssuedProjectToken { token, record })
    }

    /// Non-revoked tokens of a project. Same gate as [`generate`](Self::generate).
    pub async fn list_for_project(
        &self,
        project_key: &str,
        requester: &SessionClaims,
    ) -> Result<Vec<ProjectAccessTokenRecord>, AuthError> {
        let (project, _) = self.authorize(project_key, requester).await?;
        bounded(
            self.store_timeout,
            "project token store",
            self.store.list_for_project(project.id),
        )
        .await
    }

    /// Revoke one token of a project.
    ///
    /// A token that exists but belongs to another project is `NotFound`.
    pub async fn revoke(
        &self,
        project_key: &str,
        token_id: Uuid,
        requester: &SessionClaims,
    ) -> Result<(), AuthError> {
        let (project, _) = self.authorize(project_key, requester).await?;
        let record = bounded(
            self.store_timeout,
            "project token store",
            self.store.find_by_id(token_id),
        )
        .await?
        .filter(|r| r.project_id == project.id)
        .ok_or_else(|| AuthError::NotFound("Token not found in this project".into()))?;

        let flipped = bounded(
            self.store_timeout,
            "project token store",
            self.store.revoke(record.id),
        )
        .await?;
        info!(project = %project.key, token_id = %record.id, flipped, "revoked project access token");
        Ok(())
    }

    /// Valid tokens the requester minted, across all projects.
    pub async fn list_for_user(
        &self,
        requester: &SessionClaims,
    ) -> Result<Vec<ProjectAccessTokenRecord>, AuthError> {
        bounded(
            self.store_timeout,
            "project token store",
            self.store.list_issued_by(requester.uid, self.clock.now()),
        )
        .await
    }

    /// Revoke every token the requester minted.
    pub async fn revoke_all_for_user(&self, requester: &SessionClaims) -> Result<u64, AuthError> {
        let count = bounded(
            self.store_timeout,
            "project token store",
            self.store.revoke_all_issued_by(requester.uid),
        )
        .await?;
        info!(principal_id = %requester.uid, count, "revoked own project access tokens");
        Ok(count)
    }

    /// Decode `token` and check its record.
    ///
    /// `Ok(None)` for any invalid token; `Err` only when the store fails.
    pub async fn validate(&self, token: &str) -> Result<Option<ProjectClaims>, AuthError> {
        let now = self.clock.now();
        let claims = match self.codec.decode::<ProjectClaims>(token, now) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(reason = %e, "project token rejected by codec");
                return Ok(None);
            }
        };
        let record = bounded(
            self.store_timeout,
            "project token store",
            self.store.find_by_hash(&hash_token(token)),
        )
        .await?;
        Ok(record
            .filter(|r| r.is_valid(now) && r.project_id == claims.project_id)
            .map(|_| claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::projects::memory::{MemoryProjectDirectory, MemoryProjectTokenStore};

    struct Fixture {
        clock: Arc<ManualClock>,
        directory: Arc<MemoryProjectDirectory>,
        issuer: ProjectTokenIssuer,
        project: Project,
        owner: SessionClaims,
    }

    fn claims_for(uid: Uuid) -> SessionClaims {
        SessionClaims {
            sub: uid.to_string(),
            uid,
            roles: vec!["USER".into()],
            permissions: vec!["READ".into()],
            iat: 0,
            exp: i64::MAX,
            jti: Uuid::new_v4(),
            typ: TokenKind::Session,
        }
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let directory = Arc::new(MemoryProjectDirectory::new());
        let owner = claims_for(Uuid::new_v4());
        let project = directory.create_project("P", "Project P", owner.uid).await.unwrap();
        let issuer = ProjectTokenIssuer::new(
            Arc::new(TokenCodec::new(b"test-secret")),
            directory.clone(),
            Arc::new(MemoryProjectTokenStore::new()),
            clock.clone(),
            StdDuration::from_secs(1),
        );
        Fixture {
            clock,
            directory,
            issuer,
            project,
            owner,
        }
    }

    async fn member(f: &Fixture, role: ProjectRole) -> SessionClaims {
        let claims = claims_for(Uuid::new_v4());
        f.directory.set_member(f.project.id, claims.uid, role).await.unwrap();
        claims
    }

    fn request(role: ProjectRole) -> ProjectTokenRequest {
        ProjectTokenRequest {
            project_key: "P".into(),
            role,
            description: None,
            ttl_days: None,
        }
    }

    #[tokio::test]
    async fn owner_issues_with_default_ttl() {
        let f = fixture().await;
        let now = f.clock.now();
        let user_token = f
            .issuer
            .generate(
                ProjectTokenRequest {
                    ttl_days: Some(30),
                    description: Some("ci".into()),
                    ..request(ProjectRole::User)
                },
                &f.owner,
            )
            .await
            .unwrap();
        let expected = now + Duration::days(30);
        assert!((user_token.record.expires_at - expected).num_milliseconds().abs() < 1000);

        let admin_token = f.issuer.generate(request(ProjectRole::Admin), &f.owner).await.unwrap();
        assert_eq!(admin_token.record.expires_at, user_token.record.expires_at);

        f.issuer
            .revoke("P", user_token.record.id, &f.owner)
            .await
            .unwrap();
        assert!(f.issuer.validate(&user_token.token).await.unwrap().is_none());
        let claims = f.issuer.validate(&admin_token.token).await.unwrap().unwrap();
        assert_eq!(claims.role, ProjectRole::Admin);
        assert_eq!(claims.project_id, f.project.id);
    }

    #[tokio::test]
    async fn owner_may_mint_any_role() {
        let f = fixture().await;
        for role in [ProjectRole::Owner, ProjectRole::Admin, ProjectRole::User] {
            f.issuer.generate(request(role), &f.owner).await.unwrap();
        }
    }

    #[tokio::test]
    async fn user_member_cannot_mint() {
        let f = fixture().await;
        let user = member(&f, ProjectRole::User).await;
        assert!(matches!(
            f.issuer.generate(request(ProjectRole::Admin), &user).await,
            Err(AuthError::Forbidden(_))
        ));
        assert!(matches!(
            f.issuer.list_for_project("P", &user).await,
            Err(AuthError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn admin_cannot_mint_owner() {
        let f = fixture().await;
        let admin = member(&f, ProjectRole::Admin).await;
        assert!(matches!(
            f.issuer.generate(request(ProjectRole::Owner), &admin).await,
            Err(AuthError::Forbidden(_))
        ));
        f.issuer.generate(request(ProjectRole::Admin), &admin).await.unwrap();
    }

    #[tokio::test]
    async fn non_member_is_forbidden_and_unknown_project_not_found() {
        let f = fixture().await;
        let stranger = claims_for(Uuid::new_v4());
        assert!(matches!(
            f.issuer.generate(request(ProjectRole::User), &stranger).await,
            Err(AuthError::Forbidden(_))
        ));
        assert!(matches!(
            f.issuer
                .generate(
                    ProjectTokenRequest {
                        project_key: "missing".into(),
                        ..request(ProjectRole::User)
                    },
                    &f.owner
                )
                .await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn ttl_days_must_be_positive() {
        let f = fixture().await;
        for ttl in [0, -1, MAX_TTL_DAYS + 1] {
            assert!(matches!(
                f.issuer
                    .generate(
                        ProjectTokenRequest {
                            ttl_days: Some(ttl),
                            ..request(ProjectRole::User)
                        },
                        &f.owner
                    )
                    .await,
                Err(AuthError::ValidationError(_))
            ));
        }
    }

    #[tokio::test]
    async fn revoke_from_wrong_project_is_not_found() {
        let f = fixture().await;
        f.directory.create_project("Q", "Project Q", f.owner.uid).await.unwrap();
        let issued = f.issuer.generate(request(ProjectRole::User), &f.owner).await.unwrap();
        assert!(matches!(
            f.issuer.revoke("Q", issued.record.id, &f.owner).await,
            Err(AuthError::NotFound(_))
        ));
        assert!(f.issuer.validate(&issued.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn listing_skips_revoked() {
        let f = fixture().await;
        let a = f.issuer.generate(request(ProjectRole::User), &f.owner).await.unwrap();
        f.issuer.generate(request(ProjectRole::User), &f.owner).await.unwrap();
        f.issuer.revoke("P", a.record.id, &f.owner).await.unwrap();
        let listed = f.issuer.list_for_project("P", &f.owner).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed.iter().all(|r| r.id != a.record.id));
    }

    #[tokio::test]
    async fn self_service_list_and_revoke_all() {
        let f = fixture().await;
        let admin = member(&f, ProjectRole::Admin).await;
        let mine = f.issuer.generate(request(ProjectRole::User), &admin).await.unwrap();
        let theirs = f.issuer.generate(request(ProjectRole::User), &f.owner).await.unwrap();

        let listed = f.issuer.list_for_user(&admin).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, mine.record.id);

        assert_eq!(f.issuer.revoke_all_for_user(&admin).await.unwrap(), 1);
        assert!(f.issuer.validate(&mine.token).await.unwrap().is_none());
        assert!(f.issuer.validate(&theirs.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn token_expires() {
        let f = fixture().await;
        let issued = f
            .issuer
            .generate(
                ProjectTokenRequest {
                    ttl_days: Some(1),
                    ..request(ProjectRole::User)
                },
                &f.owner,
            )
            .await
            .unwrap();
        f.clock.advance(Duration::days(1));
        assert!(f.issuer.validate(&issued.token).await.unwrap().is_none());
        assert!(f.issuer.list_for_user(&f.owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn session_token_is_not_a_project_token() {
        let f = fixture().await;
        let codec = TokenCodec::new(b"test-secret");
        let session = codec.issue(&claims_for(f.owner.uid)).unwrap();
        assert!(f.issuer.validate(&session).await.unwrap().is_none());
    }
}
