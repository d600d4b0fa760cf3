//! Wiring of stores, cache and services into one engine.

use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::cache::{MemoryTokenCache, TokenCache};
use crate::auth::jwt::TokenCodec;
use crate::auth::memory::{MemoryPrincipalStore, MemoryTokenStore};
use crate::auth::password_reset::PasswordResetService;
use crate::auth::principals::PrincipalStore;
use crate::auth::queries::{PgPrincipalStore, PgTokenStore};
use crate::auth::service::Authenticator;
use crate::auth::session::{CallTimeouts, SessionManager};
use crate::auth::store::TokenStore;
use crate::clock::Clock;
use crate::config::AuthSettings;
use crate::projects::ProjectDirectory;
use crate::projects::memory::{MemoryProjectDirectory, MemoryProjectTokenStore};
use crate::projects::queries::{PgProjectDirectory, PgProjectTokenStore};
use crate::projects::tokens::{ProjectTokenIssuer, ProjectTokenStore};

/// Storage behind the engine.
#[derive(Clone)]
pub struct Backends {
    pub tokens: Arc<dyn TokenStore>,
    pub principals: Arc<dyn PrincipalStore>,
    pub cache: Arc<dyn TokenCache>,
    pub projects: Arc<dyn ProjectDirectory>,
    pub project_tokens: Arc<dyn ProjectTokenStore>,
}

impl Backends {
    /// Everything in process memory.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: Arc::new(MemoryTokenStore::new()),
            principals: Arc::new(MemoryPrincipalStore::new()),
            cache: Arc::new(MemoryTokenCache::new(clock)),
            projects: Arc::new(MemoryProjectDirectory::new()),
            project_tokens: Arc::new(MemoryProjectTokenStore::new()),
        }
    }

    /// PostgreSQL stores with the given cache in front of session tokens.
    pub fn postgres(pool: PgPool, cache: Arc<dyn TokenCache>) -> Self {
        Self {
            tokens: Arc::new(PgTokenStore::new(pool.clone())),
            principals: Arc::new(PgPrincipalStore::new(pool.clone())),
            cache,
            projects: Arc::new(PgProjectDirectory::new(pool.clone())),
            project_tokens: Arc::new(PgProjectTokenStore::new(pool)),
        }
    }
}

/// The assembled auth services. Cheap to share behind an `Arc`.
pub struct AuthEngine {
    sessions: Arc<SessionManager>,
    accounts: Authenticator,
    password_reset: PasswordResetService,
    project_tokens: ProjectTokenIssuer,
    projects: Arc<dyn ProjectDirectory>,
}

impl AuthEngine {
    pub fn new(settings: &AuthSettings, backends: Backends, clock: Arc<dyn Clock>) -> Self {
        let codec = Arc::new(TokenCodec::new(settings.jwt_secret.as_bytes()));
        let sessions = Arc::new(
            SessionManager::new(
                codec.clone(),
                backends.tokens,
                backends.cache,
                clock.clone(),
                settings.roles.clone(),
                settings.session_ttl,
            )
            .with_timeouts(CallTimeouts {
                store: settings.store_timeout,
                cache: settings.cache_timeout,
            }),
        );
        let accounts = Authenticator::new(
            backends.principals.clone(),
            sessions.clone(),
            clock.clone(),
            settings.delete_scheme,
            settings.store_timeout,
        );
        let password_reset = PasswordResetService::new(
            backends.principals,
            clock.clone(),
            settings.password_reset_ttl,
            settings.store_timeout,
        );
        let project_tokens = ProjectTokenIssuer::new(
            codec,
            backends.projects.clone(),
            backends.project_tokens,
            clock,
            settings.store_timeout,
        );
        Self {
            sessions,
            accounts,
            password_reset,
            project_tokens,
            projects: backends.projects,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn accounts(&self) -> &Authenticator {
        &self.accounts
    }

    pub fn password_reset(&self) -> &PasswordResetService {
        &self.password_reset
    }

    pub fn project_tokens(&self) -> &ProjectTokenIssuer {
        &self.project_tokens
    }

    pub fn projects(&self) -> &dyn ProjectDirectory {
        self.projects.as_ref()
    }
}
