//! Session token lifecycle: issue, verify, revoke.
//!
//! Issuance signs claims, writes the durable record, then warms the cache.
//! Verification decodes first, then consults the cache, then the store.
//! Expiry is never written anywhere; it is derived from `exp` and
//! `expires_at` at check time.
//!
//! Revocation evicts the cache entry and flips the store flag. If eviction
//! fails, a revoked token can still pass the fast path until its cache TTL
//! runs out. Callers needing strict revocation latency should turn the fast
//! path off with [`SessionManager::with_fast_path`].

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cache::{CacheError, TokenCache, token_key};
use super::jwt::TokenCodec;
use super::rbac::RoleTable;
use super::store::TokenStore;
use super::{AuthError, bounded, hash_token};
use crate::clock::Clock;
use crate::models::auth::{Principal, SessionClaims, SessionTokenRecord, TokenKind};

/// Default retention for expired records before they are purged.
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// A freshly issued session token.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub claims: SessionClaims,
    pub expires_at: DateTime<Utc>,
}

/// Timeouts applied to every store and cache call.
#[derive(Debug, Clone, Copy)]
pub struct CallTimeouts {
    pub store: StdDuration,
    pub cache: StdDuration,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            store: StdDuration::from_secs(5),
            cache: StdDuration::from_millis(250),
        }
    }
}

pub struct SessionManager {
    codec: Arc<TokenCodec>,
    store: Arc<dyn TokenStore>,
    cache: Arc<dyn TokenCache>,
    clock: Arc<dyn Clock>,
    roles: Arc<RoleTable>,
    ttl: Duration,
    timeouts: CallTimeouts,
    fast_path: bool,
}

impl SessionManager {
    pub fn new(
        codec: Arc<TokenCodec>,
        store: Arc<dyn TokenStore>,
        cache: Arc<dyn TokenCache>,
        clock: Arc<dyn Clock>,
        roles: Arc<RoleTable>,
        ttl: Duration,
    ) -> Self {
        Self {
            codec,
            store,
            cache,
            clock,
            roles,
            ttl,
            timeouts: CallTimeouts::default(),
            fast_path: true,
        }
    }

    pub fn with_timeouts(mut self, timeouts: CallTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Enable or disable the cache short-circuit during verification.
    pub fn with_fast_path(mut self, enabled: bool) -> Self {
        self.fast_path = enabled;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn roles(&self) -> &RoleTable {
        &self.roles
    }

    /// Issue a token for `principal`, resolving permissions from its roles.
    pub async fn issue_for(&self, principal: &Principal) -> Result<IssuedSession, AuthError> {
        let permissions = self.roles.permissions_for(&principal.roles);
        self.issue(principal, &principal.roles, &permissions).await
    }

    /// Sign, persist, then cache a session token.
    ///
    /// The persist and cache steps run on a detached task: if the caller
    /// goes away mid-issuance the record is still written, so no half-issued
    /// state is left behind. A store failure aborts before the cache is
    /// touched. Issuance is never retried here.
    pub async fn issue(
        &self,
        principal: &Principal,
        roles: &[String],
        permissions: &[String],
    ) -> Result<IssuedSession, AuthError> {
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AuthError::Internal(format!("session ttl out of range: {}", self.ttl)))?;
        let claims = SessionClaims {
            sub: principal.username.clone(),
            uid: principal.id,
            roles: roles.to_vec(),
            permissions: permissions.to_vec(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
            typ: TokenKind::Session,
        };
        let token = self.codec.issue(&claims)?;
        let token_hash = hash_token(&token);
        let record = SessionTokenRecord {
            id: Uuid::now_v7(),
            principal_id: principal.id,
            token_hash: token_hash.clone(),
            issued_at: now,
            expires_at,
            revoked: false,
            revoked_at: None,
        };

        let store = self.store.clone();
        let cache = self.cache.clone();
        let timeouts = self.timeouts;
        let username = principal.username.clone();
        let cache_ttl = (expires_at - now).to_std().unwrap_or_default();
        let persisted = tokio::spawn(async move {
            bounded(timeouts.store, "token store", store.save(&record)).await?;
            let key = token_key(&token_hash);
            match tokio::time::timeout(timeouts.cache, cache.put(&key, &username, cache_ttl)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "token cache write failed; store remains authoritative"),
                Err(_) => warn!("token cache write timed out; store remains authoritative"),
            }
            Ok::<_, AuthError>(())
        });
        persisted
            .await
            .map_err(|e| AuthError::Internal(format!("issuance task: {e}")))??;

        info!(principal_id = %principal.id, expires_at = %expires_at, "issued session token");
        Ok(IssuedSession {
            token,
            claims,
            expires_at,
        })
    }

    /// Whether `token` is currently valid.
    pub async fn verify(&self, token: &str) -> Result<bool, AuthError> {
        Ok(self.authenticate(token).await?.is_some())
    }

    /// Verify `token` and return its claims.
    ///
    /// `Ok(None)` means the token is invalid (bad signature, malformed,
    /// expired, revoked or unknown). `Err` is reserved for store failures;
    /// a cache failure only skips the fast path.
    pub async fn authenticate(&self, token: &str) -> Result<Option<SessionClaims>, AuthError> {
        let now = self.clock.now();
        let claims = match self.codec.decode::<SessionClaims>(token, now) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(reason = %e, "session token rejected by codec");
                return Ok(None);
            }
        };

        let token_hash = hash_token(token);
        if self.fast_path {
            match self.cache_exists(&token_hash).await {
                Ok(true) => return Ok(Some(claims)),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "token cache unavailable; falling back to store"),
            }
        }

        let record = bounded(
            self.timeouts.store,
            "token store",
            self.store.find_valid(&token_hash, now),
        )
        .await?;
        Ok(record.map(|_| claims))
    }

    async fn cache_exists(&self, token_hash: &str) -> Result<bool, CacheError> {
        let key = token_key(token_hash);
        tokio::time::timeout(self.timeouts.cache, self.cache.exists(&key))
            .await
            .map_err(|_| CacheError::Timeout)?
    }

    /// Evict the cache entry, then revoke the durable record.
    ///
    /// Both steps are attempted; eviction is best-effort. Revoking an
    /// unknown or already revoked token is not an error.
    pub async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let token_hash = hash_token(token);
        let key = token_key(&token_hash);
        match tokio::time::timeout(self.timeouts.cache, self.cache.evict(&key)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "token cache eviction failed"),
            Err(_) => warn!("token cache eviction timed out"),
        }
        let now = self.clock.now();
        let flipped = bounded(
            self.timeouts.store,
            "token store",
            self.store.revoke(&token_hash, now),
        )
        .await?;
        debug!(flipped, "session token revoked");
        Ok(())
    }

    /// Revoke every session token of a principal in the store.
    ///
    /// Cached entries are not enumerated; they run out on their own TTL.
    /// Callers that cannot accept that window verify without the fast path.
    pub async fn revoke_all_for_principal(&self, principal_id: Uuid) -> Result<u64, AuthError> {
        let now = self.clock.now();
        let count = bounded(
            self.timeouts.store,
            "token store",
            self.store.revoke_all_for_principal(principal_id, now),
        )
        .await?;
        info!(principal_id = %principal_id, count, "revoked all session tokens");
        Ok(count)
    }

    /// Currently valid session records of a principal.
    pub async fn active_sessions(&self, principal_id: Uuid) -> Result<Vec<SessionTokenRecord>, AuthError> {
        let now = self.clock.now();
        bounded(
            self.timeouts.store,
            "token store",
            self.store.find_active_by_principal(principal_id, now),
        )
        .await
    }

    /// Delete records that expired more than `retention` ago, and drop
    /// cache entries whose TTL has run out.
    ///
    /// Cache housekeeping is best-effort; only a store failure is an error.
    pub async fn purge_expired(&self, retention: Duration) -> Result<u64, AuthError> {
        match tokio::time::timeout(self.timeouts.cache, self.cache.purge_expired()).await {
            Ok(Ok(0)) => {}
            Ok(Ok(swept)) => debug!(swept, "swept expired token cache entries"),
            Ok(Err(e)) => warn!(error = %e, "token cache sweep failed"),
            Err(_) => warn!("token cache sweep timed out"),
        }
        let threshold = self.clock.now() - retention;
        let purged = bounded(
            self.timeouts.store,
            "token store",
            self.store.purge_expired_before(threshold),
        )
        .await?;
        if purged > 0 {
            info!(purged, "purged expired session tokens");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::auth::cache::MemoryTokenCache;
    use crate::auth::memory::MemoryTokenStore;
    use crate::clock::ManualClock;

    /// Cache that fails every call.
    struct DownCache;

    #[async_trait]
    impl TokenCache for DownCache {
        async fn put(&self, _: &str, _: &str, _: StdDuration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn exists(&self, _: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn evict(&self, _: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
    }

    /// Cache that never answers within any reasonable timeout.
    struct SlowCache;

    impl SlowCache {
        async fn stall() {
            tokio::time::sleep(StdDuration::from_secs(5)).await;
        }
    }

    #[async_trait]
    impl TokenCache for SlowCache {
        async fn put(&self, _: &str, _: &str, _: StdDuration) -> Result<(), CacheError> {
            Self::stall().await;
            Ok(())
        }
        async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
            Self::stall().await;
            Ok(Some("alice".into()))
        }
        async fn exists(&self, _: &str) -> Result<bool, CacheError> {
            Self::stall().await;
            Ok(true)
        }
        async fn evict(&self, _: &str) -> Result<(), CacheError> {
            Self::stall().await;
            Ok(())
        }
        async fn purge_expired(&self) -> Result<u64, CacheError> {
            Self::stall().await;
            Ok(0)
        }
    }

    /// Store whose writes always fail.
    struct ReadOnlyStore(MemoryTokenStore);

    #[async_trait]
    impl TokenStore for ReadOnlyStore {
        async fn save(&self, _: &SessionTokenRecord) -> Result<(), AuthError> {
            Err(AuthError::Internal("write refused".into()))
        }
        async fn find_by_hash(&self, h: &str) -> Result<Option<SessionTokenRecord>, AuthError> {
            self.0.find_by_hash(h).await
        }
        async fn find_valid(
            &self,
            h: &str,
            now: DateTime<Utc>,
        ) -> Result<Option<SessionTokenRecord>, AuthError> {
            self.0.find_valid(h, now).await
        }
        async fn find_active_by_principal(
            &self,
            id: Uuid,
            now: DateTime<Utc>,
        ) -> Result<Vec<SessionTokenRecord>, AuthError> {
            self.0.find_active_by_principal(id, now).await
        }
        async fn revoke(&self, h: &str, now: DateTime<Utc>) -> Result<bool, AuthError> {
            self.0.revoke(h, now).await
        }
        async fn revoke_all_for_principal(&self, id: Uuid, now: DateTime<Utc>) -> Result<u64, AuthError> {
            self.0.revoke_all_for_principal(id, now).await
        }
        async fn purge_expired_before(&self, t: DateTime<Utc>) -> Result<u64, AuthError> {
            self.0.purge_expired_before(t).await
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<MemoryTokenStore>,
        cache: Arc<MemoryTokenCache>,
        manager: SessionManager,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(MemoryTokenStore::new());
        let cache = Arc::new(MemoryTokenCache::new(clock.clone()));
        let manager = SessionManager::new(
            Arc::new(TokenCodec::new(b"test-secret")),
            store.clone(),
            cache.clone(),
            clock.clone(),
            Arc::new(RoleTable::builtin()),
            Duration::hours(1),
        );
        Fixture {
            clock,
            store,
            cache,
            manager,
        }
    }

    fn alice() -> Principal {
        Principal {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: String::new(),
            roles: vec!["USER".into()],
            created_by: None,
            created_at: Utc::now(),
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
        }
    }

    #[tokio::test]
    async fn issued_token_verifies_until_expiry() {
        let f = fixture();
        let issued = f.manager.issue_for(&alice()).await.unwrap();
        assert_eq!(issued.claims.permissions, vec!["READ"]);
        assert!(f.manager.verify(&issued.token).await.unwrap());

        f.clock.advance(Duration::minutes(59));
        assert!(f.manager.verify(&issued.token).await.unwrap());

        f.clock.advance(Duration::minutes(1));
        assert!(!f.manager.verify(&issued.token).await.unwrap());
    }

    #[tokio::test]
    async fn issuance_writes_store_and_cache() {
        let f = fixture();
        let issued = f.manager.issue_for(&alice()).await.unwrap();
        let hash = hash_token(&issued.token);
        assert!(f.store.find_by_hash(&hash).await.unwrap().is_some());
        assert_eq!(
            f.cache.get(&token_key(&hash)).await.unwrap(),
            Some("alice".to_string())
        );
    }

    #[tokio::test]
    async fn revoke_then_verify_is_false() {
        let f = fixture();
        let issued = f.manager.issue_for(&alice()).await.unwrap();
        f.manager.revoke(&issued.token).await.unwrap();
        assert!(!f.manager.verify(&issued.token).await.unwrap());
        // Second revoke is a no-op.
        f.manager.revoke(&issued.token).await.unwrap();
    }

    #[tokio::test]
    async fn cache_miss_falls_back_to_store() {
        let f = fixture();
        let issued = f.manager.issue_for(&alice()).await.unwrap();
        f.cache.clear();
        assert!(f.manager.verify(&issued.token).await.unwrap());
    }

    #[tokio::test]
    async fn unavailable_cache_neither_admits_nor_rejects() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(MemoryTokenStore::new());
        let manager = SessionManager::new(
            Arc::new(TokenCodec::new(b"test-secret")),
            store.clone(),
            Arc::new(DownCache),
            clock,
            Arc::new(RoleTable::builtin()),
            Duration::hours(1),
        );
        let issued = manager.issue_for(&alice()).await.unwrap();
        assert!(manager.verify(&issued.token).await.unwrap());
        manager.revoke(&issued.token).await.unwrap();
        assert!(!manager.verify(&issued.token).await.unwrap());
    }

    #[tokio::test]
    async fn store_failure_leaves_no_cache_entry() {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = Arc::new(MemoryTokenCache::new(clock.clone()));
        let manager = SessionManager::new(
            Arc::new(TokenCodec::new(b"test-secret")),
            Arc::new(ReadOnlyStore(MemoryTokenStore::new())),
            cache.clone(),
            clock,
            Arc::new(RoleTable::builtin()),
            Duration::hours(1),
        );
        assert!(manager.issue_for(&alice()).await.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn stale_cache_hit_is_bypassed_without_fast_path() {
        let f = fixture();
        let issued = f.manager.issue_for(&alice()).await.unwrap();
        // Revoke in the store only, leaving the cache entry in place.
        f.store
            .revoke(&hash_token(&issued.token), f.clock.now())
            .await
            .unwrap();
        assert!(f.manager.verify(&issued.token).await.unwrap());

        let strict = f.manager.with_fast_path(false);
        assert!(!strict.verify(&issued.token).await.unwrap());
    }

    #[tokio::test]
    async fn forged_token_never_reaches_store() {
        let f = fixture();
        let other = SessionManager::new(
            Arc::new(TokenCodec::new(b"other-secret")),
            f.store.clone(),
            f.cache.clone(),
            f.clock.clone(),
            Arc::new(RoleTable::builtin()),
            Duration::hours(1),
        );
        let issued = other.issue_for(&alice()).await.unwrap();
        assert!(f.store.find_by_hash(&hash_token(&issued.token)).await.unwrap().is_some());
        assert!(f.manager.authenticate(&issued.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoke_all_leaves_other_principals() {
        let f = fixture();
        let a = alice();
        let mut b = alice();
        b.id = Uuid::new_v4();
        b.username = "bob".into();
        let a1 = f.manager.issue_for(&a).await.unwrap();
        let a2 = f.manager.issue_for(&a).await.unwrap();
        let b1 = f.manager.issue_for(&b).await.unwrap();
        f.cache.clear();

        assert_eq!(f.manager.active_sessions(a.id).await.unwrap().len(), 2);
        assert_eq!(f.manager.revoke_all_for_principal(a.id).await.unwrap(), 2);
        assert!(!f.manager.verify(&a1.token).await.unwrap());
        assert!(!f.manager.verify(&a2.token).await.unwrap());
        assert!(f.manager.verify(&b1.token).await.unwrap());
    }

    #[tokio::test]
    async fn purge_respects_retention() {
        let f = fixture();
        f.manager.issue_for(&alice()).await.unwrap();
        f.clock.advance(Duration::days(2));
        assert_eq!(f.manager.purge_expired(Duration::days(DEFAULT_RETENTION_DAYS)).await.unwrap(), 0);
        f.clock.advance(Duration::days(7));
        assert_eq!(f.manager.purge_expired(Duration::days(DEFAULT_RETENTION_DAYS)).await.unwrap(), 1);
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn purge_sweeps_expired_cache_entries() {
        let f = fixture();
        for i in 0..100 {
            let mut p = alice();
            p.username = format!("user{i}");
            f.manager.issue_for(&p).await.unwrap();
        }
        assert_eq!(f.cache.len(), 100);

        f.clock.advance(Duration::days(30));
        assert_eq!(f.manager.purge_expired(Duration::days(DEFAULT_RETENTION_DAYS)).await.unwrap(), 100);
        assert_eq!(f.cache.len(), 0);
    }

    #[tokio::test]
    async fn purge_keeps_live_cache_entries() {
        let f = fixture();
        let issued = f.manager.issue_for(&alice()).await.unwrap();
        f.manager.purge_expired(Duration::days(DEFAULT_RETENTION_DAYS)).await.unwrap();
        assert_eq!(f.cache.len(), 1);
        assert!(f.manager.verify(&issued.token).await.unwrap());
    }

    #[tokio::test]
    async fn slow_cache_times_out_to_store() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(MemoryTokenStore::new());
        let manager = SessionManager::new(
            Arc::new(TokenCodec::new(b"test-secret")),
            store.clone(),
            Arc::new(SlowCache),
            clock,
            Arc::new(RoleTable::builtin()),
            Duration::hours(1),
        )
        .with_timeouts(CallTimeouts {
            store: StdDuration::from_secs(5),
            cache: StdDuration::from_millis(20),
        });

        // Cache write times out; the store record still lands.
        let issued = manager.issue_for(&alice()).await.unwrap();
        assert!(store.find_by_hash(&hash_token(&issued.token)).await.unwrap().is_some());

        // A stalled `exists` would answer true; the timeout means the store decides.
        assert!(manager.verify(&issued.token).await.unwrap());
        manager.revoke(&issued.token).await.unwrap();
        assert!(!manager.verify(&issued.token).await.unwrap());

        manager.purge_expired(Duration::days(DEFAULT_RETENTION_DAYS)).await.unwrap();
    }

    #[tokio::test]
    async fn out_of_range_ttl_is_an_error() {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = Arc::new(MemoryTokenCache::new(clock.clone()));
        let store = Arc::new(MemoryTokenStore::new());
        let manager = SessionManager::new(
            Arc::new(TokenCodec::new(b"test-secret")),
            store.clone(),
            cache.clone(),
            clock,
            Arc::new(RoleTable::builtin()),
            Duration::days(365 * 1_000_000),
        );
        assert!(matches!(manager.issue_for(&alice()).await, Err(AuthError::Internal(_))));
        assert!(store.is_empty().await);
        assert!(cache.is_empty());
    }
}
