//! In-memory token and principal stores.
//!
//! Used by tests and by the server's `--memory` mode. Each store guards its
//! state with a single async mutex, so bulk operations are atomic with
//! respect to concurrent writers.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::AuthError;
use super::principals::PrincipalStore;
use super::store::TokenStore;
use crate::models::auth::{NewPrincipal, PasswordResetToken, Principal, SessionTokenRecord};

/// Session tokens keyed by digest.
#[derive(Default)]
pub struct MemoryTokenStore {
    records: Mutex<HashMap<String, SessionTokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, revoked or not.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn save(&self, record: &SessionTokenRecord) -> Result<(), AuthError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.token_hash) {
            return Err(AuthError::Conflict("token already stored".into()));
        }
        records.insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<SessionTokenRecord>, AuthError> {
        Ok(self.records.lock().await.get(token_hash).cloned())
    }

    async fn find_valid(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionTokenRecord>, AuthError> {
        Ok(self
            .records
            .lock()
            .await
            .get(token_hash)
            .filter(|r| r.is_valid(now))
            .cloned())
    }

    async fn find_active_by_principal(
        &self,
        principal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionTokenRecord>, AuthError> {
        let mut active: Vec<SessionTokenRecord> = self
            .records
            .lock()
            .await
            .values()
            .filter(|r| r.principal_id == principal_id && r.is_valid(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(active)
    }

    async fn revoke(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, AuthError> {
        let mut records = self.records.lock().await;
        match records.get_mut(token_hash) {
            Some(record) if !record.revoked => {
                record.revoked = true;
                record.revoked_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_principal(
        &self,
        principal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let mut records = self.records.lock().await;
        let mut count = 0;
        for record in records
            .values_mut()
            .filter(|r| r.principal_id == principal_id && !r.revoked)
        {
            record.revoked = true;
            record.revoked_at = Some(now);
            count += 1;
        }
        Ok(count)
    }

    async fn purge_expired_before(&self, threshold: DateTime<Utc>) -> Result<u64, AuthError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| r.expires_at >= threshold);
        Ok((before - records.len()) as u64)
    }
}

#[derive(Default)]
struct PrincipalState {
    principals: HashMap<Uuid, Principal>,
    reset_tokens: HashMap<String, PasswordResetToken>,
}

/// Principals and password-reset tokens.
#[derive(Default)]
pub struct MemoryPrincipalStore {
    state: Mutex<PrincipalState>,
}

impl MemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a principal by id, deleted or not.
    pub async fn get(&self, id: Uuid) -> Option<Principal> {
        self.state.lock().await.principals.get(&id).cloned()
    }
}

#[async_trait]
impl PrincipalStore for MemoryPrincipalStore {
    async fn create(&self, new: NewPrincipal) -> Result<Principal, AuthError> {
        let mut state = self.state.lock().await;
        if state.principals.values().any(|p| p.username == new.username) {
            return Err(AuthError::Conflict("Username already exists".into()));
        }
        if state.principals.values().any(|p| p.email == new.email) {
            return Err(AuthError::Conflict("Email already exists".into()));
        }
        let principal = Principal {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            roles: new.roles,
            created_by: new.created_by,
            created_at: Utc::now(),
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
        };
        state.principals.insert(principal.id, principal.clone());
        Ok(principal)
    }

    async fn find_active_by_username(&self, username: &str) -> Result<Option<Principal>, AuthError> {
        Ok(self
            .state
            .lock()
            .await
            .principals
            .values()
            .find(|p| !p.is_deleted && p.username == username)
            .cloned())
    }

    async fn find_active_by_email(&self, email: &str) -> Result<Option<Principal>, AuthError> {
        Ok(self
            .state
            .lock()
            .await
            .principals
            .values()
            .find(|p| !p.is_deleted && p.email == email)
            .cloned())
    }

    async fn find_active_by_id(&self, id: Uuid) -> Result<Option<Principal>, AuthError> {
        Ok(self
            .state
            .lock()
            .await
            .principals
            .get(&id)
            .filter(|p| !p.is_deleted)
            .cloned())
    }

    async fn save_deleted(&self, principal: &Principal) -> Result<(), AuthError> {
        let mut state = self.state.lock().await;
        let stored = state
            .principals
            .get_mut(&principal.id)
            .ok_or_else(|| AuthError::NotFound("User not found".into()))?;
        stored.is_deleted = principal.is_deleted;
        stored.deleted_at = principal.deleted_at;
        stored.deleted_by = principal.deleted_by;
        Ok(())
    }

    async fn hard_delete(&self, id: Uuid) -> Result<bool, AuthError> {
        let mut state = self.state.lock().await;
        state.reset_tokens.retain(|_, t| t.principal_id != id);
        Ok(state.principals.remove(&id).is_some())
    }

    async fn insert_reset_token(&self, token: &PasswordResetToken) -> Result<(), AuthError> {
        self.state
            .lock()
            .await
            .reset_tokens
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_reset_token(&self, token_hash: &str) -> Result<Option<PasswordResetToken>, AuthError> {
        Ok(self.state.lock().await.reset_tokens.get(token_hash).cloned())
    }

    async fn redeem_reset_token(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(token) = state
            .reset_tokens
            .get_mut(token_hash)
            .filter(|t| t.is_valid(now))
        else {
            return Ok(false);
        };
        let Some(principal) = state
            .principals
            .get_mut(&token.principal_id)
            .filter(|p| !p.is_deleted)
        else {
            return Ok(false);
        };
        principal.password_hash = new_password_hash.to_string();
        token.used = true;
        token.used_at = Some(now);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn record(principal_id: Uuid, hash: &str, now: DateTime<Utc>, ttl: Duration) -> SessionTokenRecord {
        SessionTokenRecord {
            id: Uuid::new_v4(),
            principal_id,
            token_hash: hash.to_string(),
            issued_at: now,
            expires_at: now + ttl,
            revoked: false,
            revoked_at: None,
        }
    }

    #[tokio::test]
    async fn find_valid_respects_expiry_and_revocation() {
        let store = MemoryTokenStore::new();
        let now = Utc::now();
        let pid = Uuid::new_v4();
        store.save(&record(pid, "a", now, Duration::seconds(10))).await.unwrap();

        assert!(store.find_valid("a", now).await.unwrap().is_some());
        assert!(store.find_valid("a", now + Duration::seconds(10)).await.unwrap().is_none());

        assert!(store.revoke("a", now).await.unwrap());
        assert!(store.find_valid("a", now).await.unwrap().is_none());
        assert!(store.find_by_hash("a").await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let store = MemoryTokenStore::new();
        let now = Utc::now();
        store
            .save(&record(Uuid::new_v4(), "a", now, Duration::seconds(10)))
            .await
            .unwrap();
        assert!(store.revoke("a", now).await.unwrap());
        let first = store.find_by_hash("a").await.unwrap().unwrap().revoked_at;
        assert!(!store.revoke("a", now + Duration::seconds(1)).await.unwrap());
        assert_eq!(store.find_by_hash("a").await.unwrap().unwrap().revoked_at, first);
        assert!(!store.revoke("missing", now).await.unwrap());
    }

    #[tokio::test]
    async fn revoke_all_only_touches_one_principal() {
        let store = MemoryTokenStore::new();
        let now = Utc::now();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        store.save(&record(alice, "a1", now, Duration::hours(1))).await.unwrap();
        store.save(&record(alice, "a2", now, Duration::hours(1))).await.unwrap();
        store.save(&record(bob, "b1", now, Duration::hours(1))).await.unwrap();

        assert_eq!(store.find_active_by_principal(alice, now).await.unwrap().len(), 2);
        assert_eq!(store.revoke_all_for_principal(alice, now).await.unwrap(), 2);
        assert!(store.find_active_by_principal(alice, now).await.unwrap().is_empty());
        assert_eq!(store.find_active_by_principal(bob, now).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn purge_drops_records_expired_before_threshold() {
        let store = MemoryTokenStore::new();
        let now = Utc::now();
        let pid = Uuid::new_v4();
        store.save(&record(pid, "old", now - Duration::days(10), Duration::hours(1))).await.unwrap();
        store.save(&record(pid, "new", now, Duration::hours(1))).await.unwrap();
        assert_eq!(store.purge_expired_before(now - Duration::days(7)).await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
        assert!(store.find_by_hash("new").await.unwrap().is_some());
    }

    fn new_principal(username: &str, email: &str) -> NewPrincipal {
        NewPrincipal {
            username: username.into(),
            email: email.into(),
            password_hash: "h".into(),
            roles: vec!["USER".into()],
            created_by: None,
        }
    }

    #[tokio::test]
    async fn duplicate_username_or_email_conflicts() {
        let store = MemoryPrincipalStore::new();
        store.create(new_principal("alice", "a@x.io")).await.unwrap();
        assert!(matches!(
            store.create(new_principal("alice", "other@x.io")).await,
            Err(AuthError::Conflict(_))
        ));
        assert!(matches!(
            store.create(new_principal("other", "a@x.io")).await,
            Err(AuthError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn redeem_is_single_use() {
        let store = MemoryPrincipalStore::new();
        let alice = store.create(new_principal("alice", "a@x.io")).await.unwrap();
        let now = Utc::now();
        store
            .insert_reset_token(&PasswordResetToken {
                id: Uuid::new_v4(),
                principal_id: alice.id,
                token_hash: "r".into(),
                created_at: now,
                expires_at: now + Duration::hours(1),
                used: false,
                used_at: None,
            })
            .await
            .unwrap();

        assert!(store.redeem_reset_token("r", "h2", now).await.unwrap());
        assert!(!store.redeem_reset_token("r", "h3", now).await.unwrap());
        assert_eq!(store.get(alice.id).await.unwrap().password_hash, "h2");
    }
}
