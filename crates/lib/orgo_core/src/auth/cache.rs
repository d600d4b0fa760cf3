//! Volatile token index with TTL-based expiration.
//!
//! The cache maps a token key to the subject's username and answers
//! "was this token issued and not yet revoked?" without a store round-trip.
//! It is never a trust boundary: claims always come from the codec.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;

use crate::clock::Clock;

/// Prefix applied to every token key.
pub const TOKEN_PREFIX: &str = "auth:token:";

/// Cache failures. Callers degrade to the durable store on any of these.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache call timed out")]
    Timeout,
}

/// Key-value cache with per-entry TTL.
#[async_trait]
pub trait TokenCache: Send + Sync {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    async fn evict(&self, key: &str) -> Result<(), CacheError>;

    /// Drop entries whose TTL has run out, returning how many were removed.
    /// Backends that expire entries on their own keep the default.
    async fn purge_expired(&self) -> Result<u64, CacheError> {
        Ok(0)
    }
}

/// Build the cache key for a token digest.
pub fn token_key(token_hash: &str) -> String {
    format!("{TOKEN_PREFIX}{token_hash}")
}

/// A cached entry with expiry.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-process cache backed by a concurrent map.
pub struct MemoryTokenCache {
    entries: DashMap<String, CacheEntry>,
    clock: Arc<dyn Clock>,
}

impl MemoryTokenCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Drop every expired entry.
    pub fn sweep(&self) -> u64 {
        let now = self.clock.now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let live = now < entry.expires_at;
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    /// Remove all entries, as a cache flush would.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn live(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        let entry = self.entries.get(key)?;
        if now < entry.expires_at {
            Some(entry.value.clone())
        } else {
            drop(entry);
            self.entries.remove_if(key, |_, e| now >= e.expires_at);
            None
        }
    }
}

#[async_trait]
impl TokenCache for MemoryTokenCache {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::Unavailable(format!("ttl out of range: {e}")))?;
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .ok_or_else(|| CacheError::Unavailable("ttl out of range".into()))?;
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.live(key))
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.live(key).is_some())
    }

    async fn evict(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, CacheError> {
        Ok(self.sweep())
    }
}

#[cfg(feature = "redis")]
pub use redis_cache::RedisTokenCache;

#[cfg(feature = "redis")]
mod redis_cache {
    use std::time::Duration;

    use async_trait::async_trait;
    use redis::AsyncCommands;
    use redis::aio::ConnectionManager;

    use super::{CacheError, TokenCache};

    impl From<redis::RedisError> for CacheError {
        fn from(e: redis::RedisError) -> Self {
            CacheError::Unavailable(e.to_string())
        }
    }

    /// Redis-backed cache. Entries are written with `PSETEX` so the TTL
    /// never exceeds the token's remaining lifetime.
    #[derive(Clone)]
    pub struct RedisTokenCache {
        conn: ConnectionManager,
    }

    impl RedisTokenCache {
        pub async fn connect(url: &str) -> Result<Self, CacheError> {
            let client = redis::Client::open(url)?;
            let conn = ConnectionManager::new(client).await?;
            Ok(Self { conn })
        }
    }

    #[async_trait]
    impl TokenCache for RedisTokenCache {
        async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
            if millis == 0 {
                return Ok(());
            }
            let mut conn = self.conn.clone();
            conn.pset_ex::<_, _, ()>(key, value, millis).await?;
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            let mut conn = self.conn.clone();
            Ok(conn.get::<_, Option<String>>(key).await?)
        }

        async fn exists(&self, key: &str) -> Result<bool, CacheError> {
            let mut conn = self.conn.clone();
            Ok(conn.exists::<_, bool>(key).await?)
        }

        async fn evict(&self, key: &str) -> Result<(), CacheError> {
            let mut conn = self.conn.clone();
            conn.del::<_, ()>(key).await?;
            Ok(())
        }
    }
}
