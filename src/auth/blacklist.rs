//! Token Blacklist
//! Mission: Reject logged-out tokens until their natural expiry

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Revocation store consulted by the access guard on every request.
///
/// Entries never outlive the token they blacklist: callers pass the token's
/// remaining TTL, and a present-but-expired entry reads as not revoked.
/// Absence is the default (not-revoked) state. `revoke` is idempotent;
/// last write wins.
#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// Mark a token as revoked for `ttl_secs` from now (must be > 0).
    async fn revoke(&self, token: &str, ttl_secs: u64) -> Result<()>;

    /// Whether the token is currently revoked.
    async fn is_revoked(&self, token: &str) -> Result<bool>;
}

/// In-process blacklist over a sharded map.
///
/// Reads and writes on the same token serialize on the map shard, so a
/// just-revoked token can never be read back as valid. Expired entries are
/// evicted lazily on lookup; `sweep` evicts eagerly from a background task.
pub struct InMemoryBlacklist {
    entries: DashMap<String, Instant>,
}

impl InMemoryBlacklist {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    fn revoke_at(&self, token: &str, ttl_secs: u64, now: Instant) {
        let expires_at = now + Duration::from_secs(ttl_secs);
        self.entries.insert(token.to_string(), expires_at);
    }

    fn is_revoked_at(&self, token: &str, now: Instant) -> bool {
        match self.entries.get(token).map(|e| *e.value()) {
            None => false,
            Some(expires_at) if now >= expires_at => {
                // Lazy eviction: the entry has outlived its token.
                self.entries.remove_if(token, |_, exp| now >= *exp);
                false
            }
            Some(_) => true,
        }
    }

    /// Evict every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| now < *expires_at);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "Swept expired blacklist entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryBlacklist {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenBlacklist for InMemoryBlacklist {
    async fn revoke(&self, token: &str, ttl_secs: u64) -> Result<()> {
        self.revoke_at(token, ttl_secs, Instant::now());
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool> {
        Ok(self.is_revoked_at(token, Instant::now()))
    }
}

/// Redis-backed blacklist for deployments that share revocation state
/// across processes. Relies on Redis native key expiry (`SET ... EX`), so
/// there is nothing to sweep.
#[cfg(feature = "redis-blacklist")]
pub struct RedisBlacklist {
    client: redis::Client,
}

#[cfg(feature = "redis-blacklist")]
impl RedisBlacklist {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    fn key(token: &str) -> String {
        format!("blacklist:{token}")
    }
}

#[cfg(feature = "redis-blacklist")]
#[async_trait]
impl TokenBlacklist for RedisBlacklist {
    async fn revoke(&self, token: &str, ttl_secs: u64) -> Result<()> {
        use redis::AsyncCommands;

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex(Self::key(token), "blacklisted", ttl_secs).await?;
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool> {
        use redis::AsyncCommands;

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(Self::key(token)).await?;
        Ok(value.as_deref() == Some("blacklisted"))
    }
}
