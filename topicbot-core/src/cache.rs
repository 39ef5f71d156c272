//! Durable cache for persisted session state.
//!
//! A key-value store with per-key time-to-live. Two backends are provided:
//!
//! - **In-Memory**: single-process map, expired entries evicted on read
//! - **Redis**: shared store for multi-process deployments (`redis-backend` feature)
//!
//! A miss is a regular outcome (`Ok(None)`), never an error. Backend
//! transport failures surface as [`topicbot_common::Error::Cache`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use topicbot_common::config::{CacheBackendKind, CacheConfig, RedisCacheConfig};
#[cfg(feature = "redis-backend")]
use topicbot_common::Error;
use topicbot_common::Result;

// ============================================================================
// Cache Backend Trait
// ============================================================================

/// Trait for durable cache implementations.
///
/// Each call is an atomic single-key operation from the caller's point of view.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read a value. Expired keys behave as a miss.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous entry. A zero `ttl` never expires.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Check whether a live entry exists.
    async fn has(&self, key: &str) -> Result<bool>;

    /// Number of stored entries (may include not-yet-purged expired ones).
    async fn len(&self) -> Result<usize>;

    /// Drop every expired entry, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

// ============================================================================
// In-Memory Cache
// ============================================================================

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(deadline) if now >= deadline)
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    if ttl.is_zero() {
        return None;
    }
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
}

/// In-process cache backed by a map.
///
/// The `*_at` methods take the current time explicitly; the trait methods
/// use the wall clock.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `key` as of `now`, evicting the backing record when it has expired.
    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                tracing::debug!(key = %key, "Cache entry expired, evicted on read");
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Write `key` with a time-to-live counted from `now`.
    pub async fn set_at(&self, key: &str, value: String, ttl: Duration, now: DateTime<Utc>) {
        let entry = CacheEntry {
            value,
            expires_at: expiry(now, ttl),
        };
        self.entries.write().await.insert(key.to_string(), entry);
    }

    /// Whether `key` holds a live entry as of `now`. Expired entries are evicted.
    pub async fn has_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.get_at(key, now).await.is_some()
    }

    /// Drop every entry expired as of `now`.
    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of stored entries, expired or not.
    pub async fn raw_len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_at(key, Utc::now()).await)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.set_at(key, value, ttl, Utc::now()).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.has_at(key, Utc::now()).await)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.raw_len().await)
    }

    async fn purge_expired(&self) -> Result<usize> {
        Ok(self.purge_expired_at(Utc::now()).await)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// Redis Cache (Feature-gated)
// ============================================================================

/// Redis-backed cache. Keys are namespaced with the configured prefix and
/// expiry is delegated to Redis (`SET .. EX`).
#[cfg(feature = "redis-backend")]
pub struct RedisCache {
    config: RedisCacheConfig,
    /// Connection manager (handles reconnection automatically).
    conn: redis::aio::ConnectionManager,
}

#[cfg(feature = "redis-backend")]
impl RedisCache {
    /// Connect to Redis.
    pub async fn connect(config: RedisCacheConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| Error::Cache(format!("invalid redis url: {e}")))?;

        let timeout = Duration::from_secs(config.timeout_secs);
        let conn = tokio::time::timeout(timeout, client.get_connection_manager())
            .await
            .map_err(|_| Error::Cache(format!("connecting to {} timed out", config.url)))?
            .map_err(|e| Error::Cache(e.to_string()))?;

        tracing::info!(url = %config.url, prefix = %config.key_prefix, "Connected to Redis cache");
        Ok(Self { config, conn })
    }

    /// Get the configuration.
    pub fn config(&self) -> &RedisCacheConfig {
        &self.config
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }
}

#[cfg(feature = "redis-backend")]
#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(self.prefixed(key))
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(|e| Error::Cache(e.to_string()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.prefixed(key)).arg(value);
        if !ttl.is_zero() {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        cmd.query_async::<()>(&mut conn)
            .await
            .map_err(|e| Error::Cache(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed = redis::cmd("DEL")
            .arg(self.prefixed(key))
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| Error::Cache(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists = redis::cmd("EXISTS")
            .arg(self.prefixed(key))
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| Error::Cache(e.to_string()))?;
        Ok(exists > 0)
    }

    async fn len(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", self.config.key_prefix);
        let mut cursor: u64 = 0;
        let mut count = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| Error::Cache(e.to_string()))?;
            count += keys.len();
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(count)
    }

    async fn purge_expired(&self) -> Result<usize> {
        // Redis expires keys on its own
        Ok(0)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Placeholder for the Redis cache when the feature is not enabled.
#[cfg(not(feature = "redis-backend"))]
pub struct RedisCache {
    config: RedisCacheConfig,
    fallback: InMemoryCache,
}

#[cfg(not(feature = "redis-backend"))]
impl RedisCache {
    /// Create a Redis cache (falls back to in-memory when the feature is not enabled).
    pub async fn connect(config: RedisCacheConfig) -> Result<Self> {
        tracing::warn!(
            url = %config.url,
            "Redis backend feature not enabled. Falling back to in-memory cache. \
             Enable with: cargo build --features redis-backend"
        );
        Ok(Self {
            config,
            fallback: InMemoryCache::new(),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &RedisCacheConfig {
        &self.config
    }
}

#[cfg(not(feature = "redis-backend"))]
#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.fallback.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.fallback.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.fallback.delete(key).await
    }

    async fn has(&self, key: &str) -> Result<bool> {
        self.fallback.has(key).await
    }

    async fn len(&self) -> Result<usize> {
        self.fallback.len().await
    }

    async fn purge_expired(&self) -> Result<usize> {
        self.fallback.purge_expired().await
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// Cache Factory
// ============================================================================

/// Create a cache backend from configuration.
pub async fn create_cache(config: &CacheConfig) -> Result<Arc<dyn CacheBackend>> {
    match config.backend {
        CacheBackendKind::Memory => Ok(Arc::new(InMemoryCache::new())),
        CacheBackendKind::Redis => {
            let cache = RedisCache::connect(config.redis.clone()).await?;
            Ok(Arc::new(cache))
        }
    }
}

// ============================================================================
// Typed Wrapper
// ============================================================================

/// Typed view over a [`CacheBackend`] with a default time-to-live.
///
/// Values are stored as JSON.
#[derive(Clone)]
pub struct DurableCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl DurableCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    /// In-memory cache with the given default TTL.
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(InMemoryCache::new()), ttl)
    }

    /// Build the configured backend.
    pub async fn from_config(config: &CacheConfig) -> Result<Self> {
        let backend = create_cache(config).await?;
        tracing::info!(
            backend = backend.name(),
            ttl_secs = config.ttl_secs,
            "Durable cache ready"
        );
        Ok(Self::new(backend, Duration::from_secs(config.ttl_secs)))
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read and decode a value. A miss is `Ok(None)`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.backend.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Encode and write a value with the default TTL.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_json_with_ttl(key, value, self.ttl).await
    }

    /// Encode and write a value with an explicit TTL.
    pub async fn set_json_with_ttl<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.backend.set(key, raw, ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.backend.delete(key).await
    }

    pub async fn has(&self, key: &str) -> Result<bool> {
        self.backend.has(key).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_ttl_expiry_is_a_miss_and_evicts() {
        let cache = InMemoryCache::new();
        let ttl = Duration::from_secs(1);
        cache.set_at("u1", "state".into(), ttl, t0()).await;

        let before = t0() + chrono::Duration::milliseconds(999);
        assert_eq!(cache.get_at("u1", before).await.as_deref(), Some("state"));
        assert_eq!(cache.raw_len().await, 1);

        let after = t0() + chrono::Duration::seconds(1);
        assert!(cache.get_at("u1", after).await.is_none());
        assert_eq!(cache.raw_len().await, 0);
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let cache = InMemoryCache::new();
        cache.set_at("k", "v".into(), Duration::ZERO, t0()).await;
        let far = t0() + chrono::Duration::days(3650);
        assert!(cache.has_at("k", far).await);
    }

    #[tokio::test]
    async fn test_set_overwrites_and_refreshes_ttl() {
        let cache = InMemoryCache::new();
        let ttl = Duration::from_secs(10);
        cache.set_at("k", "old".into(), ttl, t0()).await;
        let later = t0() + chrono::Duration::seconds(8);
        cache.set_at("k", "new".into(), ttl, later).await;

        let check = t0() + chrono::Duration::seconds(15);
        assert_eq!(cache.get_at("k", check).await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = InMemoryCache::new();
        cache.set_at("a", "1".into(), Duration::from_secs(1), t0()).await;
        cache.set_at("b", "2".into(), Duration::from_secs(60), t0()).await;

        let removed = cache
            .purge_expired_at(t0() + chrono::Duration::seconds(5))
            .await;
        assert_eq!(removed, 1);
        assert_eq!(cache.raw_len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_and_has() {
        let cache = InMemoryCache::new();
        cache.set("k", "v".into(), Duration::from_secs(60)).await.unwrap();
        assert!(cache.has("k").await.unwrap());
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        stack: Vec<String>,
    }

    #[tokio::test]
    async fn test_durable_cache_json() {
        let cache = DurableCache::in_memory(Duration::from_secs(60));
        assert!(cache.get_json::<Record>("u1").await.unwrap().is_none());

        let record = Record {
            stack: vec!["billing.pay".into()],
        };
        cache.set_json("u1", &record).await.unwrap();
        assert_eq!(cache.get_json::<Record>("u1").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_durable_cache_corrupt_value_is_error() {
        let backend = Arc::new(InMemoryCache::new());
        backend
            .set("u1", "not json".into(), Duration::from_secs(60))
            .await
            .unwrap();
        let cache = DurableCache::new(backend, Duration::from_secs(60));
        assert!(cache.get_json::<Record>("u1").await.is_err());
    }

    #[cfg(not(feature = "redis-backend"))]
    #[tokio::test]
    async fn test_redis_selector_falls_back_without_feature() {
        let config = CacheConfig {
            backend: CacheBackendKind::Redis,
            ..CacheConfig::default()
        };
        let cache = create_cache(&config).await.unwrap();
        assert_eq!(cache.name(), "memory");
        cache.set("k", "v".into(), Duration::from_secs(5)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
