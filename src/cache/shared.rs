//! Shared persistent cache tier.
//!
//! The tier itself only knows about keys and compressed payloads; the
//! actual storage sits behind [`KeyValueStore`]. Production deployments use
//! Redis, tests and single-node setups use [`MemoryKeyValueStore`].

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

use super::codec::Codec;
use super::{CacheEntry, CacheKey, CacheTier, CacheTierBackend, TierError, TierResult};

/// Minimal byte store with per-key expiry
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, String>;

    /// Write a value that expires after `ttl`
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), String>;

    /// Delete a value
    async fn delete(&self, key: &str) -> Result<(), String>;
}

/// In-process [`KeyValueStore`]
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: DashMap<String, (Vec<u8>, Instant)>,
}

impl MemoryKeyValueStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.values.iter().filter(|e| e.value().1 > now).count()
    }

    /// Whether the store holds no live values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys currently stored
    pub fn keys(&self) -> Vec<String> {
        self.values.iter().map(|e| e.key().clone()).collect()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, String> {
        let expired = match self.values.get(key) {
            Some(entry) if entry.value().1 > Instant::now() => return Ok(Some(entry.value().0.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.values.remove(key);
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), String> {
        self.values
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), String> {
        self.values.remove(key);
        Ok(())
    }
}

/// Redis-backed [`KeyValueStore`]
#[cfg(feature = "redis")]
#[derive(Clone)]
pub struct RedisKeyValueStore {
    client: redis::Client,
    timeout: Duration,
}

#[cfg(feature = "redis")]
impl RedisKeyValueStore {
    /// Open a client for `url`; no connection is made until first use
    pub fn new(url: &str, timeout: Duration) -> Result<Self, String> {
        let client = redis::Client::open(url).map_err(|e| e.to_string())?;
        Ok(Self { client, timeout })
    }

    async fn with_timeout<T, Fut>(&self, op: Fut) -> Result<T, String>
    where
        Fut: std::future::Future<Output = Result<T, String>>,
    {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(result) => result,
            Err(_) => Err("redis timeout".to_string()),
        }
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, String> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, String> {
        use redis::AsyncCommands;

        self.with_timeout(async {
            let mut conn = self.connection().await?;
            conn.get(key).await.map_err(|e| e.to_string())
        })
        .await
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), String> {
        use redis::AsyncCommands;

        let seconds = ttl.as_secs().max(1);
        self.with_timeout(async {
            let mut conn = self.connection().await?;
            let _: () = conn
                .set_ex(key, value, seconds)
                .await
                .map_err(|e| e.to_string())?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), String> {
        use redis::AsyncCommands;

        self.with_timeout(async {
            let mut conn = self.connection().await?;
            let _: () = conn.del(key).await.map_err(|e| e.to_string())?;
            Ok(())
        })
        .await
    }
}

/// Shared tier storing gzip-compressed entries in a [`KeyValueStore`]
pub struct SharedTier {
    store: Arc<dyn KeyValueStore>,
    codec: Codec,
    prefix: String,
    retention: Duration,
}

impl SharedTier {
    /// Create a shared tier
    ///
    /// Values are kept for `max(ttl, retention)` so that stale data is still
    /// around when the platform is unreachable.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        prefix: impl Into<String>,
        compression_level: u32,
        retention: Duration,
    ) -> Self {
        Self {
            store,
            codec: Codec::new(CacheTier::Shared, compression_level),
            prefix: prefix.into(),
            retention,
        }
    }

    /// Key used in the store for a cache key
    pub fn store_key(&self, key: &CacheKey) -> String {
        format!("{}:{}", self.prefix, key.storage_name())
    }

    fn unavailable(message: String) -> TierError {
        TierError::Unavailable {
            tier: CacheTier::Shared,
            message,
        }
    }
}

#[async_trait]
impl CacheTierBackend for SharedTier {
    fn tier(&self) -> CacheTier {
        CacheTier::Shared
    }

    async fn get(&self, key: &CacheKey) -> TierResult<Option<Arc<CacheEntry>>> {
        let store_key = self.store_key(key);
        let bytes = match self.store.get(&store_key).await.map_err(Self::unavailable)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        trace!(key = %store_key, bytes = bytes.len(), "shared tier payload");
        let entry = self.codec.decode(key, &bytes)?;
        Ok(Some(Arc::new(entry)))
    }

    async fn put(&self, entry: Arc<CacheEntry>) -> TierResult<()> {
        let bytes = self.codec.encode(&entry)?;
        let expiry = entry.ttl().max(self.retention);
        self.store
            .set_ex(&self.store_key(&entry.key), bytes, expiry)
            .await
            .map_err(Self::unavailable)
    }

    async fn invalidate(&self, key: &CacheKey) -> TierResult<()> {
        self.store
            .delete(&self.store_key(key))
            .await
            .map_err(Self::unavailable)
    }
}
