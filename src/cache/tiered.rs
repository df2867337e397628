//! Tiered cache store.
//!
//! [`TieredCacheStore`] owns every cache entry. It reads through a chain of
//! [`CacheTierBackend`]s, promotes slower hits into faster tiers, and
//! serializes writes per key so a reader only ever sees a complete entry.
//! Tier failures never reach callers: a corrupt payload is evicted from the
//! tier that held it and the read continues as a miss.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use super::disk::DiskTier;
use super::memory::MemoryTier;
use super::{CacheEntry, CacheKey, CacheTier, CacheTierBackend, TierError, TierResult};
use crate::config::CacheConfig;
use crate::inventory::{InventoryNode, NodeKind};

/// Counters for the cache store
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Hits served by the memory tier
    pub memory_hits: AtomicU64,
    /// Hits served by the shared tier
    pub shared_hits: AtomicU64,
    /// Hits served by the disk tier
    pub disk_hits: AtomicU64,
    /// Reads that found nothing in any tier
    pub misses: AtomicU64,
    /// Entries copied into faster tiers
    pub promotions: AtomicU64,
    /// Corrupt payloads evicted
    pub corruptions: AtomicU64,
    /// Tier calls that failed for reasons other than corruption
    pub tier_errors: AtomicU64,
    /// Completed puts
    pub writes: AtomicU64,
    /// Completed invalidations
    pub invalidations: AtomicU64,
    /// When the memory tier was last purged
    pub last_purge: RwLock<Option<DateTime<Utc>>>,
}

impl CacheMetrics {
    /// Create new metrics
    pub fn new() -> Self {
        Self::default()
    }

    fn record_hit(&self, tier: CacheTier) {
        let counter = match tier {
            CacheTier::Memory => &self.memory_hits,
            CacheTier::Shared => &self.shared_hits,
            CacheTier::Disk => &self.disk_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Total hits over all tiers
    pub fn hits(&self) -> u64 {
        self.memory_hits.load(Ordering::Relaxed)
            + self.shared_hits.load(Ordering::Relaxed)
            + self.disk_hits.load(Ordering::Relaxed)
    }

    /// Fraction of reads answered by any tier
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            shared_hits: self.shared_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            corruptions: self.corruptions.load(Ordering::Relaxed),
            tier_errors: self.tier_errors.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            last_purge: *self.last_purge.read(),
        }
    }

    /// Get a summary report
    pub fn summary(&self) -> String {
        format!(
            "memory: {}, shared: {}, disk: {}, misses: {}, hit rate: {:.1}%, promotions: {}, corruptions: {}, writes: {}",
            self.memory_hits.load(Ordering::Relaxed),
            self.shared_hits.load(Ordering::Relaxed),
            self.disk_hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.hit_rate() * 100.0,
            self.promotions.load(Ordering::Relaxed),
            self.corruptions.load(Ordering::Relaxed),
            self.writes.load(Ordering::Relaxed),
        )
    }
}

/// Serializable copy of [`CacheMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub memory_hits: u64,
    pub shared_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub promotions: u64,
    pub corruptions: u64,
    pub tier_errors: u64,
    pub writes: u64,
    pub invalidations: u64,
    pub last_purge: Option<DateTime<Utc>>,
}

/// Catalog record of a known key
#[derive(Debug, Clone, Copy)]
struct CatalogRecord {
    created_at: DateTime<Utc>,
    ttl_seconds: u64,
}

impl CatalogRecord {
    fn of(entry: &CacheEntry) -> Self {
        Self {
            created_at: entry.created_at,
            ttl_seconds: entry.ttl_seconds,
        }
    }
}

/// Cache presence for one node kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindStatus {
    /// At least one entry of this kind is cached
    pub exists: bool,
    /// Most recent fetch time over all entries of this kind
    pub last_updated: Option<DateTime<Utc>>,
    /// Number of cached entries (scopes)
    pub entries: usize,
    /// Entries past their TTL
    pub stale_entries: usize,
}

/// Cache status report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    /// Per-kind presence, keyed by kind name
    pub kinds: IndexMap<String, KindStatus>,
    /// Tier chain, fastest first
    pub tiers: Vec<CacheTier>,
    /// Store counters
    pub metrics: MetricsSnapshot,
}

/// Multi-tier cache store
pub struct TieredCacheStore {
    /// Tier chain, fastest first
    tiers: Vec<Arc<dyn CacheTierBackend>>,
    /// Per-key write locks
    locks: DashMap<CacheKey, Arc<Mutex<()>>>,
    /// Keys known to this process
    catalog: DashMap<CacheKey, CatalogRecord>,
    /// Metrics
    metrics: Arc<CacheMetrics>,
}

impl TieredCacheStore {
    /// Create a store over a tier chain ordered fastest first
    pub fn new(tiers: Vec<Arc<dyn CacheTierBackend>>) -> Self {
        Self {
            tiers,
            locks: DashMap::new(),
            catalog: DashMap::new(),
            metrics: Arc::new(CacheMetrics::new()),
        }
    }

    /// Store with only a memory tier
    pub fn in_memory() -> Self {
        let memory: Arc<dyn CacheTierBackend> = Arc::new(MemoryTier::new());
        Self::new(vec![memory])
    }

    /// Build the tier chain described by the configuration
    ///
    /// The shared tier is only available with the `redis` feature; a
    /// configured URL without it is logged and skipped.
    pub fn from_config(config: &CacheConfig) -> TierResult<Self> {
        let mut tiers: Vec<Arc<dyn CacheTierBackend>> = Vec::new();

        if config.memory_enabled {
            tiers.push(Arc::new(MemoryTier::new()));
        }

        if let Some(url) = &config.redis_url {
            match Self::shared_tier(url, config)? {
                Some(tier) => tiers.push(tier),
                None => warn!(url = %url, "redis support not compiled in, shared tier disabled"),
            }
        }

        if let Some(path) = &config.disk_path {
            tiers.push(Arc::new(DiskTier::new(path)?));
        }

        debug!(
            tiers = ?tiers.iter().map(|t| t.tier()).collect::<Vec<_>>(),
            "cache tier chain configured"
        );
        Ok(Self::new(tiers))
    }

    #[cfg(feature = "redis")]
    fn shared_tier(url: &str, config: &CacheConfig) -> TierResult<Option<Arc<dyn CacheTierBackend>>> {
        use super::shared::{RedisKeyValueStore, SharedTier};

        let store = RedisKeyValueStore::new(url, config.shared_timeout).map_err(
            |message| TierError::Unavailable {
                tier: CacheTier::Shared,
                message,
            },
        )?;
        let tier: Arc<dyn CacheTierBackend> = Arc::new(SharedTier::new(
            Arc::new(store),
            config.key_prefix.clone(),
            config.compression_level,
            config.retention,
        ));
        Ok(Some(tier))
    }

    #[cfg(not(feature = "redis"))]
    fn shared_tier(_url: &str, _config: &CacheConfig) -> TierResult<Option<Arc<dyn CacheTierBackend>>> {
        Ok(None)
    }

    /// Tier chain, fastest first
    pub fn tiers(&self) -> Vec<CacheTier> {
        self.tiers.iter().map(|t| t.tier()).collect()
    }

    /// Get metrics
    pub fn metrics(&self) -> Arc<CacheMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Read an entry, stale or not
    pub async fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        for (index, tier) in self.tiers.iter().enumerate() {
            match tier.get(key).await {
                Ok(Some(entry)) => {
                    self.metrics.record_hit(tier.tier());
                    trace!(key = %key, tier = %tier.tier(), "cache hit");
                    if index > 0 {
                        self.promote(key, &entry, index).await;
                    }
                    self.catalog.insert(key.clone(), CatalogRecord::of(&entry));
                    return Some(entry);
                }
                Ok(None) => {}
                Err(e) => self.downgrade(tier.as_ref(), key, e).await,
            }
        }

        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "cache miss");
        None
    }

    /// Replace the entry for `entry.key`
    ///
    /// Slower tiers are written first and the memory tier last, all under
    /// the key's write lock. A failing tier is logged and skipped.
    pub async fn put(&self, entry: CacheEntry) -> Arc<CacheEntry> {
        let entry = Arc::new(entry);
        let key = entry.key.clone();
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        for tier in self.tiers.iter().rev() {
            if let Err(e) = tier.put(Arc::clone(&entry)).await {
                self.metrics.tier_errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, tier = %tier.tier(), error = %e, "cache tier write failed");
            }
        }

        self.catalog.insert(key.clone(), CatalogRecord::of(&entry));
        self.metrics.writes.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, nodes = entry.len(), truncated = entry.truncated, "cache entry published");
        entry
    }

    /// Build and store an entry from a node list
    pub async fn put_nodes(
        &self,
        key: CacheKey,
        nodes: Vec<InventoryNode>,
        ttl: Duration,
    ) -> Arc<CacheEntry> {
        self.put(CacheEntry::new(key, nodes, ttl)).await
    }

    /// Remove an entry from every tier
    pub async fn invalidate(&self, key: &CacheKey) {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        for tier in &self.tiers {
            if let Err(e) = tier.invalidate(key).await {
                self.metrics.tier_errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, tier = %tier.tier(), error = %e, "cache tier invalidate failed");
            }
        }

        self.catalog.remove(key);
        self.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether this process knows an entry for `key`
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.catalog.contains_key(key)
    }

    /// Keys known to this process
    pub fn keys(&self) -> Vec<CacheKey> {
        self.catalog.iter().map(|e| e.key().clone()).collect()
    }

    /// Per-kind presence over all known keys
    pub fn status(&self) -> CacheStatus {
        let now = Utc::now();
        let mut kinds: IndexMap<String, KindStatus> = NodeKind::ALL
            .iter()
            .map(|kind| (kind.as_str().to_string(), KindStatus::default()))
            .collect();

        for record in self.catalog.iter() {
            let status = kinds
                .entry(record.key().kind.as_str().to_string())
                .or_default();
            status.exists = true;
            status.entries += 1;
            if (now - record.created_at).num_milliseconds()
                > (record.ttl_seconds as i64).saturating_mul(1000)
            {
                status.stale_entries += 1;
            }
            if status.last_updated.map_or(true, |t| record.created_at > t) {
                status.last_updated = Some(record.created_at);
            }
        }

        CacheStatus {
            kinds,
            tiers: self.tiers(),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Load persisted entries into the faster tiers
    ///
    /// Returns the number of entries loaded.
    pub async fn warm_from_disk(&self) -> usize {
        let mut loaded = 0;

        for (index, tier) in self.tiers.iter().enumerate() {
            if tier.tier() != CacheTier::Disk {
                continue;
            }
            let entries = match tier.scan().await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(tier = %tier.tier(), error = %e, "cache warm-up scan failed");
                    continue;
                }
            };
            for entry in entries {
                if self.contains(&entry.key) {
                    continue;
                }
                self.promote(&entry.key, &entry, index).await;
                self.catalog.insert(entry.key.clone(), CatalogRecord::of(&entry));
                loaded += 1;
            }
        }

        info!(entries = loaded, "warmed cache from disk");
        loaded
    }

    /// Drop entries fetched longer than `max_age` ago from the memory tier
    ///
    /// An entry is only dropped when a slower tier still holds a readable
    /// copy, so the memory tier never loses the last cached answer. Returns
    /// the number of entries dropped.
    pub async fn purge_memory_older_than(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        *self.metrics.last_purge.write() = Some(now);

        let slower: Vec<&Arc<dyn CacheTierBackend>> = self
            .tiers
            .iter()
            .filter(|t| t.tier() != CacheTier::Memory)
            .collect();
        if slower.is_empty() {
            trace!("memory is the only tier, nothing purged");
            return 0;
        }

        let expired: Vec<CacheKey> = self
            .catalog
            .iter()
            .filter(|record| {
                (now - record.created_at)
                    .to_std()
                    .map(|age| age > max_age)
                    .unwrap_or(false)
            })
            .map(|record| record.key().clone())
            .collect();

        let mut purged = 0;
        for key in expired {
            let mut backed = false;
            for tier in &slower {
                if matches!(tier.get(&key).await, Ok(Some(_))) {
                    backed = true;
                    break;
                }
            }
            if !backed {
                trace!(key = %key, "no slower copy, kept in memory");
                continue;
            }
            for tier in self.tiers.iter().filter(|t| t.tier() == CacheTier::Memory) {
                if tier.invalidate(&key).await.is_ok() {
                    purged += 1;
                }
            }
        }
        if purged > 0 {
            debug!(purged, "purged old entries from memory tier");
        }
        purged
    }

    // --- Private helper methods ---

    fn lock_for(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Copy `entry` into the tiers faster than `found_at`, slowest first
    async fn promote(&self, key: &CacheKey, entry: &Arc<CacheEntry>, found_at: usize) {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        for tier in self.tiers[..found_at].iter().rev() {
            // A concurrent put may already have published newer data
            if let Ok(Some(current)) = tier.get(key).await {
                if current.created_at >= entry.created_at {
                    continue;
                }
            }
            match tier.put(Arc::clone(entry)).await {
                Ok(()) => {
                    self.metrics.promotions.fetch_add(1, Ordering::Relaxed);
                    trace!(key = %key, tier = %tier.tier(), "promoted entry");
                }
                Err(e) => {
                    self.metrics.tier_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(key = %key, tier = %tier.tier(), error = %e, "cache promotion failed");
                }
            }
        }
    }

    /// Log a tier read failure; corrupt entries are evicted from that tier
    async fn downgrade(&self, tier: &dyn CacheTierBackend, key: &CacheKey, error: TierError) {
        if error.is_corruption() {
            self.metrics.corruptions.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, tier = %tier.tier(), error = %error, "evicting corrupt cache entry");
            if let Err(e) = tier.invalidate(key).await {
                warn!(key = %key, tier = %tier.tier(), error = %e, "failed to evict corrupt entry");
            }
        } else {
            self.metrics.tier_errors.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, tier = %tier.tier(), error = %error, "cache tier unavailable, treating as miss");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::shared::{KeyValueStore, MemoryKeyValueStore, SharedTier};
    use crate::inventory::Scope;
    use async_trait::async_trait;
    use tempfile::tempdir;

    fn tier<T: CacheTierBackend + 'static>(tier: Arc<T>) -> Arc<dyn CacheTierBackend> {
        tier
    }

    fn datacenters(names: &[&str]) -> Vec<InventoryNode> {
        names
            .iter()
            .map(|n| InventoryNode::new(NodeKind::Datacenter, format!("dc-{}", n), *n))
            .collect()
    }

    struct DownStore;

    #[async_trait]
    impl KeyValueStore for DownStore {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, String> {
            Err("connection refused".to_string())
        }
        async fn set_ex(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), String> {
            Err("connection refused".to_string())
        }
        async fn delete(&self, _key: &str) -> Result<(), String> {
            Err("connection refused".to_string())
        }
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let store = TieredCacheStore::in_memory();
        let key = CacheKey::datacenters("vc01");
        let nodes = datacenters(&["A", "B"]);

        store.put_nodes(key.clone(), nodes.clone(), Duration::from_secs(60)).await;
        store.put_nodes(key.clone(), nodes.clone(), Duration::from_secs(60)).await;

        let entry = store.get(&key).await.unwrap();
        assert_eq!(entry.nodes, nodes);
        assert_eq!(store.keys().len(), 1);
    }

    #[tokio::test]
    async fn test_disk_hit_is_promoted() {
        let dir = tempdir().unwrap();
        let memory = Arc::new(MemoryTier::new());
        let disk = Arc::new(DiskTier::new(dir.path()).unwrap());
        let key = CacheKey::datacenters("vc01");
        disk.put(Arc::new(CacheEntry::new(
            key.clone(),
            datacenters(&["A"]),
            Duration::from_secs(60),
        )))
        .await
        .unwrap();

        let store = TieredCacheStore::new(vec![tier(memory.clone()), tier(disk)]);
        assert!(store.get(&key).await.is_some());
        assert_eq!(memory.len(), 1);
        assert_eq!(store.metrics().disk_hits.load(Ordering::Relaxed), 1);

        store.get(&key).await.unwrap();
        assert_eq!(store.metrics().memory_hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_unavailable_shared_tier_is_a_miss() {
        let shared = Arc::new(SharedTier::new(Arc::new(DownStore), "t", 6, Duration::from_secs(60)));
        let store = TieredCacheStore::new(vec![tier(Arc::new(MemoryTier::new())), tier(shared)]);
        let key = CacheKey::datacenters("vc01");

        assert!(store.get(&key).await.is_none());

        // Writes still reach the memory tier
        store.put_nodes(key.clone(), datacenters(&["A"]), Duration::from_secs(60)).await;
        assert!(store.get(&key).await.is_some());
        assert!(store.metrics().tier_errors.load(Ordering::Relaxed) >= 2);
    }

    #[tokio::test]
    async fn test_corrupt_shared_entry_is_evicted() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let shared = Arc::new(SharedTier::new(kv.clone(), "t", 6, Duration::from_secs(60)));
        let key = CacheKey::datacenters("vc01");
        kv.set_ex(&shared.store_key(&key), b"garbage".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        let store = TieredCacheStore::new(vec![tier(Arc::new(MemoryTier::new())), tier(shared.clone())]);
        assert!(store.get(&key).await.is_none());
        assert!(kv.is_empty());
        assert_eq!(store.metrics().corruptions.load(Ordering::Relaxed), 1);

        // The key is usable again after the eviction
        store.put_nodes(key.clone(), datacenters(&["A"]), Duration::from_secs(60)).await;
        let entry = store.get(&key).await.unwrap();
        assert_eq!(entry.nodes, datacenters(&["A"]));
        let rewritten = shared.get(&key).await.unwrap().unwrap();
        assert_eq!(rewritten.nodes, entry.nodes);
        assert_eq!(store.metrics().corruptions.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_status_and_warm_up() {
        let dir = tempdir().unwrap();
        {
            let store = TieredCacheStore::new(vec![
                tier(Arc::new(MemoryTier::new())),
                tier(Arc::new(DiskTier::new(dir.path()).unwrap())),
            ]);
            store
                .put_nodes(CacheKey::datacenters("vc01"), datacenters(&["A"]), Duration::from_secs(60))
                .await;
            store
                .put_nodes(
                    CacheKey::new(Scope::datacenter("vc01", "dc-A"), NodeKind::Cluster),
                    vec![InventoryNode::new(NodeKind::Cluster, "c1", "Cluster 1")],
                    Duration::from_secs(60),
                )
                .await;
        }

        let memory = Arc::new(MemoryTier::new());
        let store = TieredCacheStore::new(vec![
            tier(memory.clone()),
            tier(Arc::new(DiskTier::new(dir.path()).unwrap())),
        ]);
        assert!(!store.status().kinds["datacenter"].exists);

        assert_eq!(store.warm_from_disk().await, 2);
        assert_eq!(memory.len(), 2);

        let status = store.status();
        assert!(status.kinds["datacenter"].exists);
        assert!(status.kinds["cluster"].exists);
        assert!(!status.kinds["template"].exists);
        assert!(status.kinds["cluster"].last_updated.is_some());
        assert_eq!(status.tiers, vec![CacheTier::Memory, CacheTier::Disk]);
    }

    #[tokio::test]
    async fn test_invalidate_removes_everywhere() {
        let dir = tempdir().unwrap();
        let disk = Arc::new(DiskTier::new(dir.path()).unwrap());
        let store = TieredCacheStore::new(vec![tier(Arc::new(MemoryTier::new())), tier(disk.clone())]);
        let key = CacheKey::datacenters("vc01");

        store.put_nodes(key.clone(), datacenters(&["A"]), Duration::from_secs(60)).await;
        store.invalidate(&key).await;

        assert!(store.get(&key).await.is_none());
        assert!(disk.get(&key).await.unwrap().is_none());
        assert!(!store.contains(&key));
    }

    #[tokio::test]
    async fn test_purge_memory_keeps_disk_copy() {
        let dir = tempdir().unwrap();
        let memory = Arc::new(MemoryTier::new());
        let store = TieredCacheStore::new(vec![
            tier(memory.clone()),
            tier(Arc::new(DiskTier::new(dir.path()).unwrap())),
        ]);
        let key = CacheKey::datacenters("vc01");
        let old = CacheEntry::new(key.clone(), datacenters(&["A"]), Duration::from_secs(60))
            .with_created_at(Utc::now() - chrono::Duration::hours(48));
        store.put(old).await;

        assert!(store.metrics().snapshot().last_purge.is_none());
        assert_eq!(store.purge_memory_older_than(Duration::from_secs(3600)).await, 1);
        assert!(memory.is_empty());
        assert!(store.metrics().snapshot().last_purge.is_some());
        // Still served from disk
        assert!(store.get(&key).await.is_some());
    }

    #[tokio::test]
    async fn test_purge_keeps_only_copy() {
        let store = TieredCacheStore::in_memory();
        let key = CacheKey::datacenters("vc01");
        let old = CacheEntry::new(key.clone(), datacenters(&["A"]), Duration::from_secs(60))
            .with_created_at(Utc::now() - chrono::Duration::hours(30));
        store.put(old).await;

        assert_eq!(store.purge_memory_older_than(Duration::from_secs(24 * 3600)).await, 0);
        let entry = store.get(&key).await.unwrap();
        assert!(entry.is_stale());
    }

    #[tokio::test]
    async fn test_purge_keeps_entry_when_shared_copy_is_gone() {
        let memory = Arc::new(MemoryTier::new());
        let kv = Arc::new(MemoryKeyValueStore::new());
        let shared = Arc::new(SharedTier::new(kv.clone(), "t", 6, Duration::from_secs(60)));
        let store = TieredCacheStore::new(vec![tier(memory.clone()), tier(shared)]);
        let key = CacheKey::datacenters("vc01");
        let old = CacheEntry::new(key.clone(), datacenters(&["A"]), Duration::from_secs(60))
            .with_created_at(Utc::now() - chrono::Duration::hours(30));
        store.put(old).await;
        for stored in kv.keys() {
            kv.delete(&stored).await.unwrap();
        }

        assert_eq!(store.purge_memory_older_than(Duration::from_secs(3600)).await, 0);
        assert_eq!(memory.len(), 1);
    }
}
