//! Multi-tier inventory cache
//!
//! Entries are keyed by `(scope, kind)` and hold the pruned node list of one
//! inventory call. Reads walk a chain of tiers from fastest to slowest:
//!
//! ```text
//! +------------------+    +------------------+    +------------------+
//! |  Memory tier     | -> |  Shared tier     | -> |  Disk tier       |
//! |  (DashMap)       |    |  (Redis, gzip)   |    |  (JSON files)    |
//! +------------------+    +------------------+    +------------------+
//! ```
//!
//! A hit in a slower tier is promoted into every faster tier. Entries are
//! never mutated in place; a refresh builds a new entry and replaces the old
//! one atomically. Staleness is advisory: stale entries are still served.

pub mod codec;
pub mod disk;
pub mod memory;
pub mod shared;
pub mod tiered;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::inventory::{InventoryNode, NodeKind, Scope};

pub use codec::{compress, decompress, Codec};
pub use disk::DiskTier;
pub use memory::MemoryTier;
pub use shared::{KeyValueStore, MemoryKeyValueStore, SharedTier};
#[cfg(feature = "redis")]
pub use shared::RedisKeyValueStore;
pub use tiered::{CacheMetrics, CacheStatus, KindStatus, MetricsSnapshot, TieredCacheStore};

/// Cache tier identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    /// In-process map, fastest access
    Memory,
    /// Shared persistent store (Redis)
    Shared,
    /// Local JSON files
    Disk,
}

impl CacheTier {
    /// Stable lowercase name for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Memory => "memory",
            CacheTier::Shared => "shared",
            CacheTier::Disk => "disk",
        }
    }
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a single cache tier
///
/// The tiered store never lets these escape a read: a corrupt payload is
/// evicted and an unavailable tier is skipped.
#[derive(Debug, Error)]
pub enum TierError {
    #[error("Corrupt {tier} cache entry '{key}': {message}")]
    Corrupt {
        tier: CacheTier,
        key: String,
        message: String,
    },

    #[error("{tier} cache tier unavailable: {message}")]
    Unavailable { tier: CacheTier, message: String },

    #[error("{tier} cache tier I/O error: {source}")]
    Io {
        tier: CacheTier,
        #[source]
        source: std::io::Error,
    },
}

impl TierError {
    /// Tier that raised the error
    pub fn tier(&self) -> CacheTier {
        match self {
            TierError::Corrupt { tier, .. }
            | TierError::Unavailable { tier, .. }
            | TierError::Io { tier, .. } => *tier,
        }
    }

    /// Whether the payload itself is bad (as opposed to the tier)
    pub fn is_corruption(&self) -> bool {
        matches!(self, TierError::Corrupt { .. })
    }
}

/// Result type for tier operations
pub type TierResult<T> = Result<T, TierError>;

/// Composite cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Subtree the entry covers
    pub scope: Scope,
    /// Kind of the cached nodes
    pub kind: NodeKind,
}

impl CacheKey {
    /// Create a key
    pub fn new(scope: Scope, kind: NodeKind) -> Self {
        Self { scope, kind }
    }

    /// Datacenter list of a server
    pub fn datacenters(server: impl Into<String>) -> Self {
        Self::new(Scope::server(server), NodeKind::Datacenter)
    }

    /// Cluster list of a datacenter
    pub fn clusters(server: impl Into<String>, datacenter: impl Into<String>) -> Self {
        Self::new(Scope::datacenter(server, datacenter), NodeKind::Cluster)
    }

    /// Whether the kind is stored at the scope's level
    pub fn is_well_formed(&self) -> bool {
        self.scope.holds(self.kind)
    }

    /// Deterministic name used by persistent tiers: `<scope-path>__<kind>`
    /// with every character outside `[A-Za-z0-9._-]` replaced by `_`
    pub fn storage_name(&self) -> String {
        let sanitized: String = self
            .scope
            .path()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}__{}", sanitized, self.kind.as_str())
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.scope, self.kind)
    }
}

/// One cached node collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Key the entry is stored under
    pub key: CacheKey,
    /// Pruned nodes in platform order
    pub nodes: Vec<InventoryNode>,
    /// When the data was fetched
    pub created_at: DateTime<Utc>,
    /// Freshness window in seconds
    pub ttl_seconds: u64,
    /// The fetch hit the per-kind cap
    #[serde(default)]
    pub truncated: bool,
    /// Number of nodes the platform reported before truncation
    #[serde(default)]
    pub total_available: usize,
}

impl CacheEntry {
    /// Create an entry stamped now
    pub fn new(key: CacheKey, nodes: Vec<InventoryNode>, ttl: Duration) -> Self {
        let total_available = nodes.len();
        Self {
            key,
            nodes,
            created_at: Utc::now(),
            ttl_seconds: ttl.as_secs(),
            truncated: false,
            total_available,
        }
    }

    /// Record that the node list was cut at the per-kind cap
    pub fn with_truncation(mut self, truncated: bool, total_available: usize) -> Self {
        self.truncated = truncated;
        self.total_available = total_available.max(self.nodes.len());
        self
    }

    /// Override the creation time
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// TTL as a duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Stale when more than `ttl_seconds` have passed since creation
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        (now - self.created_at).num_milliseconds() > (self.ttl_seconds as i64).saturating_mul(1000)
    }

    /// Staleness against the wall clock
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }

    /// Age of the entry (zero if the clock went backwards)
    pub fn age(&self) -> Duration {
        (Utc::now() - self.created_at).to_std().unwrap_or_default()
    }

    /// Number of cached nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the entry holds no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// One storage tier in the read chain
#[async_trait]
pub trait CacheTierBackend: Send + Sync {
    /// Which tier this is
    fn tier(&self) -> CacheTier;

    /// Read an entry; `Ok(None)` is a plain miss
    async fn get(&self, key: &CacheKey) -> TierResult<Option<Arc<CacheEntry>>>;

    /// Replace the entry for `entry.key` as a whole
    async fn put(&self, entry: Arc<CacheEntry>) -> TierResult<()>;

    /// Remove an entry; removing a missing entry is not an error
    async fn invalidate(&self, key: &CacheKey) -> TierResult<()>;

    /// Entries this tier can enumerate without a network round trip
    async fn scan(&self) -> TierResult<Vec<Arc<CacheEntry>>> {
        Ok(Vec::new())
    }
}
