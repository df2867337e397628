//! Hierarchical, on-demand inventory loading.
//!
//! The loader fills the cache one tier at a time as the UI walks down the
//! tree: datacenters of a server, clusters of a datacenter, resources of a
//! cluster. Reads are cache-first. A miss waits for the fetch at most
//! `sync_wait`; past that the caller gets a `Loading` outcome and the fetch
//! keeps running detached so the next poll finds it cached. Stale hits are
//! returned as they are and refreshed in the background.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheKey, TieredCacheStore};
use crate::config::LoaderConfig;
use crate::inventory::{InventoryNode, NodeKind, ResourceRef, Scope, ScopeLevel};
use crate::populate::{CachePopulator, PopulateResult};
use crate::scheduler::RefreshScheduler;

/// How deep the cached data under a scope reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadDepth {
    /// Datacenter lists only
    DatacentersOnly,
    /// Cluster lists
    Clusters,
    /// Per-cluster resources
    Full,
}

/// Load state of a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "depth")]
pub enum LoadState {
    /// Nothing cached, nothing in flight
    Unloaded,
    /// Nothing cached yet, a fetch is in flight
    Loading,
    /// Cached data down to the given depth
    Loaded(LoadDepth),
    /// Cached data present while a fetch is in flight
    Refreshing,
}

/// Freshness of a load result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Cached and within TTL
    Fresh,
    /// Cached but past TTL; a refresh was triggered
    Stale,
    /// Nothing cached yet
    Loading,
}

/// Result of one load
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    /// Best available entry
    pub entry: Option<Arc<CacheEntry>>,
    pub freshness: Freshness,
    /// Set when the load degraded
    pub warning: Option<String>,
}

impl LoadOutcome {
    fn cached(entry: Arc<CacheEntry>) -> Self {
        let freshness = if entry.is_stale() {
            Freshness::Stale
        } else {
            Freshness::Fresh
        };
        Self {
            entry: Some(entry),
            freshness,
            warning: None,
        }
    }

    fn loading(warning: impl Into<String>) -> Self {
        Self {
            entry: None,
            freshness: Freshness::Loading,
            warning: Some(warning.into()),
        }
    }

    /// Nodes of the entry, empty while loading
    pub fn nodes(&self) -> &[InventoryNode] {
        self.entry.as_ref().map(|e| e.nodes.as_slice()).unwrap_or(&[])
    }

    /// When the entry was fetched
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.entry.as_ref().map(|e| e.created_at)
    }

    /// Whether the entry hit its fetch cap
    pub fn truncated(&self) -> bool {
        self.entry.as_ref().map(|e| e.truncated).unwrap_or(false)
    }

    /// Whether nothing is cached yet
    pub fn is_loading(&self) -> bool {
        self.freshness == Freshness::Loading
    }
}

/// The four per-cluster resource lists
#[derive(Debug, Clone)]
pub struct ResourceSet {
    pub resource_pools: LoadOutcome,
    pub datastores: LoadOutcome,
    pub networks: LoadOutcome,
    pub templates: LoadOutcome,
}

impl ResourceSet {
    /// All four outcomes
    pub fn outcomes(&self) -> [&LoadOutcome; 4] {
        [
            &self.resource_pools,
            &self.datastores,
            &self.networks,
            &self.templates,
        ]
    }
}

/// Result of resolving a cluster reference against the cache alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterLookup {
    /// Resolved to a full cluster scope
    Found(Scope),
    /// Every cluster list of the server is cached and none matches
    NotFound,
    /// Some lists are not cached yet
    Unknown,
}

/// Tier-by-tier loader over the cache store
pub struct HierarchicalLoader {
    populator: Arc<CachePopulator>,
    scheduler: RefreshScheduler,
    sync_wait: Duration,
    prefetch_fanout: usize,
}

impl HierarchicalLoader {
    /// Create a loader; `sync_wait` is clamped to the fetch timeout
    pub fn new(scheduler: RefreshScheduler, config: &LoaderConfig) -> Self {
        let populator = Arc::clone(scheduler.populator());
        let sync_wait = config.sync_wait.min(populator.fetcher().timeout());
        Self {
            populator,
            scheduler,
            sync_wait,
            prefetch_fanout: config.prefetch_fanout,
        }
    }

    /// Bounded wait applied to cache misses
    pub fn sync_wait(&self) -> Duration {
        self.sync_wait
    }

    pub fn store(&self) -> &Arc<TieredCacheStore> {
        self.populator.store()
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    /// Load one entry
    ///
    /// A failed miss schedules a background retry and returns `Loading`.
    pub async fn load(&self, key: CacheKey) -> LoadOutcome {
        if let Some(entry) = self.store().get(&key).await {
            if entry.is_stale() {
                debug!(key = %key, age = ?entry.age(), "stale hit, refreshing in background");
                self.scheduler.trigger_refresh(key);
            }
            return LoadOutcome::cached(entry);
        }

        match tokio::time::timeout(self.sync_wait, self.populator.populate(key.clone())).await {
            Ok(Ok(entry)) => LoadOutcome::cached(entry),
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "load failed, nothing cached");
                let warning = format!("Could not load {} for {}: {}", key.kind, key.scope, e);
                self.scheduler.trigger_refresh(key);
                LoadOutcome::loading(warning)
            }
            Err(_) => {
                debug!(key = %key, wait = ?self.sync_wait, "load still running in background");
                LoadOutcome::loading(format!("{} for {} are still loading", key.kind, key.scope))
            }
        }
    }

    /// Datacenters of a server; warms clusters of the first few
    pub async fn load_datacenters(&self, server: &str) -> LoadOutcome {
        let key = CacheKey::datacenters(server);
        let outcome = self.load(key.clone()).await;
        self.prefetch_children(&key.scope, outcome.nodes(), &[NodeKind::Cluster]);
        outcome
    }

    /// Clusters of a datacenter; warms resources of the first few
    pub async fn load_clusters(&self, server: &str, datacenter: &str) -> LoadOutcome {
        let key = CacheKey::clusters(server, datacenter);
        let outcome = self.load(key.clone()).await;
        self.prefetch_children(&key.scope, outcome.nodes(), &NodeKind::CLUSTER_RESOURCES);
        outcome
    }

    /// The four resource lists of a cluster, loaded concurrently
    pub async fn load_resources(&self, cluster: &Scope) -> ResourceSet {
        let key = |kind| CacheKey::new(cluster.clone(), kind);
        let (resource_pools, datastores, networks, templates) = tokio::join!(
            self.load(key(NodeKind::ResourcePool)),
            self.load(key(NodeKind::Datastore)),
            self.load(key(NodeKind::Network)),
            self.load(key(NodeKind::Template)),
        );
        ResourceSet {
            resource_pools,
            datastores,
            networks,
            templates,
        }
    }

    /// Cached entry for `key` at any staleness, else a full fetch
    pub async fn ensure_loaded(&self, key: CacheKey) -> PopulateResult {
        if let Some(entry) = self.store().get(&key).await {
            return Ok(entry);
        }
        self.populator.populate(key).await
    }

    /// Resolve a cluster reference using cached lists only
    pub async fn find_cached_cluster(&self, server: &str, reference: &ResourceRef) -> ClusterLookup {
        let Some(datacenters) = self.store().get(&CacheKey::datacenters(server)).await else {
            return ClusterLookup::Unknown;
        };

        let mut complete = true;
        for dc in &datacenters.nodes {
            match self.store().get(&CacheKey::clusters(server, dc.id.as_str())).await {
                Some(clusters) => {
                    if let Some(cluster) = reference.resolve(&clusters.nodes) {
                        return ClusterLookup::Found(Scope::cluster(
                            server,
                            dc.id.as_str(),
                            cluster.id.as_str(),
                        ));
                    }
                }
                None => complete = false,
            }
        }

        if complete {
            ClusterLookup::NotFound
        } else {
            ClusterLookup::Unknown
        }
    }

    /// Resolve a cluster reference, loading datacenters and clusters as needed
    ///
    /// Waits for fetches without bound, so only call it off the request
    /// path.
    pub async fn locate_cluster(
        &self,
        server: &str,
        reference: &ResourceRef,
    ) -> Result<Option<Scope>, crate::fetcher::FetchError> {
        if let ClusterLookup::Found(scope) = self.find_cached_cluster(server, reference).await {
            return Ok(Some(scope));
        }

        let datacenters = self.ensure_loaded(CacheKey::datacenters(server)).await?;
        for dc in &datacenters.nodes {
            let clusters = match self.ensure_loaded(CacheKey::clusters(server, dc.id.as_str())).await {
                Ok(clusters) => clusters,
                Err(e) => {
                    warn!(datacenter = %dc.id, error = %e, "skipping datacenter while locating cluster");
                    continue;
                }
            };
            if let Some(cluster) = reference.resolve(&clusters.nodes) {
                return Ok(Some(Scope::cluster(server, dc.id.as_str(), cluster.id.as_str())));
            }
        }
        Ok(None)
    }

    /// Load state of a scope
    pub fn state(&self, scope: &Scope) -> LoadState {
        let depth = self
            .store()
            .keys()
            .iter()
            .filter(|key| scope.contains(&key.scope))
            .map(|key| match key.scope.level() {
                ScopeLevel::Server => LoadDepth::DatacentersOnly,
                ScopeLevel::Datacenter => LoadDepth::Clusters,
                ScopeLevel::Cluster => LoadDepth::Full,
            })
            .max();
        let inflight = self.populator.is_inflight_within(scope);

        match (depth, inflight) {
            (None, false) => LoadState::Unloaded,
            (None, true) => LoadState::Loading,
            (Some(_), true) => LoadState::Refreshing,
            (Some(depth), false) => LoadState::Loaded(depth),
        }
    }

    fn prefetch_children(&self, scope: &Scope, nodes: &[InventoryNode], kinds: &[NodeKind]) {
        for child in nodes
            .iter()
            .take(self.prefetch_fanout)
            .filter_map(|node| scope.child(node))
        {
            for kind in kinds {
                let key = CacheKey::new(child.clone(), *kind);
                if self.store().contains(&key) || self.populator.is_inflight(&key) {
                    continue;
                }
                debug!(key = %key, "prefetching");
                self.scheduler.prefetch(key);
            }
        }
    }
}
