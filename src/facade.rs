//! Query façade.
//!
//! The only surface the UI (through the HTTP adapter or the CLI) talks to.
//! Every query answers from the cache when it can, stale or not, and never
//! waits longer than the loader's bounded wait. The answer carries one of
//! three statuses:
//!
//! - `fresh`: cached and within TTL
//! - `stale`: cached but past TTL, with a background refresh queued
//! - `loading`: nothing cached yet; population runs in the background and
//!   `retry_after_secs` says when to poll again

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{CacheKey, CacheStatus, TieredCacheStore};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::{InventorySource, ResourceFetcher};
use crate::inventory::{InventoryNode, NodeKind, ResourceRef, Scope};
use crate::loader::{ClusterLookup, Freshness, HierarchicalLoader, LoadOutcome, LoadState, ResourceSet};
use crate::populate::CachePopulator;
use crate::progress::{SyncProgress, SyncTracker};
use crate::scheduler::{RefreshHandle, RefreshScheduler, SyncMode};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Envelope around every query result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse<T> {
    pub status: Freshness,
    /// Fetch time of the oldest entry the answer is built from
    pub last_updated: Option<DateTime<Utc>>,
    /// Whether any list hit its fetch cap
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(flatten)]
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatacenterView {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterView {
    pub id: String,
    pub name: String,
    pub host_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePoolView {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatastoreView {
    pub id: String,
    pub name: String,
    /// Free space in GiB, two decimals
    pub free_gb: f64,
    pub capacity_gb: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datastore_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkView {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateView {
    pub id: String,
    pub name: String,
    pub guest_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatacentersData {
    pub datacenters: Vec<DatacenterView>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClustersData {
    pub clusters: Vec<ClusterView>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcesData {
    /// Resolved cluster id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    pub resource_pools: Vec<ResourcePoolView>,
    pub datastores: Vec<DatastoreView>,
    pub networks: Vec<NetworkView>,
    pub templates: Vec<TemplateView>,
}

fn gigabytes(bytes: Option<u64>) -> f64 {
    let gb = bytes.unwrap_or(0) as f64 / BYTES_PER_GB;
    (gb * 100.0).round() / 100.0
}

impl From<&InventoryNode> for DatacenterView {
    fn from(node: &InventoryNode) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
        }
    }
}

impl From<&InventoryNode> for ClusterView {
    fn from(node: &InventoryNode) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            host_count: node.host_count().unwrap_or(0),
        }
    }
}

impl From<&InventoryNode> for ResourcePoolView {
    fn from(node: &InventoryNode) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
        }
    }
}

impl From<&InventoryNode> for DatastoreView {
    fn from(node: &InventoryNode) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            free_gb: gigabytes(node.free_bytes()),
            capacity_gb: gigabytes(node.capacity_bytes()),
            datastore_type: node.str_attribute("datastore_type").map(str::to_string),
        }
    }
}

impl From<&InventoryNode> for NetworkView {
    fn from(node: &InventoryNode) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            network_type: node.str_attribute("network_type").map(str::to_string),
        }
    }
}

impl From<&InventoryNode> for TemplateView {
    fn from(node: &InventoryNode) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            guest_id: node.guest_os_id().map(str::to_string),
        }
    }
}

fn views<'a, T: From<&'a InventoryNode>>(outcome: &'a LoadOutcome) -> Vec<T> {
    outcome.nodes().iter().map(T::from).collect()
}

impl ResourcesData {
    fn from_set(cluster: &Scope, set: &ResourceSet) -> Self {
        Self {
            cluster_id: cluster.cluster_id().map(str::to_string),
            resource_pools: views(&set.resource_pools),
            datastores: views(&set.datastores),
            networks: views(&set.networks),
            templates: views(&set.templates),
        }
    }
}

/// Answer to a sync request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum SyncTrigger {
    /// A new sync was started
    Accepted { sync_id: Uuid, mode: SyncMode },
    /// Another sync is running
    Rejected { reason: String, progress: SyncProgress },
}

impl SyncTrigger {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SyncTrigger::Accepted { .. })
    }
}

/// Cache status with loader and sync state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatusReport {
    pub server: String,
    pub load_state: LoadState,
    #[serde(flatten)]
    pub cache: CacheStatus,
    pub sync: SyncProgress,
}

/// Cache-first query entry point
pub struct QueryFacade {
    server: String,
    loader: Arc<HierarchicalLoader>,
    scheduler: RefreshScheduler,
    tracker: Arc<SyncTracker>,
    retry_after: Duration,
    retention: Duration,
    sync_interval: Duration,
}

impl QueryFacade {
    /// Build the full stack from configuration
    pub fn from_config(config: &Config, source: Arc<dyn InventorySource>) -> Result<Self> {
        let store = TieredCacheStore::from_config(&config.cache)?;
        Ok(Self::with_store(config, source, Arc::new(store)))
    }

    /// Build the stack over an existing store
    pub fn with_store(config: &Config, source: Arc<dyn InventorySource>, store: Arc<TieredCacheStore>) -> Self {
        let fetcher = ResourceFetcher::new(source, &config.fetch);
        let populator = Arc::new(CachePopulator::new(fetcher, store, config.cache.ttl.clone()));
        let tracker = Arc::new(SyncTracker::new());
        let scheduler = RefreshScheduler::new(
            populator,
            Arc::clone(&tracker),
            config.scheduler.max_concurrency,
        );
        let loader = Arc::new(HierarchicalLoader::new(scheduler.clone(), &config.loader));

        Self {
            server: config.vsphere.server.clone(),
            loader,
            scheduler,
            tracker,
            retry_after: config.loader.retry_after,
            retention: config.cache.retention,
            sync_interval: config.scheduler.sync_interval,
        }
    }

    /// Default server name
    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn loader(&self) -> &HierarchicalLoader {
        &self.loader
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    pub fn store(&self) -> &Arc<TieredCacheStore> {
        self.loader.store()
    }

    /// Load persisted entries and start the periodic sync
    pub async fn start(&self) -> Option<JoinHandle<()>> {
        let warmed = self.store().warm_from_disk().await;
        info!(server = %self.server, warmed, "query façade started");
        self.scheduler
            .spawn_periodic_sync(self.server.clone(), self.sync_interval, self.retention)
    }

    /// Datacenters of a server
    pub async fn get_datacenters(&self, server: &str) -> QueryResponse<DatacentersData> {
        let outcome = self.loader.load_datacenters(server).await;
        let data = DatacentersData {
            datacenters: views(&outcome),
        };
        self.respond(&[&outcome], data)
    }

    /// Clusters of a datacenter
    pub async fn get_clusters(&self, server: &str, datacenter: &str) -> QueryResponse<ClustersData> {
        let outcome = self.loader.load_clusters(server, datacenter).await;
        let data = ClustersData {
            clusters: views(&outcome),
        };
        self.respond(&[&outcome], data)
    }

    /// Resources of a cluster on the default server
    ///
    /// Fails with [`Error::UnknownResource`] only when every cluster list is
    /// cached and none holds the reference.
    pub async fn get_resources(&self, cluster: &ResourceRef) -> Result<QueryResponse<ResourcesData>> {
        let scope = match self.loader.find_cached_cluster(&self.server, cluster).await {
            ClusterLookup::Found(scope) => scope,
            ClusterLookup::NotFound => return Err(Error::unknown_resource("cluster", cluster.to_string())),
            ClusterLookup::Unknown => {
                let handle = self.locate_in_background(cluster);
                if tokio::time::timeout(self.loader.sync_wait(), handle.wait()).await.is_err() {
                    debug!(cluster = %cluster, "cluster lookup still running");
                }
                match self.loader.find_cached_cluster(&self.server, cluster).await {
                    ClusterLookup::Found(scope) => scope,
                    ClusterLookup::NotFound => {
                        return Err(Error::unknown_resource("cluster", cluster.to_string()))
                    }
                    ClusterLookup::Unknown => {
                        return Ok(self.loading(
                            ResourcesData::default(),
                            format!("Looking up cluster {}", cluster.value()),
                        ))
                    }
                }
            }
        };

        let set = self.loader.load_resources(&scope).await;
        Ok(self.respond(&set.outcomes(), ResourcesData::from_set(&scope, &set)))
    }

    /// Per-kind cache presence plus sync state
    pub fn get_cache_status(&self) -> CacheStatusReport {
        CacheStatusReport {
            server: self.server.clone(),
            load_state: self.loader.state(&Scope::server(self.server.as_str())),
            cache: self.store().status(),
            sync: self.tracker.snapshot(),
        }
    }

    /// Start a sync of the default server
    pub fn trigger_sync(&self, mode: SyncMode) -> SyncTrigger {
        match self.scheduler.start_sync(&self.server, mode) {
            Ok(sync_id) => SyncTrigger::Accepted { sync_id, mode },
            Err(e) => SyncTrigger::Rejected {
                reason: e.to_string(),
                progress: self.tracker.snapshot(),
            },
        }
    }

    pub fn sync_progress(&self) -> SyncProgress {
        self.tracker.snapshot()
    }

    /// Manually refresh one entry
    pub fn refresh(&self, scope: Scope, kind: NodeKind) -> Result<RefreshHandle> {
        let key = CacheKey::new(scope, kind);
        if !key.is_well_formed() {
            return Err(Error::Internal(format!("{} are not cached at {}", kind, key.scope)));
        }
        Ok(self.scheduler.trigger_refresh(key))
    }

    fn locate_in_background(&self, cluster: &ResourceRef) -> RefreshHandle {
        let loader = Arc::clone(&self.loader);
        let server = self.server.clone();
        let reference = cluster.clone();
        self.scheduler
            .submit(format!("locate {}/{}", server, reference), async move {
                let scope = loader
                    .locate_cluster(&server, &reference)
                    .await?
                    .ok_or_else(|| Error::unknown_resource("cluster", reference.to_string()))?;
                for kind in NodeKind::CLUSTER_RESOURCES {
                    loader.ensure_loaded(CacheKey::new(scope.clone(), kind)).await?;
                }
                Ok(())
            })
    }

    fn respond<T>(&self, outcomes: &[&LoadOutcome], data: T) -> QueryResponse<T> {
        // Partial data is still loading, not stale
        let status = if outcomes.iter().any(|o| o.is_loading()) {
            Freshness::Loading
        } else if outcomes.iter().any(|o| o.freshness != Freshness::Fresh) {
            Freshness::Stale
        } else {
            Freshness::Fresh
        };

        let warnings: Vec<&str> = outcomes.iter().filter_map(|o| o.warning.as_deref()).collect();
        let any_loading = outcomes.iter().any(|o| o.is_loading());

        QueryResponse {
            status,
            last_updated: outcomes.iter().filter_map(|o| o.last_updated()).min(),
            truncated: outcomes.iter().any(|o| o.truncated()),
            message: (!warnings.is_empty()).then(|| warnings.join("; ")),
            retry_after_secs: any_loading.then(|| self.retry_after.as_secs().max(1)),
            data,
        }
    }

    fn loading<T>(&self, data: T, message: String) -> QueryResponse<T> {
        QueryResponse {
            status: Freshness::Loading,
            last_updated: None,
            truncated: false,
            message: Some(message),
            retry_after_secs: Some(self.retry_after.as_secs().max(1)),
            data,
        }
    }
}
