//! Shared test utilities and fixtures for the inventory cache test suite.
//!
//! This module provides:
//! - Instrumented inventory sources (counting, hanging, failing, oversized)
//! - Builders for configuration, populators and façades over in-memory stores
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use vsphere_inventory_cache::cache::TieredCacheStore;
use vsphere_inventory_cache::config::{CacheTtls, Config};
use vsphere_inventory_cache::facade::QueryFacade;
use vsphere_inventory_cache::fetcher::{
    FetchError, InventorySource, MockInventorySource, ResourceFetcher,
};
use vsphere_inventory_cache::inventory::{InventoryNode, NodeKind, Scope};
use vsphere_inventory_cache::populate::CachePopulator;
use vsphere_inventory_cache::progress::SyncTracker;
use vsphere_inventory_cache::scheduler::RefreshScheduler;

pub const SERVER: &str = "vc01";

// ============================================================================
// Inventory Sources
// ============================================================================

/// Wraps the demo inventory, counting calls and concurrent listings
pub struct CountingSource {
    inner: MockInventorySource,
    delay: Duration,
    calls: DashMap<String, usize>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl CountingSource {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: MockInventorySource::new(),
            delay,
            calls: DashMap::new(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Calls made for one `(kind, scope)`
    pub fn calls_for(&self, kind: NodeKind, scope: &Scope) -> usize {
        self.calls
            .get(&format!("{}#{}", scope, kind))
            .map(|c| *c)
            .unwrap_or(0)
    }

    /// Total calls
    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|c| *c.value()).sum()
    }

    /// Highest number of listings observed at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InventorySource for CountingSource {
    fn name(&self) -> &str {
        "counting"
    }

    async fn list(
        &self,
        kind: NodeKind,
        scope: &Scope,
        limit: usize,
    ) -> Result<Vec<InventoryNode>, FetchError> {
        *self.calls.entry(format!("{}#{}", scope, kind)).or_insert(0) += 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self.inner.list(kind, scope, limit).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// A platform that never answers
pub struct HangingSource;

#[async_trait]
impl InventorySource for HangingSource {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn list(
        &self,
        _kind: NodeKind,
        _scope: &Scope,
        _limit: usize,
    ) -> Result<Vec<InventoryNode>, FetchError> {
        std::future::pending().await
    }
}

/// A platform that rejects every call
pub struct FailingSource;

#[async_trait]
impl InventorySource for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }

    async fn list(
        &self,
        _kind: NodeKind,
        _scope: &Scope,
        _limit: usize,
    ) -> Result<Vec<InventoryNode>, FetchError> {
        Err(FetchError::protocol("503 Service Unavailable"))
    }
}

/// Returns `count` numbered nodes of whatever kind is asked for
pub struct NumberedSource(pub usize);

#[async_trait]
impl InventorySource for NumberedSource {
    fn name(&self) -> &str {
        "numbered"
    }

    async fn list(
        &self,
        kind: NodeKind,
        _scope: &Scope,
        _limit: usize,
    ) -> Result<Vec<InventoryNode>, FetchError> {
        Ok((0..self.0)
            .map(|i| InventoryNode::new(kind, format!("{}-{}", kind, i), format!("{} {}", kind, i)))
            .collect())
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Default configuration bound to [`SERVER`]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.vsphere.server = SERVER.to_string();
    config
}

/// Populator over a fresh in-memory store
pub fn populator(source: Arc<dyn InventorySource>, config: &Config) -> Arc<CachePopulator> {
    let fetcher = ResourceFetcher::new(source, &config.fetch);
    Arc::new(CachePopulator::new(
        fetcher,
        Arc::new(TieredCacheStore::in_memory()),
        config.cache.ttl.clone(),
    ))
}

/// Scheduler with its own tracker
pub fn scheduler(source: Arc<dyn InventorySource>, config: &Config) -> RefreshScheduler {
    RefreshScheduler::new(
        populator(source, config),
        Arc::new(SyncTracker::new()),
        config.scheduler.max_concurrency,
    )
}

/// Façade over a fresh in-memory store
pub fn facade(source: Arc<dyn InventorySource>, config: &Config) -> QueryFacade {
    QueryFacade::with_store(config, source, Arc::new(TieredCacheStore::in_memory()))
}

/// Façade over the demo inventory
pub fn mock_facade() -> QueryFacade {
    facade(Arc::new(MockInventorySource::new()), &test_config())
}

/// TTLs of one minute for every kind
pub fn minute_ttls() -> CacheTtls {
    CacheTtls::uniform(Duration::from_secs(60))
}

/// A scope for each NONPROD cluster
pub fn nonprod_cluster(n: usize) -> Scope {
    Scope::cluster(SERVER, "datacenter-np", format!("cluster-np-{}", n))
}
