//! # vsphere-inventory-cache - Non-blocking vSphere inventory for self-service portals
//!
//! This crate serves the vSphere inventory tree (datacenters, clusters, and
//! per-cluster resource pools, datastores, networks and templates) to a web
//! UI without ever blocking on a slow or failing vCenter. Answers come from a
//! multi-tier cache; misses are filled tier by tier on demand, and background
//! tasks keep the cache warm.
//!
//! ## Core Concepts
//!
//! - **Inventory nodes**: pruned, immutable inventory objects
//! - **Scopes**: `server/datacenter/cluster` paths that key cache entries
//! - **Tiers**: memory, shared (Redis) and disk, read fastest first
//! - **Loader**: cache-first reads with a bounded wait on misses
//! - **Scheduler**: bounded-concurrency background refreshes and syncs
//! - **Façade**: the query surface that reports `fresh`, `stale` or `loading`
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │               HTTP adapter (axum) / CLI (clap)                       │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           Query Façade                               │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!          ┌─────────────────────────┼─────────────────────────┐
//!          ▼                         ▼                         ▼
//! ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────────┐
//! │  Hierarchical   │   │  Refresh Scheduler  │   │  Sync Progress      │
//! │  Loader         │   │  (semaphore-bound)  │   │  Tracker            │
//! └─────────────────┘   └─────────────────────┘   └─────────────────────┘
//!          │                         │
//!          └────────────┬────────────┘
//!                       ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │   Cache Populator: Resource Fetcher → Pruner → Tiered Cache Store    │
//! └─────────────────────────────────────────────────────────────────────┘
//!                       │                              │
//!                       ▼                              ▼
//!            vCenter REST API             memory → Redis → disk
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vsphere_inventory_cache::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load(None)?;
//!     let source = Arc::new(MockInventorySource::new());
//!     let facade = QueryFacade::from_config(&config, source)?;
//!
//!     let response = facade.get_datacenters(facade.server()).await;
//!     println!("{:?}: {} datacenters", response.status, response.data.datacenters.len());
//!     Ok(())
//! }
//! ```

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::cache::{CacheEntry, CacheKey, CacheTier, TieredCacheStore};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorContext, Result};
    pub use crate::facade::{QueryFacade, QueryResponse, SyncTrigger};
    pub use crate::fetcher::{
        FetchError, InventorySource, MockInventorySource, ResourceFetcher, VsphereRestSource,
    };
    pub use crate::inventory::{InventoryNode, NodeKind, ResourceRef, Scope};
    pub use crate::loader::{Freshness, HierarchicalLoader, LoadState};
    pub use crate::progress::{SyncProgress, SyncStatus, SyncTracker};
    pub use crate::scheduler::{RefreshHandle, RefreshScheduler, SyncMode};
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types for the inventory cache.
///
/// Component errors ([`FetchError`](fetcher::FetchError),
/// [`TierError`](cache::TierError), [`ConfigError`](config::ConfigError))
/// convert into the crate-level [`Error`](error::Error).
pub mod error;

/// Configuration loading, layering and validation.
pub mod config;

/// Inventory value types: nodes, scopes, references and attribute pruning.
pub mod inventory;

// ============================================================================
// Cache
// ============================================================================

/// Multi-tier cache store.
///
/// Entries are keyed by `(scope, kind)` and read through a chain of tiers,
/// fastest first. Slower-tier hits are promoted; corrupt or unreachable
/// tiers degrade to misses.
pub mod cache;

/// Fetch-prune-store pipeline with in-flight deduplication.
pub mod populate;

// ============================================================================
// Upstream
// ============================================================================

/// Resource fetcher and inventory sources (vCenter REST, mock).
pub mod fetcher;

// ============================================================================
// Loading and Scheduling
// ============================================================================

/// Hierarchical on-demand loader.
pub mod loader;

/// Background refresh scheduler and sync orchestration.
pub mod scheduler;

/// Process-wide sync progress.
pub mod progress;

/// Cache-first query surface.
pub mod facade;

// ============================================================================
// HTTP Adapter
// ============================================================================

/// HTTP adapter over the query façade.
#[cfg(feature = "api")]
pub mod api;

pub use error::{Error, Result};

// ============================================================================
// Version Information
// ============================================================================

/// Returns the current version of the crate.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns detailed version information including build metadata.
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION"),
        target: std::env::consts::ARCH,
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
        redis: cfg!(feature = "redis"),
    }
}

/// Detailed version information for the build.
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Semantic version string
    pub version: &'static str,
    /// Target architecture
    pub target: &'static str,
    /// Build profile (debug or release)
    pub profile: &'static str,
    /// Whether the shared Redis tier is compiled in
    pub redis: bool,
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "vsphere-cache {} ({}, {}{})",
            self.version,
            self.target,
            self.profile,
            if self.redis { ", redis" } else { "" }
        )
    }
}
