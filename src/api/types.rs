//! Request and response types for the API.

use serde::{Deserialize, Serialize};

use crate::cache::CacheTier;
use crate::inventory::ResourceRef;
use crate::progress::SyncStatus;
use crate::scheduler::SyncMode;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Health status
    pub status: String,
    /// Crate version
    pub version: String,
    /// Server uptime in seconds
    pub uptime_secs: u64,
    /// Default vCenter server
    pub server: String,
    /// Configured tier chain
    pub tiers: Vec<CacheTier>,
    /// Status of the last sync
    pub sync: SyncStatus,
}

/// How a path segment references a cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    #[default]
    Id,
    Name,
}

/// Query string of the resources endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourcesQuery {
    /// `id` (default) or `name`
    #[serde(default)]
    pub by: RefKind,
}

impl ResourcesQuery {
    /// Build the reference for a path segment
    pub fn reference(&self, value: String) -> ResourceRef {
        match self.by {
            RefKind::Id => ResourceRef::ById(value),
            RefKind::Name => ResourceRef::ByName(value),
        }
    }
}

/// Query string of the sync endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncQuery {
    #[serde(default)]
    pub mode: SyncMode,
}
