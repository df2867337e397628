//! Inventory node definitions.
//!
//! An [`InventoryNode`] is one object of the vSphere inventory tree: a
//! datacenter, cluster, resource pool, datastore, network or VM template.
//! Nodes are plain values; once a node has been pruned and published into a
//! cache entry nothing mutates it again.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

use super::scope::ScopeLevel;

/// Kind of an inventory node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// vSphere datacenter (top of the tree)
    Datacenter,
    /// Compute cluster inside a datacenter
    Cluster,
    /// Resource pool inside a cluster
    ResourcePool,
    /// Datastore reachable from a cluster
    Datastore,
    /// Port group / network reachable from a cluster
    Network,
    /// VM template usable for provisioning
    Template,
}

impl NodeKind {
    /// All kinds, parents before children
    pub const ALL: [NodeKind; 6] = [
        NodeKind::Datacenter,
        NodeKind::Cluster,
        NodeKind::ResourcePool,
        NodeKind::Datastore,
        NodeKind::Network,
        NodeKind::Template,
    ];

    /// Kinds that are cached per cluster
    pub const CLUSTER_RESOURCES: [NodeKind; 4] = [
        NodeKind::ResourcePool,
        NodeKind::Datastore,
        NodeKind::Network,
        NodeKind::Template,
    ];

    /// Stable lowercase name, used in cache keys and file names
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Datacenter => "datacenter",
            NodeKind::Cluster => "cluster",
            NodeKind::ResourcePool => "resource_pool",
            NodeKind::Datastore => "datastore",
            NodeKind::Network => "network",
            NodeKind::Template => "template",
        }
    }

    /// The kind a node of this kind points at through `parent_id`
    pub fn parent_kind(&self) -> Option<NodeKind> {
        match self {
            NodeKind::Datacenter => None,
            NodeKind::Cluster => Some(NodeKind::Datacenter),
            NodeKind::ResourcePool
            | NodeKind::Datastore
            | NodeKind::Network
            | NodeKind::Template => Some(NodeKind::Cluster),
        }
    }

    /// The scope level whose cache entries hold lists of this kind
    pub fn scope_level(&self) -> ScopeLevel {
        match self {
            NodeKind::Datacenter => ScopeLevel::Server,
            NodeKind::Cluster => ScopeLevel::Datacenter,
            _ => ScopeLevel::Cluster,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "datacenter" | "datacenters" => Ok(NodeKind::Datacenter),
            "cluster" | "clusters" => Ok(NodeKind::Cluster),
            "resource_pool" | "resource_pools" | "resourcepool" => Ok(NodeKind::ResourcePool),
            "datastore" | "datastores" => Ok(NodeKind::Datastore),
            "network" | "networks" => Ok(NodeKind::Network),
            "template" | "templates" => Ok(NodeKind::Template),
            other => Err(format!("unknown inventory kind '{}'", other)),
        }
    }
}

/// A single inventory object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryNode {
    /// Platform identifier (managed object id), unique per kind
    pub id: String,
    /// Display name
    pub name: String,
    /// Node kind
    pub kind: NodeKind,
    /// Id of the parent node, a lookup key only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Kind-specific attributes
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, JsonValue>,
}

impl InventoryNode {
    /// Create a node without parent or attributes
    pub fn new(kind: NodeKind, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            parent_id: None,
            attributes: IndexMap::new(),
        }
    }

    /// Set the parent id
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Get a raw attribute
    pub fn attribute(&self, key: &str) -> Option<&JsonValue> {
        self.attributes.get(key)
    }

    /// Get an attribute as an unsigned integer
    pub fn u64_attribute(&self, key: &str) -> Option<u64> {
        self.attributes.get(key).and_then(JsonValue::as_u64)
    }

    /// Get an attribute as a string
    pub fn str_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(JsonValue::as_str)
    }

    /// Free space of a datastore in bytes
    pub fn free_bytes(&self) -> Option<u64> {
        self.u64_attribute("free_bytes")
    }

    /// Capacity of a datastore in bytes
    pub fn capacity_bytes(&self) -> Option<u64> {
        self.u64_attribute("capacity_bytes")
    }

    /// Guest OS identifier of a template
    pub fn guest_os_id(&self) -> Option<&str> {
        self.str_attribute("guest_os_id")
    }

    /// Number of hosts in a cluster
    pub fn host_count(&self) -> Option<u64> {
        self.u64_attribute("host_count")
    }
}
