//! Attribute pruning.
//!
//! The vSphere API returns far more per object than the portal renders.
//! Every kind has a fixed allow-list of attributes; everything else is
//! dropped before a node is cached, which bounds entry size in every tier.

use super::node::{InventoryNode, NodeKind};

/// Attributes kept for each node kind
pub fn allowed_attributes(kind: NodeKind) -> &'static [&'static str] {
    match kind {
        NodeKind::Datacenter => &[],
        NodeKind::Cluster => &["host_count", "drs_enabled", "ha_enabled"],
        NodeKind::ResourcePool => &[],
        NodeKind::Datastore => &["capacity_bytes", "free_bytes", "datastore_type"],
        NodeKind::Network => &["network_type"],
        NodeKind::Template => &["guest_os_id", "num_cpu", "memory_mb"],
    }
}

/// Strip every attribute outside the allow-list of the node's kind
pub fn prune(mut node: InventoryNode) -> InventoryNode {
    let allowed = allowed_attributes(node.kind);
    node.attributes.retain(|key, _| allowed.contains(&key.as_str()));
    node
}

/// Prune a whole fetched collection
pub fn prune_all(nodes: Vec<InventoryNode>) -> Vec<InventoryNode> {
    nodes.into_iter().map(prune).collect()
}
