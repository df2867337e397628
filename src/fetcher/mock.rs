//! In-process inventory for demos and tests.
//!
//! The inventory is fixed: a NONPROD and a PROD datacenter, each with its
//! clusters, and every cluster carrying one resource pool, three datastores,
//! two networks and a handful of templates. Nodes carry a few attributes the
//! pruner is expected to drop, like a real vCenter response would.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::{FetchError, InventorySource};
use crate::inventory::{InventoryNode, NodeKind, Scope};

const GIB: u64 = 1024 * 1024 * 1024;

/// Free space of the three datastores of every cluster, in GiB
pub const DATASTORE_FREE_GB: [u64; 3] = [1200, 1800, 2500];

struct MockCluster {
    id: &'static str,
    name: &'static str,
    hosts: u64,
}

struct MockDatacenter {
    id: &'static str,
    name: &'static str,
    clusters: &'static [MockCluster],
}

const INVENTORY: &[MockDatacenter] = &[
    MockDatacenter {
        id: "datacenter-np",
        name: "NONPROD-DC",
        clusters: &[
            MockCluster {
                id: "cluster-np-1",
                name: "NONPROD-Cluster-1",
                hosts: 4,
            },
            MockCluster {
                id: "cluster-np-2",
                name: "NONPROD-Cluster-2",
                hosts: 2,
            },
        ],
    },
    MockDatacenter {
        id: "datacenter-prod",
        name: "PROD-DC",
        clusters: &[MockCluster {
            id: "cluster-prod-1",
            name: "PROD-Cluster-1",
            hosts: 8,
        }],
    },
];

const TEMPLATES: &[(&str, &str, u64, u64)] = &[
    ("rhel9-template-v1", "rhel9_64Guest", 2, 4096),
    ("rhel9-template-v2", "rhel9_64Guest", 4, 8192),
    ("rhel8-template", "rhel8_64Guest", 2, 4096),
];

/// Deterministic [`InventorySource`]
#[derive(Debug, Default)]
pub struct MockInventorySource {
    latency: Option<Duration>,
    calls: AtomicU64,
}

impl MockInventorySource {
    /// Create a mock that answers immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every answer by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of `list` calls served
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn find_cluster(datacenter: &str, cluster: &str) -> Option<&'static MockCluster> {
        INVENTORY
            .iter()
            .find(|dc| dc.id == datacenter)
            .and_then(|dc| dc.clusters.iter().find(|c| c.id == cluster))
    }

    fn datacenters() -> Vec<InventoryNode> {
        INVENTORY
            .iter()
            .map(|dc| InventoryNode::new(NodeKind::Datacenter, dc.id, dc.name))
            .collect()
    }

    fn clusters(datacenter: &str) -> Vec<InventoryNode> {
        INVENTORY
            .iter()
            .filter(|dc| dc.id == datacenter)
            .flat_map(|dc| dc.clusters.iter())
            .map(|c| {
                InventoryNode::new(NodeKind::Cluster, c.id, c.name)
                    .with_parent(datacenter)
                    .with_attribute("host_count", c.hosts)
                    .with_attribute("drs_enabled", true)
                    .with_attribute("ha_enabled", true)
                    .with_attribute("vsan_enabled", false)
            })
            .collect()
    }

    fn cluster_resources(kind: NodeKind, cluster: &MockCluster) -> Vec<InventoryNode> {
        let prefix = cluster.name.split('-').next().unwrap_or(cluster.name);
        match kind {
            NodeKind::ResourcePool => vec![InventoryNode::new(
                NodeKind::ResourcePool,
                format!("resgroup-{}-1", cluster.id),
                format!("{} Resources", cluster.name),
            )
            .with_parent(cluster.id)
            .with_attribute("cpu_reservation_mhz", 0u64)],
            NodeKind::Datastore => DATASTORE_FREE_GB
                .iter()
                .enumerate()
                .map(|(i, free)| {
                    InventoryNode::new(
                        NodeKind::Datastore,
                        format!("datastore-{}-{}", cluster.id, i + 1),
                        format!("{}-DS-{:02}", prefix, i + 1),
                    )
                    .with_parent(cluster.id)
                    .with_attribute("capacity_bytes", 4096 * GIB)
                    .with_attribute("free_bytes", free * GIB)
                    .with_attribute("datastore_type", "VMFS")
                    .with_attribute("multiple_host_access", true)
                })
                .collect(),
            NodeKind::Network => ["VLAN-101", "VLAN-102"]
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    InventoryNode::new(
                        NodeKind::Network,
                        format!("network-{}-{}", cluster.id, i + 1),
                        format!("{}-{}", prefix, name),
                    )
                    .with_parent(cluster.id)
                    .with_attribute("network_type", "DISTRIBUTED_PORTGROUP")
                })
                .collect(),
            NodeKind::Template => TEMPLATES
                .iter()
                .enumerate()
                .map(|(i, (name, guest, cpu, memory))| {
                    InventoryNode::new(
                        NodeKind::Template,
                        format!("vm-{}-t{}", cluster.id, i + 1),
                        *name,
                    )
                    .with_parent(cluster.id)
                    .with_attribute("guest_os_id", *guest)
                    .with_attribute("num_cpu", *cpu)
                    .with_attribute("memory_mb", *memory)
                    .with_attribute("power_state", "POWERED_OFF")
                })
                .collect(),
            NodeKind::Datacenter | NodeKind::Cluster => Vec::new(),
        }
    }
}

#[async_trait]
impl InventorySource for MockInventorySource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list(
        &self,
        kind: NodeKind,
        scope: &Scope,
        _limit: usize,
    ) -> Result<Vec<InventoryNode>, FetchError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let nodes = match (kind, scope) {
            (NodeKind::Datacenter, Scope::Server { .. }) => Self::datacenters(),
            (NodeKind::Cluster, Scope::Datacenter { datacenter, .. }) => Self::clusters(datacenter),
            (
                kind,
                Scope::Cluster {
                    datacenter,
                    cluster,
                    ..
                },
            ) => Self::find_cluster(datacenter, cluster)
                .map(|c| Self::cluster_resources(kind, c))
                .unwrap_or_default(),
            (kind, scope) => {
                return Err(FetchError::protocol(format!(
                    "no {} listing at scope {}",
                    kind, scope
                )))
            }
        };
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_nonprod_cluster_resources() {
        let source = MockInventorySource::new();
        let scope = Scope::cluster("vc01", "datacenter-np", "cluster-np-1");

        let pools = source.list(NodeKind::ResourcePool, &scope, 200).await.unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].id, "resgroup-cluster-np-1-1");
        assert_eq!(pools[0].name, "NONPROD-Cluster-1 Resources");

        let datastores = source.list(NodeKind::Datastore, &scope, 200).await.unwrap();
        let free: Vec<u64> = datastores.iter().filter_map(|d| d.free_bytes()).map(|b| b / GIB).collect();
        assert_eq!(free, vec![1200, 1800, 2500]);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_cluster_is_empty() {
        let source = MockInventorySource::new();
        let scope = Scope::cluster("vc01", "datacenter-np", "cluster-missing");
        assert!(source.list(NodeKind::Template, &scope, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tree_shape() {
        let source = MockInventorySource::new();
        let dcs = source.list(NodeKind::Datacenter, &Scope::server("vc01"), 100).await.unwrap();
        assert_eq!(dcs.len(), 2);

        let clusters = source
            .list(NodeKind::Cluster, &Scope::datacenter("vc01", "datacenter-np"), 200)
            .await
            .unwrap();
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.parent_id.as_deref() == Some("datacenter-np")));
        assert_eq!(clusters[0].host_count(), Some(4));
    }
}
