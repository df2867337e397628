//! Scopes and resource references.
//!
//! A [`Scope`] names the subtree of the inventory a cache entry covers:
//! a vCenter server, a datacenter on that server, or a cluster inside that
//! datacenter. Datacenter lists are cached at server scope, cluster lists at
//! datacenter scope, and the per-cluster resource lists at cluster scope.

use serde::{Deserialize, Serialize};

use super::node::{InventoryNode, NodeKind};

/// Depth of a scope in the inventory tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    /// A vCenter server
    Server,
    /// A datacenter on a server
    Datacenter,
    /// A cluster inside a datacenter
    Cluster,
}

/// Hierarchical scope of a cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum Scope {
    /// Whole server
    Server {
        /// Server name
        server: String,
    },
    /// One datacenter
    Datacenter {
        /// Server name
        server: String,
        /// Datacenter id
        datacenter: String,
    },
    /// One cluster
    Cluster {
        /// Server name
        server: String,
        /// Datacenter id
        datacenter: String,
        /// Cluster id
        cluster: String,
    },
}

impl Scope {
    /// Scope covering a whole server
    pub fn server(server: impl Into<String>) -> Self {
        Scope::Server {
            server: server.into(),
        }
    }

    /// Scope covering one datacenter
    pub fn datacenter(server: impl Into<String>, datacenter: impl Into<String>) -> Self {
        Scope::Datacenter {
            server: server.into(),
            datacenter: datacenter.into(),
        }
    }

    /// Scope covering one cluster
    pub fn cluster(
        server: impl Into<String>,
        datacenter: impl Into<String>,
        cluster: impl Into<String>,
    ) -> Self {
        Scope::Cluster {
            server: server.into(),
            datacenter: datacenter.into(),
            cluster: cluster.into(),
        }
    }

    /// Level of this scope
    pub fn level(&self) -> ScopeLevel {
        match self {
            Scope::Server { .. } => ScopeLevel::Server,
            Scope::Datacenter { .. } => ScopeLevel::Datacenter,
            Scope::Cluster { .. } => ScopeLevel::Cluster,
        }
    }

    /// Server this scope belongs to
    pub fn server_name(&self) -> &str {
        match self {
            Scope::Server { server }
            | Scope::Datacenter { server, .. }
            | Scope::Cluster { server, .. } => server,
        }
    }

    /// Datacenter id, if the scope is at or below datacenter level
    pub fn datacenter_id(&self) -> Option<&str> {
        match self {
            Scope::Server { .. } => None,
            Scope::Datacenter { datacenter, .. } | Scope::Cluster { datacenter, .. } => {
                Some(datacenter)
            }
        }
    }

    /// Cluster id, if this is a cluster scope
    pub fn cluster_id(&self) -> Option<&str> {
        match self {
            Scope::Cluster { cluster, .. } => Some(cluster),
            _ => None,
        }
    }

    /// Whether entries of `kind` are cached at this scope
    pub fn holds(&self, kind: NodeKind) -> bool {
        kind.scope_level() == self.level()
    }

    /// Whether `other` is this scope or lies below it
    pub fn contains(&self, other: &Scope) -> bool {
        if self.server_name() != other.server_name() {
            return false;
        }
        match self {
            Scope::Server { .. } => true,
            Scope::Datacenter { datacenter, .. } => other.datacenter_id() == Some(datacenter.as_str()),
            Scope::Cluster { .. } => self == other,
        }
    }

    /// Scope one level down for a child node of this scope
    pub fn child(&self, node: &InventoryNode) -> Option<Scope> {
        match (self, node.kind) {
            (Scope::Server { server }, NodeKind::Datacenter) => {
                Some(Scope::datacenter(server.clone(), node.id.clone()))
            }
            (Scope::Datacenter { server, datacenter }, NodeKind::Cluster) => Some(Scope::cluster(
                server.clone(),
                datacenter.clone(),
                node.id.clone(),
            )),
            _ => None,
        }
    }

    /// Slash-separated path, e.g. `vc01/datacenter-3/domain-c8`
    pub fn path(&self) -> String {
        match self {
            Scope::Server { server } => server.clone(),
            Scope::Datacenter { server, datacenter } => format!("{}/{}", server, datacenter),
            Scope::Cluster {
                server,
                datacenter,
                cluster,
            } => format!("{}/{}/{}", server, datacenter, cluster),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path())
    }
}

/// Reference to an inventory object by id or by display name
///
/// The UI sends either form; references are resolved to a canonical id at
/// the façade so deeper layers only ever see ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum ResourceRef {
    /// Platform identifier
    ById(String),
    /// Display name
    ByName(String),
}

impl ResourceRef {
    /// Reference by id
    pub fn by_id(id: impl Into<String>) -> Self {
        ResourceRef::ById(id.into())
    }

    /// Reference by name
    pub fn by_name(name: impl Into<String>) -> Self {
        ResourceRef::ByName(name.into())
    }

    /// The raw reference value
    pub fn value(&self) -> &str {
        match self {
            ResourceRef::ById(v) | ResourceRef::ByName(v) => v,
        }
    }

    /// Whether `node` is the object this reference points at
    pub fn matches(&self, node: &InventoryNode) -> bool {
        match self {
            ResourceRef::ById(id) => node.id == *id,
            ResourceRef::ByName(name) => node.name == *name,
        }
    }

    /// Find the referenced node in a list
    pub fn resolve<'a>(&self, nodes: &'a [InventoryNode]) -> Option<&'a InventoryNode> {
        nodes.iter().find(|node| self.matches(node))
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceRef::ById(id) => write!(f, "id:{}", id),
            ResourceRef::ByName(name) => write!(f, "name:{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_paths() {
        assert_eq!(Scope::server("vc01").path(), "vc01");
        assert_eq!(Scope::datacenter("vc01", "dc-np").path(), "vc01/dc-np");
        assert_eq!(
            Scope::cluster("vc01", "dc-np", "cluster-np-1").to_string(),
            "vc01/dc-np/cluster-np-1"
        );
    }

    #[test]
    fn test_scope_holds_matching_kinds() {
        let server = Scope::server("vc01");
        assert!(server.holds(NodeKind::Datacenter));
        assert!(!server.holds(NodeKind::Cluster));

        let cluster = Scope::cluster("vc01", "dc", "c1");
        assert!(cluster.holds(NodeKind::Datastore));
        assert!(!cluster.holds(NodeKind::Datacenter));
        assert_eq!(cluster.datacenter_id(), Some("dc"));
        assert_eq!(cluster.cluster_id(), Some("c1"));
    }

    #[test]
    fn test_scope_containment() {
        let server = Scope::server("vc01");
        let dc = Scope::datacenter("vc01", "dc-np");
        let cluster = Scope::cluster("vc01", "dc-np", "c1");

        assert!(server.contains(&cluster));
        assert!(dc.contains(&dc));
        assert!(dc.contains(&cluster));
        assert!(!cluster.contains(&dc));
        assert!(!Scope::datacenter("vc01", "dc-prod").contains(&cluster));
        assert!(!Scope::server("vc02").contains(&dc));
    }

    #[test]
    fn test_scope_child() {
        let dc = InventoryNode::new(NodeKind::Datacenter, "dc-np", "NONPROD");
        let child = Scope::server("vc01").child(&dc).unwrap();
        assert_eq!(child, Scope::datacenter("vc01", "dc-np"));

        let cluster = InventoryNode::new(NodeKind::Cluster, "cluster-np-1", "NONPROD-Cluster-1");
        assert_eq!(
            child.child(&cluster),
            Some(Scope::cluster("vc01", "dc-np", "cluster-np-1"))
        );
        // Clusters are never direct children of a server
        assert_eq!(Scope::server("vc01").child(&cluster), None);
    }

    #[test]
    fn test_resource_ref_resolution() {
        let nodes = vec![
            InventoryNode::new(NodeKind::Cluster, "domain-c8", "Prod"),
            InventoryNode::new(NodeKind::Cluster, "domain-c9", "NonProd"),
        ];

        assert_eq!(
            ResourceRef::by_name("NonProd").resolve(&nodes).map(|n| n.id.as_str()),
            Some("domain-c9")
        );
        assert_eq!(
            ResourceRef::by_id("domain-c8").resolve(&nodes).map(|n| n.name.as_str()),
            Some("Prod")
        );
        // Ids and names are never matched interchangeably
        assert!(ResourceRef::by_id("Prod").resolve(&nodes).is_none());
    }
}
