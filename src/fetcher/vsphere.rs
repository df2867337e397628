//! vCenter Automation REST API source.
//!
//! Uses the `/api` endpoints available since vSphere 7.0:
//!
//! - `POST /api/session` (basic auth) returns a session token sent back in
//!   the `vmware-api-session-id` header
//! - `GET /api/vcenter/{datacenter,cluster,host,resource-pool,datastore,network,vm}`
//!   with filter query parameters
//!
//! Templates are VMs whose name contains the configured pattern; their guest
//! OS comes from a per-VM detail call, made only for VMs within the cap.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::{FetchError, InventorySource};
use crate::config::VsphereConfig;
use crate::inventory::{InventoryNode, NodeKind, Scope};

/// Header carrying the session token
pub const SESSION_HEADER: &str = "vmware-api-session-id";

#[derive(Debug, Deserialize)]
struct DatacenterSummary {
    datacenter: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ClusterSummary {
    cluster: String,
    name: String,
    #[serde(default)]
    drs_enabled: Option<bool>,
    #[serde(default)]
    ha_enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct HostSummary {
    #[allow(dead_code)]
    host: String,
}

#[derive(Debug, Deserialize)]
struct ResourcePoolSummary {
    resource_pool: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DatastoreSummary {
    datastore: String,
    name: String,
    #[serde(rename = "type", default)]
    datastore_type: Option<String>,
    #[serde(default)]
    free_space: Option<u64>,
    #[serde(default)]
    capacity: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct NetworkSummary {
    network: String,
    name: String,
    #[serde(rename = "type", default)]
    network_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VmSummary {
    vm: String,
    name: String,
    #[serde(default)]
    cpu_count: Option<u64>,
    #[serde(rename = "memory_size_MiB", default)]
    memory_size_mib: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct VmDetail {
    #[serde(rename = "guest_OS", default)]
    guest_os: Option<String>,
}

/// [`InventorySource`] backed by a vCenter server
pub struct VsphereRestSource {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
    template_pattern: String,
    session: Mutex<Option<String>>,
}

impl VsphereRestSource {
    /// Create a source from the `vsphere` configuration section
    ///
    /// `timeout` bounds each HTTP request; the fetcher applies its own
    /// timeout to the whole listing on top.
    pub fn new(config: &VsphereConfig, timeout: Duration) -> Result<Self, FetchError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| FetchError::protocol("vsphere.url is not configured"))?;
        let base_url = Url::parse(url)
            .map_err(|e| FetchError::protocol(format!("invalid vsphere.url '{}': {}", url, e)))?;

        let mut builder = Client::builder()
            .timeout(timeout)
            .user_agent(format!("vsphere-cache/{}", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Duration::from_secs(60));

        if config.insecure {
            warn!("TLS certificate verification disabled for vCenter");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::protocol(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            username: config.username.clone().unwrap_or_default(),
            password: config.password.clone().unwrap_or_default(),
            template_pattern: config.template_pattern.clone(),
            session: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::protocol(format!("invalid endpoint '{}': {}", path, e)))
    }

    /// Current session token, creating a session if there is none
    async fn session_token(&self) -> Result<String, FetchError> {
        let mut session = self.session.lock().await;
        if let Some(token) = session.as_ref() {
            return Ok(token.clone());
        }

        let response = self
            .client
            .post(self.endpoint("api/session")?)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| FetchError::protocol(format!("session request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::auth(format!(
                "vCenter rejected credentials for '{}' ({})",
                self.username, status
            )));
        }
        if !status.is_success() {
            return Err(FetchError::protocol(format!(
                "session request returned {}",
                status
            )));
        }

        let token: String = response
            .json()
            .await
            .map_err(|e| FetchError::protocol(format!("failed to parse session token: {}", e)))?;
        info!(user = %self.username, "created vCenter session");
        *session = Some(token.clone());
        Ok(token)
    }

    /// GET a JSON document with the session header
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let token = self.session_token().await?;
        let request: RequestBuilder = self
            .client
            .get(self.endpoint(path)?)
            .header(SESSION_HEADER, token)
            .query(query);

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::protocol(format!("GET {} failed: {}", path, e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            // Session expired or revoked; the next call logs in again
            *self.session.lock().await = None;
            return Err(FetchError::auth(format!("GET {} returned {}", path, status)));
        }
        if !status.is_success() {
            return Err(FetchError::protocol(format!("GET {} returned {}", path, status)));
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::protocol(format!("failed to decode {}: {}", path, e)))
    }

    fn scope_parts(scope: &Scope) -> Result<(&str, &str), FetchError> {
        match (scope.datacenter_id(), scope.cluster_id()) {
            (Some(datacenter), Some(cluster)) => Ok((datacenter, cluster)),
            _ => Err(FetchError::protocol(format!(
                "scope {} is not a cluster scope",
                scope
            ))),
        }
    }

    async fn datacenters(&self) -> Result<Vec<InventoryNode>, FetchError> {
        let items: Vec<DatacenterSummary> = self.get_json("api/vcenter/datacenter", &[]).await?;
        Ok(items
            .into_iter()
            .map(|dc| InventoryNode::new(NodeKind::Datacenter, dc.datacenter, dc.name))
            .collect())
    }

    async fn clusters(&self, datacenter: &str, limit: usize) -> Result<Vec<InventoryNode>, FetchError> {
        let items: Vec<ClusterSummary> = self
            .get_json("api/vcenter/cluster", &[("datacenters", datacenter)])
            .await?;

        let mut nodes = Vec::with_capacity(items.len());
        for (index, cluster) in items.into_iter().enumerate() {
            let mut node = InventoryNode::new(NodeKind::Cluster, cluster.cluster.as_str(), cluster.name)
                .with_parent(datacenter);
            if let Some(drs) = cluster.drs_enabled {
                node = node.with_attribute("drs_enabled", drs);
            }
            if let Some(ha) = cluster.ha_enabled {
                node = node.with_attribute("ha_enabled", ha);
            }
            if index < limit {
                let hosts: Vec<HostSummary> = self
                    .get_json("api/vcenter/host", &[("clusters", cluster.cluster.as_str())])
                    .await?;
                node = node.with_attribute("host_count", hosts.len() as u64);
            }
            nodes.push(node);
        }
        Ok(nodes)
    }

    async fn resource_pools(&self, cluster: &str) -> Result<Vec<InventoryNode>, FetchError> {
        let items: Vec<ResourcePoolSummary> = self
            .get_json("api/vcenter/resource-pool", &[("clusters", cluster)])
            .await?;
        Ok(items
            .into_iter()
            .map(|rp| {
                InventoryNode::new(NodeKind::ResourcePool, rp.resource_pool, rp.name).with_parent(cluster)
            })
            .collect())
    }

    async fn datastores(&self, datacenter: &str, cluster: &str) -> Result<Vec<InventoryNode>, FetchError> {
        let items: Vec<DatastoreSummary> = self
            .get_json("api/vcenter/datastore", &[("datacenters", datacenter)])
            .await?;
        Ok(items
            .into_iter()
            .map(|ds| {
                let mut node =
                    InventoryNode::new(NodeKind::Datastore, ds.datastore, ds.name).with_parent(cluster);
                if let Some(capacity) = ds.capacity {
                    node = node.with_attribute("capacity_bytes", capacity);
                }
                if let Some(free) = ds.free_space {
                    node = node.with_attribute("free_bytes", free);
                }
                if let Some(kind) = ds.datastore_type {
                    node = node.with_attribute("datastore_type", kind);
                }
                node
            })
            .collect())
    }

    async fn networks(&self, datacenter: &str, cluster: &str) -> Result<Vec<InventoryNode>, FetchError> {
        let items: Vec<NetworkSummary> = self
            .get_json("api/vcenter/network", &[("datacenters", datacenter)])
            .await?;
        Ok(items
            .into_iter()
            .map(|net| {
                let mut node =
                    InventoryNode::new(NodeKind::Network, net.network, net.name).with_parent(cluster);
                if let Some(kind) = net.network_type {
                    node = node.with_attribute("network_type", kind);
                }
                node
            })
            .collect())
    }

    async fn templates(&self, cluster: &str, limit: usize) -> Result<Vec<InventoryNode>, FetchError> {
        let items: Vec<VmSummary> = self.get_json("api/vcenter/vm", &[("clusters", cluster)]).await?;
        let pattern = self.template_pattern.to_ascii_lowercase();

        let mut nodes = Vec::new();
        for vm in items
            .into_iter()
            .filter(|vm| vm.name.to_ascii_lowercase().contains(&pattern))
        {
            let mut node =
                InventoryNode::new(NodeKind::Template, vm.vm.as_str(), vm.name).with_parent(cluster);
            if let Some(cpu) = vm.cpu_count {
                node = node.with_attribute("num_cpu", cpu);
            }
            if let Some(memory) = vm.memory_size_mib {
                node = node.with_attribute("memory_mb", memory);
            }
            if nodes.len() < limit {
                let detail: VmDetail = self
                    .get_json(&format!("api/vcenter/vm/{}", vm.vm), &[])
                    .await?;
                if let Some(guest) = detail.guest_os {
                    node = node.with_attribute("guest_os_id", guest);
                }
            }
            nodes.push(node);
        }
        debug!(cluster, templates = nodes.len(), "matched template VMs");
        Ok(nodes)
    }
}

#[async_trait]
impl InventorySource for VsphereRestSource {
    fn name(&self) -> &str {
        "vsphere"
    }

    async fn list(
        &self,
        kind: NodeKind,
        scope: &Scope,
        limit: usize,
    ) -> Result<Vec<InventoryNode>, FetchError> {
        match kind {
            NodeKind::Datacenter => self.datacenters().await,
            NodeKind::Cluster => {
                let datacenter = scope
                    .datacenter_id()
                    .ok_or_else(|| FetchError::protocol(format!("scope {} has no datacenter", scope)))?;
                self.clusters(datacenter, limit).await
            }
            NodeKind::ResourcePool => {
                let (_, cluster) = Self::scope_parts(scope)?;
                self.resource_pools(cluster).await
            }
            NodeKind::Datastore => {
                let (datacenter, cluster) = Self::scope_parts(scope)?;
                self.datastores(datacenter, cluster).await
            }
            NodeKind::Network => {
                let (datacenter, cluster) = Self::scope_parts(scope)?;
                self.networks(datacenter, cluster).await
            }
            NodeKind::Template => {
                let (_, cluster) = Self::scope_parts(scope)?;
                self.templates(cluster, limit).await
            }
        }
    }
}
