//! Inventory query commands: datacenters, clusters, resources, status.
//!
//! A one-shot process has nobody to poll again, so when the first answer is
//! `loading` the command waits for the background work and asks once more.

use super::CommandContext;
use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Parser;
use vsphere_inventory_cache::facade::QueryResponse;
use vsphere_inventory_cache::inventory::ResourceRef;
use vsphere_inventory_cache::loader::Freshness;

/// Arguments for the datacenters command
#[derive(Parser, Debug, Clone)]
pub struct DatacentersArgs {}

/// Arguments for the clusters command
#[derive(Parser, Debug, Clone)]
pub struct ClustersArgs {
    /// Datacenter id
    pub datacenter: String,
}

/// Arguments for the resources command
#[derive(Parser, Debug, Clone)]
pub struct ResourcesArgs {
    /// Cluster id (or name with --by-name)
    pub cluster: String,

    /// Treat CLUSTER as a display name
    #[arg(long)]
    pub by_name: bool,
}

/// Arguments for the status command
#[derive(Parser, Debug, Clone)]
pub struct StatusArgs {}

fn timestamp(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

/// Print the envelope and return the exit code
fn report<T: serde::Serialize>(ctx: &CommandContext, response: &QueryResponse<T>) -> i32 {
    ctx.output.json(response);
    ctx.output.freshness(
        response.status,
        timestamp(response.last_updated),
        response.truncated,
    );
    if let Some(message) = &response.message {
        ctx.output.warning(message);
    }
    if let Some(secs) = response.retry_after_secs {
        ctx.output
            .hint(&format!("Data is still loading, retry in {}s", secs));
    }
    if response.status == Freshness::Loading {
        2
    } else {
        0
    }
}

impl DatacentersArgs {
    /// Execute the datacenters command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let facade = ctx.facade().await?;
        let server = facade.server().to_string();

        let mut response = facade.get_datacenters(&server).await;
        ctx.settle(&facade).await;
        if response.status == Freshness::Loading {
            response = facade.get_datacenters(&server).await;
        }

        ctx.output.section(&format!("Datacenters on {}", server));
        let code = report(ctx, &response);
        let rows: Vec<Vec<String>> = response
            .data
            .datacenters
            .iter()
            .map(|dc| vec![dc.id.clone(), dc.name.clone()])
            .collect();
        ctx.output.table(&["ID", "NAME"], &rows);
        Ok(code)
    }
}

impl ClustersArgs {
    /// Execute the clusters command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let facade = ctx.facade().await?;
        let server = facade.server().to_string();

        let mut response = facade.get_clusters(&server, &self.datacenter).await;
        ctx.settle(&facade).await;
        if response.status == Freshness::Loading {
            response = facade.get_clusters(&server, &self.datacenter).await;
        }

        ctx.output
            .section(&format!("Clusters in {}/{}", server, self.datacenter));
        let code = report(ctx, &response);
        let rows: Vec<Vec<String>> = response
            .data
            .clusters
            .iter()
            .map(|c| vec![c.id.clone(), c.name.clone(), c.host_count.to_string()])
            .collect();
        ctx.output.table(&["ID", "NAME", "HOSTS"], &rows);
        Ok(code)
    }
}

impl ResourcesArgs {
    fn reference(&self) -> ResourceRef {
        if self.by_name {
            ResourceRef::by_name(self.cluster.clone())
        } else {
            ResourceRef::by_id(self.cluster.clone())
        }
    }

    /// Execute the resources command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let facade = ctx.facade().await?;
        let reference = self.reference();

        let mut response = facade.get_resources(&reference).await?;
        ctx.settle(&facade).await;
        if response.status == Freshness::Loading {
            response = facade.get_resources(&reference).await?;
        }

        ctx.output.banner(&format!("CLUSTER {}", self.cluster));
        let code = report(ctx, &response);
        let data = &response.data;

        ctx.output.section("Resource pools");
        let rows: Vec<Vec<String>> = data
            .resource_pools
            .iter()
            .map(|p| vec![p.id.clone(), p.name.clone()])
            .collect();
        ctx.output.table(&["ID", "NAME"], &rows);

        ctx.output.section("Datastores");
        let rows: Vec<Vec<String>> = data
            .datastores
            .iter()
            .map(|d| {
                vec![
                    d.id.clone(),
                    d.name.clone(),
                    format!("{:.2}", d.free_gb),
                    format!("{:.2}", d.capacity_gb),
                ]
            })
            .collect();
        ctx.output.table(&["ID", "NAME", "FREE GB", "CAPACITY GB"], &rows);

        ctx.output.section("Networks");
        let rows: Vec<Vec<String>> = data
            .networks
            .iter()
            .map(|n| vec![n.id.clone(), n.name.clone()])
            .collect();
        ctx.output.table(&["ID", "NAME"], &rows);

        ctx.output.section("Templates");
        let rows: Vec<Vec<String>> = data
            .templates
            .iter()
            .map(|t| {
                vec![
                    t.id.clone(),
                    t.name.clone(),
                    t.guest_id.clone().unwrap_or_default(),
                ]
            })
            .collect();
        ctx.output.table(&["ID", "NAME", "GUEST OS"], &rows);

        ctx.output.elapsed();
        Ok(code)
    }
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let facade = ctx.facade().await?;
        let report = facade.get_cache_status();
        ctx.output.json(&report);

        ctx.output.section(&format!("Cache status for {}", report.server));
        let rows: Vec<Vec<String>> = report
            .cache
            .kinds
            .iter()
            .map(|(kind, status)| {
                vec![
                    kind.clone(),
                    if status.exists { "yes" } else { "no" }.to_string(),
                    status.entries.to_string(),
                    status.stale_entries.to_string(),
                    timestamp(status.last_updated).unwrap_or_else(|| "-".to_string()),
                ]
            })
            .collect();
        ctx.output
            .table(&["KIND", "EXISTS", "ENTRIES", "STALE", "LAST UPDATED"], &rows);

        ctx.output.section("Tiers");
        let tiers: Vec<Vec<String>> = report
            .cache
            .tiers
            .iter()
            .map(|tier| vec![tier.to_string()])
            .collect();
        ctx.output.table(&["TIER"], &tiers);

        ctx.output.section("Last sync");
        let sync = &report.sync;
        let rows = vec![vec![
            format!("{:?}", sync.status).to_lowercase(),
            format!("{}%", sync.percent),
            sync.message.clone(),
        ]];
        ctx.output.table(&["STATUS", "PROGRESS", "MESSAGE"], &rows);
        Ok(0)
    }
}
