//! Loader and query façade tests
//!
//! Covers cache-first answers, the bounded wait on misses, stale fallback
//! when vCenter is down, and the NONPROD walk-through a portal user does:
//! datacenters, then clusters, then the resources of one cluster.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;

use common::*;
use vsphere_inventory_cache::cache::{CacheEntry, CacheKey, TieredCacheStore};
use vsphere_inventory_cache::error::Error;
use vsphere_inventory_cache::facade::QueryFacade;
use vsphere_inventory_cache::fetcher::mock::DATASTORE_FREE_GB;
use vsphere_inventory_cache::inventory::{InventoryNode, NodeKind, ResourceRef, Scope};
use vsphere_inventory_cache::loader::{Freshness, LoadDepth, LoadState};
use vsphere_inventory_cache::progress::SyncStatus;

#[tokio::test]
async fn test_second_query_is_served_from_cache() {
    let source = Arc::new(CountingSource::new());
    let facade = facade(source.clone(), &test_config());

    let first = facade.get_datacenters(SERVER).await;
    assert_eq!(first.status, Freshness::Fresh);
    let second = facade.get_datacenters(SERVER).await;
    assert_eq!(second.status, Freshness::Fresh);
    assert_eq!(first.last_updated, second.last_updated);

    assert_eq!(source.calls_for(NodeKind::Datacenter, &Scope::server(SERVER)), 1);
}

#[tokio::test]
async fn test_concurrent_misses_share_one_fetch() {
    let source = Arc::new(CountingSource::with_delay(Duration::from_millis(50)));
    let facade = Arc::new(facade(source.clone(), &test_config()));

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let facade = Arc::clone(&facade);
        tasks.push(tokio::spawn(async move { facade.get_datacenters(SERVER).await }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().data.datacenters.len(), 2);
    }

    assert_eq!(source.calls_for(NodeKind::Datacenter, &Scope::server(SERVER)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_vcenter_answers_loading_within_wait() {
    let config = test_config();
    let facade = facade(Arc::new(HangingSource), &config);

    let started = tokio::time::Instant::now();
    let response = facade.get_datacenters(SERVER).await;

    assert_eq!(response.status, Freshness::Loading);
    assert!(response.data.datacenters.is_empty());
    assert_eq!(response.retry_after_secs, Some(config.loader.retry_after.as_secs()));
    assert!(started.elapsed() <= config.loader.sync_wait + Duration::from_millis(10));
    assert_eq!(facade.loader().state(&Scope::server(SERVER)), LoadState::Loading);
}

#[tokio::test]
async fn test_failing_vcenter_degrades_to_loading_with_warning() {
    let facade = facade(Arc::new(FailingSource), &test_config());

    let response = facade.get_clusters(SERVER, "datacenter-np").await;
    assert_eq!(response.status, Freshness::Loading);
    assert!(response.message.as_deref().unwrap_or_default().contains("503"));
    assert!(response.retry_after_secs.is_some());

    facade.scheduler().wait_idle().await;
    assert_eq!(facade.sync_progress().status, SyncStatus::Error);
}

#[tokio::test]
async fn test_stale_data_is_served_when_vcenter_is_down() {
    let store = Arc::new(TieredCacheStore::in_memory());
    let key = CacheKey::datacenters(SERVER);
    store
        .put(
            CacheEntry::new(
                key.clone(),
                vec![InventoryNode::new(NodeKind::Datacenter, "datacenter-np", "NONPROD-DC")],
                Duration::from_secs(60),
            )
            .with_created_at(Utc::now() - chrono::Duration::hours(2)),
        )
        .await;
    let facade = QueryFacade::with_store(&test_config(), Arc::new(FailingSource), Arc::clone(&store));

    let response = facade.get_datacenters(SERVER).await;
    assert_eq!(response.status, Freshness::Stale);
    assert_eq!(response.data.datacenters[0].name, "NONPROD-DC");
    assert!(response.retry_after_secs.is_none());

    facade.scheduler().wait_idle().await;
    // The failed refresh kept the old entry
    assert_eq!(store.get(&key).await.unwrap().nodes.len(), 1);
    assert_eq!(facade.sync_progress().status, SyncStatus::Error);
}

#[tokio::test]
async fn test_nonprod_walkthrough() {
    let facade = mock_facade();

    let datacenters = facade.get_datacenters(SERVER).await;
    assert_eq!(datacenters.status, Freshness::Fresh);
    let ids: Vec<&str> = datacenters.data.datacenters.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["datacenter-np", "datacenter-prod"]);

    let clusters = facade.get_clusters(SERVER, "datacenter-np").await;
    assert_eq!(clusters.status, Freshness::Fresh);
    assert_eq!(clusters.data.clusters.len(), 2);
    assert_eq!(clusters.data.clusters[0].name, "NONPROD-Cluster-1");
    assert_eq!(clusters.data.clusters[0].host_count, 4);

    let resources = facade
        .get_resources(&ResourceRef::by_id("cluster-np-1"))
        .await
        .unwrap();
    assert_eq!(resources.status, Freshness::Fresh);
    assert!(!resources.truncated);

    let data = &resources.data;
    assert_eq!(data.cluster_id.as_deref(), Some("cluster-np-1"));
    assert_eq!(data.resource_pools[0].id, "resgroup-cluster-np-1-1");
    assert_eq!(data.resource_pools[0].name, "NONPROD-Cluster-1 Resources");

    let free: Vec<f64> = data.datastores.iter().map(|d| d.free_gb).collect();
    let expected: Vec<f64> = DATASTORE_FREE_GB.iter().map(|gb| *gb as f64).collect();
    assert_eq!(free, expected);
    assert_eq!(data.datastores[0].capacity_gb, 4096.0);

    assert_eq!(data.networks.len(), 2);
    assert_eq!(data.templates[0].name, "rhel9-template-v1");
    assert_eq!(data.templates[0].guest_id.as_deref(), Some("rhel9_64Guest"));

    facade.scheduler().wait_idle().await;
    assert_eq!(
        facade.loader().state(&nonprod_cluster(1)),
        LoadState::Loaded(LoadDepth::Full)
    );
}

#[tokio::test]
async fn test_cold_cluster_answers_loading_then_lands() {
    let source = Arc::new(CountingSource::with_delay(Duration::from_millis(200)));
    let mut config = test_config();
    config.loader.sync_wait = Duration::from_millis(20);
    let facade = facade(source.clone(), &config);
    let cluster = ResourceRef::by_id("cluster-np-1");

    let first = facade.get_resources(&cluster).await.unwrap();
    assert_eq!(first.status, Freshness::Loading);
    assert!(first.retry_after_secs.is_some());
    assert!(first.data.resource_pools.is_empty());
    assert!(first.data.datastores.is_empty());

    facade.scheduler().wait_idle().await;
    assert_eq!(source.calls_for(NodeKind::ResourcePool, &nonprod_cluster(1)), 1);

    let second = facade.get_resources(&cluster).await.unwrap();
    assert_eq!(second.status, Freshness::Fresh);
    assert!(second.retry_after_secs.is_none());
    assert_eq!(second.data.resource_pools[0].id, "resgroup-cluster-np-1-1");
    let free: Vec<f64> = second.data.datastores.iter().map(|d| d.free_gb).collect();
    assert_eq!(free, vec![1200.0, 1800.0, 2500.0]);
}

#[tokio::test]
async fn test_pruned_attributes_never_reach_the_cache() {
    let facade = mock_facade();
    facade
        .get_resources(&ResourceRef::by_name("NONPROD-Cluster-1"))
        .await
        .unwrap();

    let key = CacheKey::new(nonprod_cluster(1), NodeKind::Datastore);
    let entry = facade.store().get(&key).await.unwrap();
    for node in &entry.nodes {
        assert!(node.attribute("multiple_host_access").is_none());
        assert!(node.free_bytes().is_some());
    }
}

#[tokio::test]
async fn test_unknown_cluster_is_not_found() {
    let facade = mock_facade();
    let err = facade
        .get_resources(&ResourceRef::by_name("NONPROD-Cluster-9"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownResource { .. }));
    assert_eq!(err.exit_code(), 6);
}

#[tokio::test]
async fn test_datacenter_load_prefetches_clusters() {
    let source = Arc::new(CountingSource::new());
    let facade = facade(source.clone(), &test_config());

    facade.get_datacenters(SERVER).await;
    facade.scheduler().wait_idle().await;

    let np = Scope::datacenter(SERVER, "datacenter-np");
    assert_eq!(source.calls_for(NodeKind::Cluster, &np), 1);
    assert!(facade.store().contains(&CacheKey::clusters(SERVER, "datacenter-np")));

    // Served from the prefetched entry
    facade.get_clusters(SERVER, "datacenter-np").await;
    assert_eq!(source.calls_for(NodeKind::Cluster, &np), 1);
}
