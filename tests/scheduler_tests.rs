//! Background scheduler and sync tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::watch;

use common::*;
use vsphere_inventory_cache::cache::CacheKey;
use vsphere_inventory_cache::facade::SyncTrigger;
use vsphere_inventory_cache::inventory::{NodeKind, Scope};
use vsphere_inventory_cache::progress::{SyncProgress, SyncStatus};
use vsphere_inventory_cache::scheduler::SyncMode;

/// Collect every snapshot until the sync leaves the running state
async fn follow(mut rx: watch::Receiver<SyncProgress>) -> Vec<SyncProgress> {
    let mut seen = Vec::new();
    loop {
        let snapshot = rx.borrow_and_update().clone();
        let running = snapshot.is_running();
        seen.push(snapshot);
        if !running {
            return seen;
        }
        rx.changed().await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_refreshes_never_exceed_the_limit() {
    let source = Arc::new(CountingSource::with_delay(Duration::from_millis(30)));
    let mut config = test_config();
    config.scheduler.max_concurrency = 2;
    let scheduler = scheduler(source.clone(), &config);

    let handles: Vec<_> = (1..=10)
        .map(|n| {
            let scope = Scope::cluster(SERVER, "datacenter-np", format!("cluster-x-{}", n));
            scheduler.trigger_refresh(CacheKey::new(scope, NodeKind::ResourcePool))
        })
        .collect();
    assert_eq!(scheduler.outstanding(), 10);

    for handle in handles {
        handle.wait().await.unwrap();
    }
    scheduler.wait_idle().await;

    assert_eq!(source.total_calls(), 10);
    assert!(source.peak() <= 2, "peak was {}", source.peak());
    assert!(scheduler.peak_running() <= 2);
    assert_eq!(scheduler.outstanding(), 0);
}

#[tokio::test]
async fn test_full_sync_caches_every_cluster_resource() {
    let source = Arc::new(CountingSource::with_delay(Duration::from_millis(5)));
    let facade = facade(source.clone(), &test_config());

    let trigger = facade.trigger_sync(SyncMode::Full);
    assert!(matches!(trigger, SyncTrigger::Accepted { mode: SyncMode::Full, .. }));

    let snapshots = follow(facade.scheduler().tracker().subscribe()).await;
    let last = snapshots.last().unwrap();
    assert_eq!(last.status, SyncStatus::Complete);
    assert_eq!(last.percent, 100);
    // 1 datacenter list, 2 cluster lists, 3 clusters x 4 kinds
    assert_eq!(last.total_steps, 15);
    assert!(snapshots.windows(2).all(|w| w[0].percent <= w[1].percent));

    let clusters = [
        nonprod_cluster(1),
        nonprod_cluster(2),
        Scope::cluster(SERVER, "datacenter-prod", "cluster-prod-1"),
    ];
    for scope in &clusters {
        for kind in NodeKind::CLUSTER_RESOURCES {
            let key = CacheKey::new(scope.clone(), kind);
            assert!(facade.store().contains(&key), "missing {}", key);
            assert_eq!(source.calls_for(kind, scope), 1);
        }
    }
    assert!(source.peak() <= test_config().scheduler.max_concurrency);
}

#[tokio::test]
async fn test_sync_is_rejected_while_running() {
    let source = Arc::new(CountingSource::with_delay(Duration::from_millis(50)));
    let facade = facade(source, &test_config());

    assert!(facade.trigger_sync(SyncMode::Essential).is_accepted());
    match facade.trigger_sync(SyncMode::Essential) {
        SyncTrigger::Rejected { reason, progress } => {
            assert!(reason.contains("already running"), "{}", reason);
            assert_eq!(progress.status, SyncStatus::Running);
        }
        SyncTrigger::Accepted { .. } => panic!("two syncs accepted at once"),
    }

    let last = follow(facade.scheduler().tracker().subscribe()).await;
    assert_eq!(last.last().unwrap().status, SyncStatus::Complete);
    assert!(facade.trigger_sync(SyncMode::Essential).is_accepted());
}

#[tokio::test]
async fn test_sync_fails_without_datacenters() {
    let facade = facade(Arc::new(FailingSource), &test_config());
    assert!(facade.trigger_sync(SyncMode::Essential).is_accepted());

    let snapshots = follow(facade.scheduler().tracker().subscribe()).await;
    let last = snapshots.last().unwrap();
    assert_eq!(last.status, SyncStatus::Error);
    assert!(last.message.contains("datacenters unavailable"));
    assert!(last.finished_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_periodic_sync_runs_every_interval() {
    let source = Arc::new(CountingSource::new());
    let config = test_config();
    let scheduler = scheduler(source.clone(), &config);
    let datacenters = Scope::server(SERVER);

    let handle = scheduler
        .spawn_periodic_sync(SERVER, Duration::from_secs(60), Duration::from_secs(3600))
        .unwrap();

    // First tick fires immediately
    tokio::time::sleep(Duration::from_secs(1)).await;
    follow(scheduler.tracker().subscribe()).await;
    assert_eq!(source.calls_for(NodeKind::Datacenter, &datacenters), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    follow(scheduler.tracker().subscribe()).await;
    assert_eq!(source.calls_for(NodeKind::Datacenter, &datacenters), 2);

    handle.abort();
    assert!(scheduler
        .spawn_periodic_sync(SERVER, Duration::ZERO, Duration::from_secs(3600))
        .is_none());
}
