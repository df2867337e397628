//! Cache Benchmark Suite
//!
//! 1. STORE READS:
//!    - Memory tier hit path
//!    - Miss path through an empty chain
//!
//! 2. SHARED TIER CODEC:
//!    - gzip + JSON encode/decode by entry size
//!
//! 3. PRUNING:
//!    - Attribute allow-list on raw datastore listings
//!
//! Run with: cargo bench --bench cache_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use vsphere_inventory_cache::cache::{CacheEntry, CacheKey, CacheTier, Codec, TieredCacheStore};
use vsphere_inventory_cache::inventory::{prune_all, InventoryNode, NodeKind, Scope};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn cluster_key(kind: NodeKind) -> CacheKey {
    CacheKey::new(Scope::cluster("vc01", "datacenter-np", "cluster-np-1"), kind)
}

/// Datastore listing as the platform returns it, before pruning
fn raw_datastores(count: usize) -> Vec<InventoryNode> {
    (0..count)
        .map(|i| {
            InventoryNode::new(NodeKind::Datastore, format!("datastore-{}", i), format!("DS-NP-{:03}", i))
                .with_parent("cluster-np-1")
                .with_attribute("capacity_bytes", 4_398_046_511_104u64)
                .with_attribute("free_bytes", 1_288_490_188_800u64)
                .with_attribute("datastore_type", "VMFS")
                .with_attribute("multiple_host_access", true)
                .with_attribute("thin_provisioning_supported", true)
                .with_attribute("url", format!("ds:///vmfs/volumes/{:08x}/", i))
        })
        .collect()
}

// ============================================================================
// STORE READS
// ============================================================================

fn bench_store_reads(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let store = TieredCacheStore::in_memory();
    let key = cluster_key(NodeKind::Datastore);
    runtime.block_on(store.put_nodes(
        key.clone(),
        prune_all(raw_datastores(200)),
        Duration::from_secs(600),
    ));
    let missing = cluster_key(NodeKind::Network);

    let mut group = c.benchmark_group("store_reads");
    group.bench_function("memory_hit", |b| {
        b.to_async(&runtime)
            .iter(|| async { black_box(store.get(&key).await) })
    });
    group.bench_function("miss", |b| {
        b.to_async(&runtime)
            .iter(|| async { black_box(store.get(&missing).await) })
    });
    group.finish();
}

// ============================================================================
// SHARED TIER CODEC
// ============================================================================

fn bench_codec(c: &mut Criterion) {
    let codec = Codec::new(CacheTier::Shared, 6);
    let key = cluster_key(NodeKind::Datastore);
    let mut group = c.benchmark_group("codec");

    for count in [10usize, 50, 200] {
        let entry = CacheEntry::new(key.clone(), prune_all(raw_datastores(count)), Duration::from_secs(600));
        let encoded = codec.encode(&entry).unwrap();
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("encode", count), &entry, |b, entry| {
            b.iter(|| codec.encode(black_box(entry)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("decode", count), &encoded, |b, bytes| {
            b.iter(|| codec.decode(&key, black_box(bytes)).unwrap())
        });
    }
    group.finish();
}

// ============================================================================
// PRUNING
// ============================================================================

fn bench_prune(c: &mut Criterion) {
    let mut group = c.benchmark_group("prune");
    for count in [50usize, 200] {
        let raw = raw_datastores(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("datastores", count), &raw, |b, raw| {
            b.iter(|| prune_all(black_box(raw.clone())))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_store_reads, bench_codec, bench_prune);
criterion_main!(benches);
