//! Fetch, prune and publish one cache entry.
//!
//! Every write into the cache goes through [`CachePopulator::populate`]:
//! synchronous loads, background refreshes and sync jobs alike. Concurrent
//! calls for the same key share one in-flight fetch, and the fetch runs on
//! its own task so it completes (and lands in the cache) even when every
//! caller has stopped waiting.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheKey, TieredCacheStore};
use crate::config::CacheTtls;
use crate::fetcher::{FetchError, ResourceFetcher};
use crate::inventory::{prune_all, Scope};

/// Result of a populate call
pub type PopulateResult = Result<Arc<CacheEntry>, FetchError>;

/// Shared handle on an in-flight populate
pub type InFlight = Shared<BoxFuture<'static, PopulateResult>>;

/// Writes fetched inventory into the cache store
pub struct CachePopulator {
    fetcher: ResourceFetcher,
    store: Arc<TieredCacheStore>,
    ttls: CacheTtls,
    inflight: DashMap<CacheKey, (u64, InFlight)>,
    generation: AtomicU64,
}

impl CachePopulator {
    /// Create a populator
    pub fn new(fetcher: ResourceFetcher, store: Arc<TieredCacheStore>, ttls: CacheTtls) -> Self {
        Self {
            fetcher,
            store,
            ttls,
            inflight: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// The cache store entries are written to
    pub fn store(&self) -> &Arc<TieredCacheStore> {
        &self.store
    }

    /// The wrapped fetcher
    pub fn fetcher(&self) -> &ResourceFetcher {
        &self.fetcher
    }

    /// TTLs applied to new entries
    pub fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    /// Start (or join) the fetch for `key`
    ///
    /// The returned future may be dropped at any time; the fetch keeps
    /// running and still publishes its result.
    pub fn populate(self: &Arc<Self>, key: CacheKey) -> InFlight {
        let spawned = match self.inflight.entry(key.clone()) {
            Entry::Occupied(existing) => return existing.get().1.clone(),
            Entry::Vacant(vacant) => {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                let this = Arc::clone(self);
                let task_key = key.clone();
                let future = async move {
                    let result = this.fetch_and_store(&task_key).await;
                    this.inflight
                        .remove_if(&task_key, |_, (current, _)| *current == generation);
                    result
                }
                .boxed()
                .shared();
                vacant.insert((generation, future.clone()));
                future
            }
        };

        tokio::spawn(spawned.clone());
        spawned
    }

    /// Whether a fetch for `key` is running
    pub fn is_inflight(&self, key: &CacheKey) -> bool {
        self.inflight.contains_key(key)
    }

    /// Whether any fetch is running for a key at or below `scope`
    pub fn is_inflight_within(&self, scope: &Scope) -> bool {
        self.inflight.iter().any(|e| scope.contains(&e.key().scope))
    }

    async fn fetch_and_store(&self, key: &CacheKey) -> PopulateResult {
        let outcome = match self.fetcher.fetch(key.kind, &key.scope).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(key = %key, error = %e, "inventory fetch failed");
                return Err(e);
            }
        };

        let entry = CacheEntry::new(key.clone(), prune_all(outcome.nodes), self.ttls.for_kind(key.kind))
            .with_truncation(outcome.truncated, outcome.total_available);
        let entry = self.store.put(entry).await;
        debug!(key = %key, nodes = entry.len(), "populated cache entry");
        Ok(entry)
    }
}
