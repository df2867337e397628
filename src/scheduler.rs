//! Background refresh scheduler.
//!
//! Refreshes and other background jobs run on detached tokio tasks, gated
//! by a fair semaphore so that at most `max_concurrency` of them touch the
//! platform at once; the rest queue in FIFO order. Jobs are never tied to a
//! request: a caller may drop its [`RefreshHandle`] and the job still runs.
//! At shutdown outstanding jobs are simply abandoned.
//!
//! The scheduler also drives syncs. An essential sync walks datacenters,
//! then clusters of every datacenter, then templates of every cluster; a
//! full sync adds resource pools, datastores and networks. Every unit is an
//! ordinary scheduled refresh and progress goes to the [`SyncTracker`].

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::cache::CacheKey;
use crate::error::{Error, Result};
use crate::inventory::{NodeKind, Scope};
use crate::populate::CachePopulator;
use crate::progress::SyncTracker;

/// Which resource kinds a sync refreshes per cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Datacenters, clusters and templates
    #[default]
    Essential,
    /// Every kind
    Full,
}

impl SyncMode {
    /// Kinds refreshed for every cluster
    pub fn cluster_kinds(&self) -> &'static [NodeKind] {
        match self {
            SyncMode::Essential => &[NodeKind::Template],
            SyncMode::Full => &NodeKind::CLUSTER_RESOURCES,
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Essential => f.write_str("essential"),
            SyncMode::Full => f.write_str("full"),
        }
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "essential" => Ok(SyncMode::Essential),
            "full" => Ok(SyncMode::Full),
            other => Err(format!("unknown sync mode '{}'", other)),
        }
    }
}

type JobOutcome = Option<std::result::Result<(), String>>;

/// Handle on a scheduled job
///
/// Dropping the handle does not cancel the job.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    id: u64,
    label: Arc<str>,
    done: watch::Receiver<JobOutcome>,
}

impl RefreshHandle {
    /// Job label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the job has finished
    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }

    /// Wait for the job to finish
    pub async fn wait(mut self) -> Result<()> {
        loop {
            let current = self.done.borrow().clone();
            if let Some(outcome) = current {
                return outcome.map_err(|message| Error::TaskFailed {
                    label: self.label.to_string(),
                    message,
                });
            }
            if self.done.changed().await.is_err() {
                let current = self.done.borrow().clone();
                return match current {
                    Some(outcome) => outcome.map_err(|message| Error::TaskFailed {
                        label: self.label.to_string(),
                        message,
                    }),
                    None => Err(Error::TaskAborted(self.label.to_string())),
                };
            }
        }
    }
}

struct Inner {
    populator: Arc<CachePopulator>,
    tracker: Arc<SyncTracker>,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    pending: DashMap<String, RefreshHandle>,
    next_id: AtomicU64,
    outstanding: AtomicUsize,
    running: AtomicUsize,
    peak_running: AtomicUsize,
    idle: Notify,
}

/// Releases the bookkeeping of a job even if it panics
struct JobGuard {
    inner: Arc<Inner>,
    label: String,
    id: u64,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        let id = self.id;
        self.inner.pending.remove_if(&self.label, |_, handle| handle.id == id);
        if self.inner.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// Counts a job as running while it holds a permit
struct RunningGuard {
    inner: Arc<Inner>,
}

impl RunningGuard {
    fn enter(inner: &Arc<Inner>) -> Self {
        let running = inner.running.fetch_add(1, Ordering::SeqCst) + 1;
        inner.peak_running.fetch_max(running, Ordering::SeqCst);
        Self {
            inner: Arc::clone(inner),
        }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.inner.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded background job runner
#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Arc<Inner>,
}

impl RefreshScheduler {
    /// Create a scheduler running at most `max_concurrency` jobs at once
    pub fn new(populator: Arc<CachePopulator>, tracker: Arc<SyncTracker>, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            inner: Arc::new(Inner {
                populator,
                tracker,
                permits: Arc::new(Semaphore::new(max_concurrency)),
                max_concurrency,
                pending: DashMap::new(),
                next_id: AtomicU64::new(0),
                outstanding: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                peak_running: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Concurrency bound
    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency
    }

    /// Jobs currently holding a permit
    pub fn running(&self) -> usize {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Highest number of jobs that ever ran at once
    pub fn peak_running(&self) -> usize {
        self.inner.peak_running.load(Ordering::SeqCst)
    }

    /// Jobs queued or running
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    /// Progress tracker shared with sync jobs
    pub fn tracker(&self) -> &Arc<SyncTracker> {
        &self.inner.tracker
    }

    /// Populator used by refresh jobs
    pub fn populator(&self) -> &Arc<CachePopulator> {
        &self.inner.populator
    }

    /// Run `job` in the background under the concurrency bound
    ///
    /// A job submitted while another job with the same label is queued or
    /// running is coalesced: the existing handle is returned and `job` is
    /// dropped unpolled.
    pub fn submit<F>(&self, label: impl Into<String>, job: F) -> RefreshHandle
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let label = label.into();
        let (tx, rx) = watch::channel(None);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let handle = match self.inner.pending.entry(label.clone()) {
            Entry::Occupied(existing) => {
                trace!(label = %label, "coalesced background job");
                return existing.get().clone();
            }
            Entry::Vacant(vacant) => {
                let handle = RefreshHandle {
                    id,
                    label: Arc::from(label.as_str()),
                    done: rx,
                };
                vacant.insert(handle.clone());
                handle
            }
        };

        self.inner.outstanding.fetch_add(1, Ordering::SeqCst);
        let guard = JobGuard {
            inner: Arc::clone(&self.inner),
            label,
            id,
        };

        tokio::spawn(async move {
            let inner = Arc::clone(&guard.inner);
            let outcome = match Arc::clone(&inner.permits).acquire_owned().await {
                Ok(_permit) => {
                    let _running = RunningGuard::enter(&inner);
                    job.await.map_err(|e| e.to_string())
                }
                Err(_) => Err("scheduler closed".to_string()),
            };

            if let Err(e) = &outcome {
                debug!(label = %guard.label, error = %e, "background job failed");
            }
            inner
                .pending
                .remove_if(&guard.label, |_, handle| handle.id == guard.id);
            let _ = tx.send(Some(outcome));
            drop(guard);
        });

        handle
    }

    /// Refresh one cache entry in the background
    ///
    /// A failure is recorded in the tracker unless a sync owns it.
    pub fn trigger_refresh(&self, key: CacheKey) -> RefreshHandle {
        let populator = Arc::clone(&self.inner.populator);
        let tracker = Arc::clone(&self.inner.tracker);
        self.submit(refresh_label(&key), async move {
            match populator.populate(key.clone()).await {
                Ok(_) => Ok(()),
                Err(e) => {
                    warn!(key = %key, error = %e, "background refresh failed");
                    tracker.fail_if_idle(format!("Refresh of {} failed: {}", key, e));
                    Err(e.into())
                }
            }
        })
    }

    /// Warm a cache entry ahead of demand; failures are only logged
    ///
    /// Prefetches coalesce only with other prefetches, so a refresh never
    /// inherits a prefetch's swallowed failure.
    pub fn prefetch(&self, key: CacheKey) -> RefreshHandle {
        let populator = Arc::clone(&self.inner.populator);
        self.submit(prefetch_label(&key), async move {
            if populator.store().contains(&key) {
                trace!(key = %key, "already cached, prefetch skipped");
                return Ok(());
            }
            if let Err(e) = populator.populate(key.clone()).await {
                debug!(key = %key, error = %e, "prefetch failed");
            }
            Ok(())
        })
    }

    /// Wait until no job is queued or running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Start a sync of `server` in the background
    ///
    /// Fails with [`Error::SyncAlreadyRunning`] if one is in progress.
    pub fn start_sync(&self, server: &str, mode: SyncMode) -> Result<Uuid> {
        let sync_id = self
            .inner
            .tracker
            .start(1, format!("Starting {} sync of {}", mode, server))?;

        let this = self.clone();
        let server = server.to_string();
        tokio::spawn(async move { this.run_sync(server, mode).await });
        Ok(sync_id)
    }

    /// Start an essential sync every `interval` until the task is aborted
    ///
    /// Returns `None` when `interval` is zero.
    pub fn spawn_periodic_sync(
        &self,
        server: impl Into<String>,
        interval: Duration,
        retention: Duration,
    ) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            return None;
        }

        let this = self.clone();
        let server = server.into();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match this.start_sync(&server, SyncMode::Essential) {
                    Ok(sync_id) => debug!(%sync_id, "periodic sync started"),
                    Err(e) => debug!(error = %e, "periodic sync skipped"),
                }
                this.inner
                    .populator
                    .store()
                    .purge_memory_older_than(retention)
                    .await;
            }
        }))
    }

    async fn run_sync(&self, server: String, mode: SyncMode) {
        let tracker = &self.inner.tracker;
        let store = self.inner.populator.store();
        let mut failures = 0usize;

        // Datacenters
        let dc_key = CacheKey::datacenters(server.as_str());
        if let Err(e) = self.trigger_refresh(dc_key.clone()).wait().await {
            failures += 1;
            warn!(server = %server, error = %e, "datacenter refresh failed during sync");
        }
        let datacenters = match store.get(&dc_key).await {
            Some(entry) => entry,
            None => {
                tracker.fail(format!("Sync of {} failed: datacenters unavailable", server));
                return;
            }
        };
        tracker.extend_total(datacenters.len() as u64);
        tracker.advance(1, format!("Loaded {} datacenters", datacenters.len()));

        // Clusters of every datacenter
        let server_scope = Scope::server(server.as_str());
        let mut jobs: FuturesUnordered<_> = datacenters
            .nodes
            .iter()
            .filter_map(|dc| server_scope.child(dc))
            .map(|scope| self.refresh_unit(CacheKey::new(scope, NodeKind::Cluster)))
            .collect();

        let mut cluster_scopes = Vec::new();
        while let Some((key, result)) = jobs.next().await {
            if result.is_err() {
                failures += 1;
            }
            if let Some(entry) = store.get(&key).await {
                cluster_scopes.extend(entry.nodes.iter().filter_map(|c| key.scope.child(c)));
            }
            tracker.advance(1, format!("Loaded clusters of {}", key.scope));
        }

        // Per-cluster resources
        let kinds = mode.cluster_kinds();
        tracker.extend_total((cluster_scopes.len() * kinds.len()) as u64);
        let mut jobs: FuturesUnordered<_> = cluster_scopes
            .iter()
            .flat_map(|scope| kinds.iter().map(move |kind| CacheKey::new(scope.clone(), *kind)))
            .map(|key| self.refresh_unit(key))
            .collect();

        while let Some((key, result)) = jobs.next().await {
            if result.is_err() {
                failures += 1;
            }
            tracker.advance(1, format!("Loaded {} of {}", key.kind, key.scope));
        }

        let summary = format!(
            "{} sync of {} complete: {} datacenters, {} clusters",
            mode,
            server,
            datacenters.len(),
            cluster_scopes.len()
        );
        if failures == 0 {
            tracker.complete(summary);
        } else {
            tracker.complete(format!("{} ({} refreshes failed)", summary, failures));
        }
        info!(server = %server, %mode, failures, "sync finished");
    }

    fn refresh_unit(&self, key: CacheKey) -> impl Future<Output = (CacheKey, Result<()>)> + Send + 'static {
        let handle = self.trigger_refresh(key.clone());
        async move {
            let result = handle.wait().await;
            (key, result)
        }
    }
}

fn refresh_label(key: &CacheKey) -> String {
    format!("refresh {}", key)
}

fn prefetch_label(key: &CacheKey) -> String {
    format!("prefetch {}", key)
}
