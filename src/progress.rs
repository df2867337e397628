//! Sync progress tracking.
//!
//! One [`SyncTracker`] exists per process. It describes the most recent
//! background sync: whether it is running, how far it got, and the last
//! message. The state lives in a `tokio::sync::watch` channel, so readers
//! take cheap snapshots and may subscribe to changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Lifecycle of a sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No sync has run yet
    #[default]
    Idle,
    /// A sync is in progress
    Running,
    /// The last sync finished
    Complete,
    /// The last sync (or a standalone refresh) failed
    Error,
}

/// Snapshot of the tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Id of the sync this snapshot belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<Uuid>,
    pub status: SyncStatus,
    /// 0-100
    pub percent: u8,
    pub message: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub completed_steps: u64,
    pub total_steps: u64,
}

impl Default for SyncProgress {
    fn default() -> Self {
        Self {
            sync_id: None,
            status: SyncStatus::Idle,
            percent: 0,
            message: "No sync has run yet".to_string(),
            started_at: None,
            finished_at: None,
            completed_steps: 0,
            total_steps: 0,
        }
    }
}

impl SyncProgress {
    /// Whether a sync currently owns the tracker
    pub fn is_running(&self) -> bool {
        self.status == SyncStatus::Running
    }

    fn recompute_percent(&mut self) {
        if self.total_steps == 0 {
            return;
        }
        // Running syncs never report 100 until `complete`, and discovered
        // work does not move the bar backwards
        let pct = (self.completed_steps.saturating_mul(100) / self.total_steps).min(99) as u8;
        self.percent = self.percent.max(pct);
    }
}

/// Process-wide sync progress
#[derive(Debug)]
pub struct SyncTracker {
    state: watch::Sender<SyncProgress>,
}

impl Default for SyncTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncTracker {
    /// Create an idle tracker
    pub fn new() -> Self {
        let (state, _) = watch::channel(SyncProgress::default());
        Self { state }
    }

    /// Claim the tracker for a new sync
    ///
    /// Fails with [`Error::SyncAlreadyRunning`] while another sync runs.
    pub fn start(&self, total_steps: u64, message: impl Into<String>) -> Result<Uuid> {
        let message = message.into();
        let sync_id = Uuid::new_v4();
        let mut rejected = None;

        self.state.send_if_modified(|state| {
            if state.is_running() {
                rejected = Some((state.started_at, state.percent));
                return false;
            }
            *state = SyncProgress {
                sync_id: Some(sync_id),
                status: SyncStatus::Running,
                percent: 0,
                message: message.clone(),
                started_at: Some(Utc::now()),
                finished_at: None,
                completed_steps: 0,
                total_steps,
            };
            true
        });

        if let Some((started_at, percent)) = rejected {
            return Err(Error::SyncAlreadyRunning {
                started_at,
                percent,
            });
        }

        info!(%sync_id, total_steps, "sync started: {}", message);
        Ok(sync_id)
    }

    /// Add work discovered while the sync runs
    pub fn extend_total(&self, steps: u64) {
        self.state.send_if_modified(|state| {
            if !state.is_running() {
                return false;
            }
            state.total_steps += steps;
            state.recompute_percent();
            true
        });
    }

    /// Record `steps` completed units
    pub fn advance(&self, steps: u64, message: impl Into<String>) {
        let message = message.into();
        self.state.send_if_modified(|state| {
            if !state.is_running() {
                return false;
            }
            state.completed_steps += steps;
            state.recompute_percent();
            state.message = message;
            true
        });
    }

    /// Finish the running sync successfully
    pub fn complete(&self, message: impl Into<String>) {
        let message = message.into();
        self.state.send_modify(|state| {
            state.status = SyncStatus::Complete;
            state.percent = 100;
            state.completed_steps = state.total_steps.max(state.completed_steps);
            state.message = message;
            state.finished_at = Some(Utc::now());
        });
        info!("sync complete");
    }

    /// Mark the sync (or a standalone refresh) as failed
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(error = %message, "sync failed");
        self.state.send_modify(|state| {
            state.status = SyncStatus::Error;
            state.message = message;
            state.finished_at = Some(Utc::now());
        });
    }

    /// Record a failure only if no sync owns the tracker
    ///
    /// Returns whether the failure was recorded.
    pub fn fail_if_idle(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.state.send_if_modified(|state| {
            if state.is_running() {
                return false;
            }
            state.status = SyncStatus::Error;
            state.message = message;
            state.finished_at = Some(Utc::now());
            true
        })
    }

    /// Current state
    pub fn snapshot(&self) -> SyncProgress {
        self.state.borrow().clone()
    }

    /// Receiver notified on every change
    pub fn subscribe(&self) -> watch::Receiver<SyncProgress> {
        self.state.subscribe()
    }
}
