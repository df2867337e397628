//! Progress display for long-running commands.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::watch;

use vsphere_inventory_cache::progress::SyncProgress;

/// Create a spinner for indeterminate progress
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Create a bar tracking sync steps
pub fn create_sync_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
    {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar.set_prefix("sync");
    bar
}

/// Follow a sync until it leaves the running state
///
/// Returns the final snapshot. `bar` is updated on every change when given.
pub async fn follow_sync(
    mut rx: watch::Receiver<SyncProgress>,
    bar: Option<&ProgressBar>,
) -> SyncProgress {
    loop {
        let snapshot = rx.borrow_and_update().clone();
        if let Some(bar) = bar {
            bar.set_length(snapshot.total_steps.max(1));
            bar.set_position(snapshot.completed_steps);
            bar.set_message(snapshot.message.clone());
        }
        if !snapshot.is_running() {
            return snapshot;
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone();
        }
    }
}
