//! Sync command
//!
//! Starts an inventory sync and follows it until it finishes.

use super::CommandContext;
use crate::cli::progress::{create_sync_bar, follow_sync};
use anyhow::Result;
use clap::Parser;
use vsphere_inventory_cache::facade::SyncTrigger;
use vsphere_inventory_cache::progress::SyncStatus;
use vsphere_inventory_cache::scheduler::SyncMode;

/// Arguments for the sync command
#[derive(Parser, Debug, Clone)]
pub struct SyncArgs {
    /// Also refresh datastores and networks of every cluster
    #[arg(long)]
    pub full: bool,
}

impl SyncArgs {
    fn mode(&self) -> SyncMode {
        if self.full {
            SyncMode::Full
        } else {
            SyncMode::Essential
        }
    }

    /// Execute the sync command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let facade = ctx.facade().await?;
        let mode = self.mode();

        let trigger = facade.trigger_sync(mode);
        match &trigger {
            SyncTrigger::Accepted { sync_id, .. } => {
                ctx.output
                    .banner(&format!("{} SYNC: {}", mode.to_string().to_uppercase(), facade.server()));
                ctx.output.debug(&format!("Sync id {}", sync_id));
            }
            SyncTrigger::Rejected { reason, progress } => {
                ctx.output.json(&trigger);
                ctx.output.error(reason);
                ctx.output
                    .hint(&format!("Current sync is at {}%", progress.percent));
                return Ok(4);
            }
        }

        let bar = (!ctx.output.is_json()).then(|| create_sync_bar(1));
        let progress = follow_sync(facade.scheduler().tracker().subscribe(), bar.as_ref()).await;
        if let Some(bar) = &bar {
            bar.finish_with_message(progress.message.clone());
        }

        // Stray prefetches still write through to the persistent tiers
        facade.scheduler().wait_idle().await;

        ctx.output.json(&progress);
        match progress.status {
            SyncStatus::Error => {
                ctx.output.error(&progress.message);
                Ok(1)
            }
            _ => {
                ctx.output.info(&format!(
                    "{} of {} steps completed",
                    progress.completed_steps, progress.total_steps
                ));
                ctx.output.elapsed();
                Ok(0)
            }
        }
    }
}
