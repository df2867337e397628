//! Subcommands module for vsphere-cache CLI
//!
//! This module contains all the subcommand implementations.

pub mod query;
pub mod serve;
pub mod sync;

use crate::cli::output::OutputFormatter;
use crate::cli::progress::create_spinner;
use anyhow::{bail, Result};
use std::sync::Arc;
use vsphere_inventory_cache::config::Config;
use vsphere_inventory_cache::facade::QueryFacade;
use vsphere_inventory_cache::fetcher::{InventorySource, MockInventorySource, VsphereRestSource};

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
    /// Use the demo inventory
    pub mock: bool,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &crate::cli::Cli, mut config: Config) -> Self {
        let output = OutputFormatter::new(!cli.no_color, cli.is_json(), cli.verbosity());
        if let Some(server) = &cli.server {
            config.vsphere.server = server.clone();
        }

        Self {
            config,
            output,
            mock: cli.mock,
        }
    }

    /// Inventory source selected by flags and configuration
    pub fn source(&self) -> Result<Arc<dyn InventorySource>> {
        if self.mock {
            self.output.debug("Using the built-in demo inventory");
            return Ok(Arc::new(MockInventorySource::new()));
        }
        if self.config.vsphere.url.is_none() {
            self.output
                .hint("Set vsphere.url in the configuration or pass --mock");
            bail!("no vCenter URL configured");
        }
        let source = VsphereRestSource::new(&self.config.vsphere, self.config.fetch.timeout)?;
        Ok(Arc::new(source))
    }

    /// Build the query façade without touching the cache
    pub fn build_facade(&self) -> Result<QueryFacade> {
        Ok(QueryFacade::from_config(&self.config, self.source()?)?)
    }

    /// Build the query façade and load persisted entries
    pub async fn facade(&self) -> Result<QueryFacade> {
        let facade = self.build_facade()?;
        let warmed = facade.store().warm_from_disk().await;
        self.output
            .debug(&format!("Loaded {} cached entries from disk", warmed));
        Ok(facade)
    }

    /// Wait for background loads so they reach the persistent tiers
    pub async fn settle(&self, facade: &QueryFacade) {
        if facade.scheduler().outstanding() == 0 {
            return;
        }
        let spinner = (!self.output.is_json()).then(|| create_spinner("Waiting for background loads"));
        facade.scheduler().wait_idle().await;
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn context(args: &[&str]) -> CommandContext {
        let cli = Cli::try_parse_from(args).unwrap();
        CommandContext::new(&cli, Config::default())
    }

    #[test]
    fn test_server_flag_overrides_config() {
        let ctx = context(&["vsphere-cache", "--mock", "--server", "vc-lab", "--output", "json", "status"]);
        assert_eq!(ctx.config.vsphere.server, "vc-lab");
        assert!(ctx.output.is_json());
        assert_eq!(ctx.source().unwrap().name(), "mock");
    }

    #[test]
    fn test_missing_url_without_mock_is_an_error() {
        let ctx = context(&["vsphere-cache", "--output", "json", "datacenters"]);
        let err = ctx.source().err().unwrap();
        assert!(err.to_string().contains("no vCenter URL configured"));
    }
}
