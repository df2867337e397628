//! CLI module for vsphere-cache
//!
//! This module provides the command-line interface: argument parsing and
//! subcommand dispatch. Every subcommand goes through the same query façade
//! the HTTP adapter uses.

pub mod commands;
pub mod output;
pub mod progress;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// vsphere-cache - vSphere inventory cache for VM self-service portals
///
/// Serves datacenters, clusters and per-cluster resources from a multi-tier
/// cache that never blocks on a slow vCenter.
#[derive(Parser, Debug, Clone)]
#[command(name = "vsphere-cache")]
#[command(author = "vSphere Portal Contributors")]
#[command(version)]
#[command(about = "Multi-tier vSphere inventory cache", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "VSPHERE_CACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// vCenter server name (defaults to the configured one)
    #[arg(short = 's', long, global = true)]
    pub server: Option<String>,

    /// Serve the built-in demo inventory instead of contacting vCenter
    #[arg(long, global = true)]
    pub mock: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// JSON output for scripting
    Json,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP API with periodic background syncs
    Serve(commands::serve::ServeArgs),

    /// Run a sync and follow its progress
    Sync(commands::sync::SyncArgs),

    /// List datacenters
    Datacenters(commands::query::DatacentersArgs),

    /// List clusters of a datacenter
    Clusters(commands::query::ClustersArgs),

    /// List resource pools, datastores, networks and templates of a cluster
    Resources(commands::query::ResourcesArgs),

    /// Show cache and sync status
    Status(commands::query::StatusArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// Check if JSON output is requested
    pub fn is_json(&self) -> bool {
        matches!(self.output, OutputFormat::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["vsphere-cache", "datacenters"]).unwrap();
        assert!(matches!(cli.command, Commands::Datacenters(_)));
        assert!(!cli.mock);
    }

    #[test]
    fn test_verbosity() {
        let cli = Cli::try_parse_from(["vsphere-cache", "-vvvv", "status"]).unwrap();
        assert_eq!(cli.verbosity(), 3);
    }

    #[test]
    fn test_resources_by_name() {
        let cli = Cli::try_parse_from([
            "vsphere-cache",
            "--mock",
            "--output",
            "json",
            "resources",
            "NONPROD-Cluster-1",
            "--by-name",
        ])
        .unwrap();
        assert!(cli.is_json());
        match cli.command {
            Commands::Resources(args) => {
                assert!(args.by_name);
                assert_eq!(args.cluster, "NONPROD-Cluster-1");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_sync_full_flag() {
        let cli = Cli::try_parse_from(["vsphere-cache", "sync", "--full"]).unwrap();
        assert!(matches!(cli.command, Commands::Sync(ref args) if args.full));
    }
}
