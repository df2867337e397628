//! vsphere-cache - vSphere inventory cache
//!
//! Command-line entry point: query the cache, run syncs or serve the HTTP API.

mod cli;

use anyhow::Result;
use cli::commands::CommandContext;
use cli::{Cli, Commands};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vsphere_inventory_cache::config::{Config, LogFormat, LoggingConfig};
use vsphere_inventory_cache::Error;

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(Error::from(e).exit_code());
        }
    };

    // Quiet by default for one-shot commands, configured level for the server
    let default_level = match cli.command {
        Commands::Serve(_) => config.logging.level.clone(),
        _ => "warn".to_string(),
    };
    init_logging(cli.verbosity(), &config.logging, &default_level);

    if cli.verbosity() >= 2 {
        eprintln!("vsphere-cache v{} ({})", VERSION, vsphere_inventory_cache::version_info());
    }

    // Create command context
    let mut ctx = CommandContext::new(&cli, config);

    // Execute the appropriate command
    let result = match &cli.command {
        Commands::Serve(args) => args.execute(&mut ctx).await,
        Commands::Sync(args) => args.execute(&mut ctx).await,
        Commands::Datacenters(args) => args.execute(&mut ctx).await,
        Commands::Clusters(args) => args.execute(&mut ctx).await,
        Commands::Resources(args) => args.execute(&mut ctx).await,
        Commands::Status(args) => args.execute(&mut ctx).await,
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            ctx.output.error(&format!("{:#}", e));
            e.downcast_ref::<Error>().map(Error::exit_code).unwrap_or(1)
        }
    };

    ctx.output.flush();
    std::process::exit(exit_code);
}

/// Initialize logging from verbosity and the `[logging]` section
///
/// `RUST_LOG` wins over both.
fn init_logging(verbosity: u8, logging: &LoggingConfig, default_level: &str) {
    let filter = match verbosity {
        0 => default_level,
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let (pretty, json) = match logging.format {
        LogFormat::Json => (
            None,
            Some(fmt::layer().json().with_writer(std::io::stderr)),
        ),
        LogFormat::Pretty => (
            Some(
                fmt::layer()
                    .with_target(verbosity >= 3)
                    .with_writer(std::io::stderr),
            ),
            None,
        ),
    };

    tracing_subscriber::registry()
        .with(pretty)
        .with(json)
        .with(env_filter)
        .init();
}
