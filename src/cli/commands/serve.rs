//! Serve command
//!
//! Runs the HTTP API until Ctrl-C.

use super::CommandContext;
use anyhow::Result;
use clap::Parser;

/// Arguments for the serve command
#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind (overrides api.bind_address)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Do not run periodic syncs
    #[arg(long)]
    pub no_sync: bool,
}

impl ServeArgs {
    /// Execute the serve command
    #[cfg(feature = "api")]
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        use std::sync::Arc;
        use vsphere_inventory_cache::api::{ApiConfig, ApiServer};

        let mut settings = ctx.config.api.clone();
        if let Some(bind) = &self.bind {
            settings.bind_address = bind.clone();
        }
        let api_config = ApiConfig::from_settings(&settings)?;

        let facade = Arc::new(ctx.build_facade()?);
        let periodic = if self.no_sync {
            facade.store().warm_from_disk().await;
            None
        } else {
            facade.start().await
        };

        ctx.output.banner(&format!("SERVING {}", facade.server()));
        ctx.output.info(&format!("Listening on {}", api_config.bind_address));

        let server = ApiServer::new(api_config, Arc::clone(&facade));
        server
            .run_with_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;

        if let Some(handle) = periodic {
            handle.abort();
        }
        facade.scheduler().wait_idle().await;
        Ok(0)
    }

    /// Execute the serve command
    #[cfg(not(feature = "api"))]
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        ctx.output
            .error("This binary was built without the `api` feature");
        Ok(1)
    }
}
