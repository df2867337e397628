//! HTTP adapter over the query façade.
//!
//! A thin JSON layer: every handler calls one façade operation and
//! serializes the answer. Loading responses carry a `Retry-After` header in
//! addition to `retry_after_secs` in the body.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vsphere_inventory_cache::api::{ApiConfig, ApiServer};
//!
//! let server = ApiServer::new(ApiConfig::default(), Arc::new(facade));
//! server.run().await?;
//! ```

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{ApiSettings, ConfigError};
use crate::facade::QueryFacade;

pub use error::{ApiError, ApiResult};
pub use state::AppState;
pub use types::*;

/// Configuration for the API server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Address to bind the server to
    pub bind_address: SocketAddr,
    /// Whether to enable CORS
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            enable_cors: true,
        }
    }
}

impl ApiConfig {
    /// Build from the `[api]` configuration section
    pub fn from_settings(settings: &ApiSettings) -> Result<Self, ConfigError> {
        let bind_address = settings
            .bind_address
            .parse()
            .map_err(|e| ConfigError::Invalid {
                key: "api.bind_address".to_string(),
                message: format!("{}: {}", settings.bind_address, e),
            })?;
        Ok(Self {
            bind_address,
            enable_cors: settings.enable_cors,
        })
    }

    /// Override the bind address.
    pub fn with_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }
}

/// The API server.
pub struct ApiServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    /// Create a server over a façade.
    pub fn new(config: ApiConfig, facade: Arc<QueryFacade>) -> Self {
        Self {
            config,
            state: Arc::new(AppState::new(facade)),
        }
    }

    /// Build the router with all routes.
    pub fn router(&self) -> Router {
        let mut app = Router::new().merge(routes::api_routes(self.state.clone()));

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            app = app.layer(cors);
        }

        app.layer(TraceLayer::new_for_http())
    }

    /// Run the API server.
    pub async fn run(self) -> Result<(), std::io::Error> {
        self.run_with_shutdown(std::future::pending()).await
    }

    /// Run the server with graceful shutdown support.
    pub async fn run_with_shutdown(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let addr = self.config.bind_address;
        let router = self.router();

        info!("Starting inventory cache API on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
    }

    /// Get a reference to the application state.
    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }
}
