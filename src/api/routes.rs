//! API route configuration.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use super::state::AppState;

/// Create the main API router with all routes.
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/v1", inventory_routes().merge(sync_routes()))
        .with_state(state)
}

/// Inventory queries and health.
fn inventory_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/servers/:server/datacenters", get(handlers::list_datacenters))
        .route(
            "/servers/:server/datacenters/:datacenter/clusters",
            get(handlers::list_clusters),
        )
        .route("/clusters/:cluster/resources", get(handlers::list_resources))
}

/// Sync control and cache status.
fn sync_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sync", post(handlers::trigger_sync))
        .route("/sync/progress", get(handlers::sync_progress))
        .route("/cache/status", get(handlers::cache_status))
}
