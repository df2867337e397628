//! API route handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::info;

use super::error::ApiResult;
use super::state::AppState;
use super::types::*;
use crate::facade::{CacheStatusReport, QueryResponse, SyncTrigger};
use crate::progress::SyncProgress;

/// Serialize a query response, adding `Retry-After` while loading.
fn query_response<T: Serialize>(response: QueryResponse<T>) -> Response {
    match response.retry_after_secs {
        Some(secs) => (
            StatusCode::OK,
            [(header::RETRY_AFTER, secs.to_string())],
            Json(response),
        )
            .into_response(),
        None => Json(response).into_response(),
    }
}

// ============================================================================
// Health
// ============================================================================

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::version().to_string(),
        uptime_secs: state.uptime_secs(),
        server: state.facade.server().to_string(),
        tiers: state.facade.store().tiers(),
        sync: state.facade.sync_progress().status,
    })
}

// ============================================================================
// Inventory
// ============================================================================

/// List datacenters of a server.
pub async fn list_datacenters(
    State(state): State<Arc<AppState>>,
    Path(server): Path<String>,
) -> Response {
    query_response(state.facade.get_datacenters(&server).await)
}

/// List clusters of a datacenter.
pub async fn list_clusters(
    State(state): State<Arc<AppState>>,
    Path((server, datacenter)): Path<(String, String)>,
) -> Response {
    query_response(state.facade.get_clusters(&server, &datacenter).await)
}

/// List the resources of a cluster, referenced by id or name.
pub async fn list_resources(
    State(state): State<Arc<AppState>>,
    Path(cluster): Path<String>,
    Query(query): Query<ResourcesQuery>,
) -> ApiResult<Response> {
    let reference = query.reference(cluster);
    let response = state.facade.get_resources(&reference).await?;
    Ok(query_response(response))
}

// ============================================================================
// Sync and status
// ============================================================================

/// Start a sync; 202 when accepted, 409 while another one runs.
pub async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SyncQuery>,
) -> (StatusCode, Json<SyncTrigger>) {
    let trigger = state.facade.trigger_sync(query.mode);
    let status = if trigger.is_accepted() {
        info!(mode = %query.mode, "sync accepted");
        StatusCode::ACCEPTED
    } else {
        StatusCode::CONFLICT
    };
    (status, Json(trigger))
}

/// Progress of the most recent sync.
pub async fn sync_progress(State(state): State<Arc<AppState>>) -> Json<SyncProgress> {
    Json(state.facade.sync_progress())
}

/// Per-kind cache status.
pub async fn cache_status(State(state): State<Arc<AppState>>) -> Json<CacheStatusReport> {
    Json(state.facade.get_cache_status())
}
