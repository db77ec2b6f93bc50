// SPDX-License-Identifier: GPL-3.0-or-later

//! HTTP control plane for syncopate.
//!
//! A thin face over the supervisor: sync definitions and run history are
//! read from disk, every live operation goes through the IPC socket. The
//! API never touches the scheduler directly.

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use syncopate_config::ConfigPaths;

use handlers::syncs::{
    list_syncs, supervisor_status, sync_command, sync_history, CommandRequest, CommandResponse,
    ErrorResponse, HistoryEntry, SupervisorStatusResponse, SyncSummary, __path_list_syncs,
    __path_supervisor_status, __path_sync_command, __path_sync_history,
};

/// Shared state for all handlers: the resolved configuration layout.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<ConfigPaths>,
}

impl AppState {
    pub fn new(paths: ConfigPaths) -> Self {
        Self {
            paths: Arc::new(paths),
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
struct HealthResponse {
    status: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
#[allow(dead_code)]
async fn health() -> Json<HealthResponse> {
    health_handler().await
}

#[derive(OpenApi)]
#[openapi(
    paths(health, list_syncs, supervisor_status, sync_command, sync_history),
    components(
        schemas(
            HealthResponse,
            SyncSummary,
            SupervisorStatusResponse,
            CommandRequest,
            CommandResponse,
            HistoryEntry,
            ErrorResponse,
        )
    ),
    tags(
        (name = "system", description = "System health endpoints"),
        (name = "syncs", description = "Sync definitions and control")
    ),
    info(
        title = "Syncopate API",
        version = "0.1.0",
        description = "Control plane for the syncopate sync supervisor",
    )
)]
struct ApiDoc;

pub fn router(state: AppState) -> Router {
    info!(target: "api", "building router");

    Router::new()
        .route("/health", get(health_handler))
        .route("/syncs", get(list_syncs))
        .route("/supervisor/status", get(supervisor_status))
        .route("/syncs/:id/command", post(sync_command))
        .route("/syncs/:id/history", get(sync_history))
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .with_state(state)
}
