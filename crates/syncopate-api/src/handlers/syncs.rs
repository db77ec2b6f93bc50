// SPDX-License-Identifier: GPL-3.0-or-later

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use syncopate_config::{load_global_config, load_sync_configs, SyncConfig};
use syncopate_ipc::{send_command, Command, JobStatus, Request, Response};
use syncopate_state::{state_path_for_sync, SyncState};

use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SyncSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub schedule: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&SyncConfig> for SyncSummary {
    fn from(sync: &SyncConfig) -> Self {
        let schedule = match (&sync.schedule.interval, &sync.schedule.cron) {
            (Some(interval), _) => format!("every {interval}"),
            (None, Some(cron)) => format!("cron[{cron}]"),
            (None, None) => "unscheduled".to_string(),
        };
        Self {
            id: sync.id.clone(),
            kind: sync.kind.clone(),
            schedule,
            description: sync.description.clone(),
        }
    }
}

/// List the sync definitions on disk.
#[utoipa::path(
    get,
    path = "/syncs",
    responses(
        (status = 200, description = "Sync definitions", body = [SyncSummary]),
        (status = 500, description = "Configuration unreadable", body = ErrorResponse)
    ),
    tag = "syncs"
)]
pub async fn list_syncs(State(state): State<AppState>) -> axum::response::Response {
    match load_sync_configs(&state.paths.syncs_dir) {
        Ok(syncs) => {
            let summaries: Vec<SyncSummary> = syncs.iter().map(SyncSummary::from).collect();
            (StatusCode::OK, Json(summaries)).into_response()
        }
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SupervisorStatusResponse {
    pub running: bool,
    #[schema(value_type = Vec<Object>)]
    pub jobs: Vec<JobStatus>,
}

/// Live scheduler state, fetched over the supervisor's IPC socket.
#[utoipa::path(
    get,
    path = "/supervisor/status",
    responses(
        (status = 200, description = "Supervisor job table", body = SupervisorStatusResponse),
        (status = 502, description = "Supervisor unreachable", body = ErrorResponse)
    ),
    tag = "syncs"
)]
pub async fn supervisor_status(State(state): State<AppState>) -> axum::response::Response {
    let config = match load_global_config(&state.paths) {
        Ok(config) => config,
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    match send_command(&config.supervisor.ipc_socket, &Request::status()).await {
        Ok(Response::Ok { jobs, .. }) => (
            StatusCode::OK,
            Json(SupervisorStatusResponse {
                running: true,
                jobs: jobs.unwrap_or_default(),
            }),
        )
            .into_response(),
        Ok(Response::Error { message }) => error(StatusCode::BAD_GATEWAY, message),
        Err(e) => error(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CommandRequest {
    /// One of `start`, `pause`, `resume`, `delete`.
    pub command: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CommandResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Forward a control command for one sync to the supervisor.
#[utoipa::path(
    post,
    path = "/syncs/{id}/command",
    request_body = CommandRequest,
    params(("id" = String, Path, description = "Sync id")),
    responses(
        (status = 200, description = "Command accepted", body = CommandResponse),
        (status = 400, description = "Unknown command or sync", body = ErrorResponse),
        (status = 502, description = "Supervisor unreachable", body = ErrorResponse)
    ),
    tag = "syncs"
)]
pub async fn sync_command(
    State(state): State<AppState>,
    Path(sync_id): Path<String>,
    Json(body): Json<CommandRequest>,
) -> axum::response::Response {
    let command = match body.command.as_str() {
        "start" => Command::Start,
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "delete" => Command::Delete,
        other => {
            return error(
                StatusCode::BAD_REQUEST,
                format!("Unsupported command: {other}"),
            )
        }
    };

    let config = match load_global_config(&state.paths) {
        Ok(config) => config,
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    match send_command(
        &config.supervisor.ipc_socket,
        &Request::for_sync(command, sync_id),
    )
    .await
    {
        Ok(Response::Ok { message, .. }) => (
            StatusCode::OK,
            Json(CommandResponse {
                status: "ok".to_string(),
                message,
            }),
        )
            .into_response(),
        Ok(Response::Error { message }) => error(StatusCode::BAD_REQUEST, message),
        Err(e) => error(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_tail")]
    pub tail: usize,
}

fn default_tail() -> usize {
    10
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryEntry {
    pub id: String,
    pub status: String,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

/// The last N run records of a sync, read from its state file.
#[utoipa::path(
    get,
    path = "/syncs/{id}/history",
    params(
        ("id" = String, Path, description = "Sync id"),
        ("tail" = Option<usize>, Query, description = "Number of records, newest last")
    ),
    responses(
        (status = 200, description = "Run records", body = [HistoryEntry]),
        (status = 404, description = "Unknown sync", body = ErrorResponse)
    ),
    tag = "syncs"
)]
pub async fn sync_history(
    State(state): State<AppState>,
    Path(sync_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> axum::response::Response {
    let config = match load_global_config(&state.paths) {
        Ok(config) => config,
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let syncs = match load_sync_configs(&state.paths.syncs_dir) {
        Ok(syncs) => syncs,
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let Some(sync) = syncs.iter().find(|sync| sync.id == sync_id) else {
        return error(StatusCode::NOT_FOUND, format!("Unknown sync: {sync_id}"));
    };

    let state_file = state_path_for_sync(&config, sync);
    let history = match SyncState::load(&state_file) {
        Ok(sync_state) => sync_state.run_history(),
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let tail = query.tail.max(1);
    let entries: Vec<HistoryEntry> = history
        .iter()
        .skip(history.len().saturating_sub(tail))
        .map(|record| HistoryEntry {
            id: record.id.clone(),
            status: record.status.to_string(),
            started_at: record.started_at.clone(),
            completed_at: record.completed_at.clone(),
            error: record.error.clone(),
            details: record.details.clone(),
        })
        .collect();
    (StatusCode::OK, Json(entries)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncopate_config::{bootstrap, ConfigPaths, GlobalConfig};

    fn fixture() -> (tempfile::TempDir, ConfigPaths, GlobalConfig) {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::from_base_dir(dir.path().join("home"));
        bootstrap(&paths, false).unwrap();
        let config = load_global_config(&paths).unwrap();
        (dir, paths, config)
    }

    fn write_sync(paths: &ConfigPaths, id: &str) {
        std::fs::write(
            paths.syncs_dir.join(format!("{id}.yml")),
            format!("id: {id}\ntype: playlist_cache\nschedule:\n  interval: 1h\ndescription: cache all playlists\n"),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn list_syncs_summarises_definitions() {
        let (_dir, paths, _config) = fixture();
        write_sync(&paths, "cache");

        let response = list_syncs(State(AppState::new(paths))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["id"], "cache");
        assert_eq!(parsed[0]["type"], "playlist_cache");
        assert_eq!(parsed[0]["schedule"], "every 1h");
    }

    #[tokio::test]
    async fn history_reads_run_records_from_the_state_file() {
        let (_dir, paths, config) = fixture();
        write_sync(&paths, "cache");
        let syncs = load_sync_configs(&paths.syncs_dir).unwrap();

        let mut state = SyncState::load(state_path_for_sync(&config, &syncs[0])).unwrap();
        for k in 0..5 {
            let run_id = format!("r-{k}");
            state.begin_run(&run_id, None);
            state.complete_run(&run_id, syncopate_state::RunStatus::Success, None, None, None);
        }
        state.save().unwrap();

        let response = sync_history(
            State(AppState::new(paths)),
            Path("cache".to_string()),
            Query(HistoryQuery { tail: 2 }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["id"], "r-3");
        assert_eq!(parsed[1]["id"], "r-4");
    }

    #[tokio::test]
    async fn unknown_sync_history_is_404() {
        let (_dir, paths, _config) = fixture();
        let response = sync_history(
            State(AppState::new(paths)),
            Path("ghost".to_string()),
            Query(HistoryQuery { tail: 10 }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unreachable_supervisor_is_a_bad_gateway() {
        let (_dir, paths, _config) = fixture();
        write_sync(&paths, "cache");

        let response = supervisor_status(State(AppState::new(paths.clone()))).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = sync_command(
            State(AppState::new(paths)),
            Path("cache".to_string()),
            Json(CommandRequest {
                command: "pause".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn unsupported_commands_are_rejected() {
        let (_dir, paths, _config) = fixture();
        let response = sync_command(
            State(AppState::new(paths)),
            Path("cache".to_string()),
            Json(CommandRequest {
                command: "status".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
