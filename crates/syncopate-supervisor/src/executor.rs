// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::{error, info};

use syncopate_config::{ConfigPaths, GlobalConfig, SyncConfig};
use syncopate_modules::{ModuleError, ModuleRegistry, SyncContext};
use syncopate_spotify::{SharedPlaylistCache, SpotifyAuth, SpotifyClient, SpotifyService};
use syncopate_state::{state_path_for_sync, RunStatus, SyncState};

use crate::Result;

/// What a fire produced, for the supervisor's own bookkeeping.
#[derive(Debug, Clone)]
pub struct FireReport {
    pub sync_id: String,
    pub status: RunStatus,
    pub error: Option<String>,
}

fn run_details(stage: Option<&str>, summary: Map<String, Value>) -> Value {
    let mut details = Map::new();
    details.insert("mode".to_string(), Value::String("supervisor".to_string()));
    if let Some(stage) = stage {
        details.insert("stage".to_string(), Value::String(stage.to_string()));
    }
    for (key, value) in summary {
        details.insert(key, value);
    }
    Value::Object(details)
}

/// Execute one fire of a sync: load state, begin a run record, build the
/// module and the Spotify service, run the module, and always persist the
/// resulting state.
///
/// Module failures become `failed` run records; only state-store errors
/// propagate to the caller.
pub async fn execute_fire(
    sync: &SyncConfig,
    global: &GlobalConfig,
    paths: &ConfigPaths,
    registry: &ModuleRegistry,
    shared_cache: Option<Arc<SharedPlaylistCache>>,
) -> Result<FireReport> {
    let state_path = state_path_for_sync(global, sync);
    let mut state = SyncState::load(&state_path)?;

    let run_id = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false);
    state.begin_run(&run_id, Some(&run_id));

    let mut module = match registry.create(sync) {
        Ok(module) => module,
        Err(e) => {
            let stage = match &e {
                ModuleError::UnknownType(_) => "module_lookup",
                _ => "module_init",
            };
            error!(
                target: "supervisor",
                sync_id = %sync.id,
                sync_type = %sync.kind,
                error = %e,
                stage,
                "module unavailable"
            );
            state.complete_run(
                &run_id,
                RunStatus::Failed,
                None,
                Some(e.to_string()),
                Some(run_details(Some(stage), Map::new())),
            );
            state.save()?;
            return Ok(FireReport {
                sync_id: sync.id.clone(),
                status: RunStatus::Failed,
                error: Some(e.to_string()),
            });
        }
    };

    let service = match build_service(global, shared_cache.clone()) {
        Ok(service) => service,
        Err(e) => {
            error!(
                target: "supervisor",
                sync_id = %sync.id,
                sync_type = %sync.kind,
                error = %e,
                "spotify client init failed"
            );
            state.complete_run(
                &run_id,
                RunStatus::Failed,
                None,
                Some(e.to_string()),
                Some(run_details(Some("spotify_init"), Map::new())),
            );
            state.save()?;
            return Ok(FireReport {
                sync_id: sync.id.clone(),
                status: RunStatus::Failed,
                error: Some(e.to_string()),
            });
        }
    };

    let mut ctx = SyncContext {
        spotify: &service,
        state: &mut state,
        global,
        paths,
        shared_cache,
    };

    info!(target: "supervisor", sync_id = %sync.id, sync_type = %sync.kind, "sync run start");
    let report = match module.run(&mut ctx).await {
        Ok(outcome) => {
            info!(
                target: "supervisor",
                sync_id = %sync.id,
                sync_type = %sync.kind,
                status = %outcome.status,
                "sync completed"
            );
            state.complete_run(
                &run_id,
                outcome.status,
                None,
                None,
                Some(run_details(None, outcome.details)),
            );
            FireReport {
                sync_id: sync.id.clone(),
                status: outcome.status,
                error: None,
            }
        }
        Err(e) => {
            error!(
                target: "supervisor",
                sync_id = %sync.id,
                sync_type = %sync.kind,
                error = %e,
                "sync failed"
            );
            state.complete_run(
                &run_id,
                RunStatus::Failed,
                None,
                Some(e.to_string()),
                Some(run_details(Some("module_execution"), module.last_run_summary())),
            );
            FireReport {
                sync_id: sync.id.clone(),
                status: RunStatus::Failed,
                error: Some(e.to_string()),
            }
        }
    };

    state.save()?;
    Ok(report)
}

fn build_service(
    global: &GlobalConfig,
    shared_cache: Option<Arc<SharedPlaylistCache>>,
) -> syncopate_spotify::Result<SpotifyService> {
    let auth = SpotifyAuth::from_config(global)?;
    let client = SpotifyClient::new(auth)?;
    Ok(SpotifyService::new(client).with_shared_cache(shared_cache))
}
