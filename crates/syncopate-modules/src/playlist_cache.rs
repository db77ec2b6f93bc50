// SPDX-License-Identifier: GPL-3.0-or-later

use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use syncopate_config::SyncConfig;
use syncopate_spotify::{CachedPlaylist, Playlist};
use syncopate_state::RunStatus;

use crate::context::SyncContext;
use crate::module::SyncModule;
use crate::outcome::RunOutcome;
use crate::resolver::parse_options;
use crate::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistCacheOptions {
    #[serde(default = "default_true")]
    pub include_public: bool,
    #[serde(default = "default_true")]
    pub include_private: bool,
    #[serde(default = "default_true")]
    pub include_collaborative: bool,
}

fn default_true() -> bool {
    true
}

/// Enumerate the user's playlists and persist the snapshot the supervisor
/// serves to other syncs as the shared cache.
#[derive(Debug)]
pub struct PlaylistCacheModule {
    options: PlaylistCacheOptions,
    summary: Map<String, Value>,
}

impl PlaylistCacheModule {
    pub fn new(sync: &SyncConfig) -> Result<Self> {
        Ok(Self {
            options: parse_options(&sync.options)?,
            summary: Map::new(),
        })
    }

    fn filter_playlists(&self, playlists: Vec<Playlist>) -> Vec<Playlist> {
        playlists
            .into_iter()
            .filter(|playlist| {
                if !self.options.include_public && playlist.public == Some(true) {
                    return false;
                }
                if !self.options.include_private && playlist.public == Some(false) {
                    return false;
                }
                if !self.options.include_collaborative && playlist.collaborative == Some(true) {
                    return false;
                }
                true
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl SyncModule for PlaylistCacheModule {
    async fn run(&mut self, ctx: &mut SyncContext<'_>) -> Result<RunOutcome> {
        self.summary = Map::new();
        info!(target: "playlist_cache", "start");

        let playlists = ctx.spotify.list_all_playlists().await?;
        info!(target: "playlist_cache", count = playlists.len(), "discovered");

        let filtered = self.filter_playlists(playlists);
        info!(target: "playlist_cache", count = filtered.len(), "filtered");

        let entries: Vec<Value> = filtered
            .iter()
            .map(|playlist| {
                serde_json::to_value(CachedPlaylist::from(playlist)).unwrap_or(Value::Null)
            })
            .collect();
        let stored = entries.len();

        ctx.state.set(
            "last_refreshed",
            json!(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)),
        );
        ctx.state.set("playlists", Value::Array(entries));

        info!(target: "playlist_cache", stored, "completed");
        let outcome = RunOutcome::new(RunStatus::Success).with("stored", stored as u64);
        self.summary = outcome.details.clone();
        Ok(outcome)
    }

    fn last_run_summary(&self) -> Map<String, Value> {
        self.summary.clone()
    }
}
