// SPDX-License-Identifier: GPL-3.0-or-later

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use syncopate_config::SyncConfig;
use syncopate_state::RunStatus;

use crate::context::SyncContext;
use crate::module::SyncModule;
use crate::outcome::RunOutcome;
use crate::resolver::{parse_options, PlaylistResolver};
use crate::{ModuleError, Result};

const LASTFM_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";
const SEARCH_LIMIT: usize = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct LastFmTopTracksOptions {
    pub playlist: PlaylistResolver,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_period")]
    pub period: String,
    #[serde(default = "default_true")]
    pub clear_before_add: bool,
    /// Override for tests; the public API otherwise.
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_limit() -> u32 {
    10
}

fn default_period() -> String {
    "7day".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
struct TopTrack {
    name: String,
    artist: String,
}

/// Populate a playlist with the user's Last.fm top tracks.
#[derive(Debug)]
pub struct LastFmTopTracksModule {
    options: LastFmTopTracksOptions,
    summary: Map<String, Value>,
}

impl LastFmTopTracksModule {
    pub fn new(sync: &SyncConfig) -> Result<Self> {
        let options: LastFmTopTracksOptions = parse_options(&sync.options)?;
        if options.limit == 0 || options.limit > 100 {
            return Err(ModuleError::InvalidOptions(
                "limit must be between 1 and 100".to_string(),
            ));
        }
        Ok(Self {
            options,
            summary: Map::new(),
        })
    }

    async fn fetch_top_tracks(&self, api_key: &str, username: &str) -> Result<Vec<TopTrack>> {
        let base = self.options.api_base.as_deref().unwrap_or(LASTFM_API_BASE);
        let response = reqwest::Client::new()
            .get(base)
            .timeout(std::time::Duration::from_secs(15))
            .query(&[
                ("method", "user.gettoptracks"),
                ("user", username),
                ("api_key", api_key),
                ("format", "json"),
                ("period", &self.options.period),
                ("limit", &self.options.limit.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let payload: Value = response.json().await?;
        let tracks = payload
            .pointer("/toptracks/track")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| TopTrack {
                        name: item
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        artist: item
                            .pointer("/artist/name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(tracks)
    }
}

#[async_trait::async_trait]
impl SyncModule for LastFmTopTracksModule {
    async fn run(&mut self, ctx: &mut SyncContext<'_>) -> Result<RunOutcome> {
        self.summary = Map::new();
        let service = ctx.spotify;

        let Some(lastfm) = &ctx.global.lastfm else {
            return Err(ModuleError::Failed(
                "Last.fm settings are not configured".to_string(),
            ));
        };
        if lastfm.api_key.is_empty() || lastfm.username.is_empty() {
            return Err(ModuleError::Failed(
                "Last.fm api_key and username are required".to_string(),
            ));
        }

        let playlist_id = self.options.playlist.resolve_existing(service).await?;
        info!(target: "lastfm_top_tracks", playlist_id = %playlist_id, "start");

        let tracks = self.fetch_top_tracks(&lastfm.api_key, &lastfm.username).await?;
        if tracks.is_empty() {
            warn!(target: "lastfm_top_tracks", "no tracks returned");
            let outcome = RunOutcome::new(RunStatus::Noop).with("added", 0u64);
            self.summary = outcome.details.clone();
            return Ok(outcome);
        }

        let mut spotify_track_ids: Vec<String> = Vec::with_capacity(tracks.len());
        for track in &tracks {
            match service
                .search_track(&track.name, Some(&track.artist), SEARCH_LIMIT)
                .await?
            {
                Some(id) => spotify_track_ids.push(id),
                None => warn!(
                    target: "lastfm_top_tracks",
                    track = %track.name,
                    artist = %track.artist,
                    "search miss"
                ),
            }
        }

        if spotify_track_ids.is_empty() {
            warn!(target: "lastfm_top_tracks", "no Spotify matches");
            let outcome =
                RunOutcome::new(RunStatus::Failed).with("reason", "no_spotify_matches");
            self.summary = outcome.details.clone();
            return Ok(outcome);
        }

        let previous: Vec<String> = ctx
            .state
            .get("last_tracks")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if previous == spotify_track_ids {
            info!(target: "lastfm_top_tracks", "playlist already up to date");
            let outcome = RunOutcome::new(RunStatus::Unchanged).with("added", 0u64);
            self.summary = outcome.details.clone();
            return Ok(outcome);
        }

        if self.options.clear_before_add {
            service.replace_tracks(&playlist_id, &spotify_track_ids).await?;
        } else {
            service.replace_tracks(&playlist_id, &[]).await?;
            service.add_tracks(&playlist_id, &spotify_track_ids).await?;
        }

        ctx.state.set("last_tracks", json!(spotify_track_ids));

        info!(target: "lastfm_top_tracks", added = spotify_track_ids.len(), "completed");
        let outcome =
            RunOutcome::new(RunStatus::Success).with("added", spotify_track_ids.len() as u64);
        self.summary = outcome.details.clone();
        Ok(outcome)
    }

    fn last_run_summary(&self) -> Map<String, Value> {
        self.summary.clone()
    }
}
