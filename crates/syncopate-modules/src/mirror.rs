// SPDX-License-Identifier: GPL-3.0-or-later

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use syncopate_config::SyncConfig;
use syncopate_spotify::service::SavedTracksQuery;
use syncopate_spotify::{SpotifyError, SpotifyService};
use syncopate_state::RunStatus;

use crate::context::SyncContext;
use crate::module::SyncModule;
use crate::outcome::RunOutcome;
use crate::resolver::{parse_options, PlaylistResolver, ResolverKind, ScanDirection};
use crate::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistMirrorOptions {
    pub source: PlaylistResolver,
    pub targets: Vec<PlaylistResolver>,
    #[serde(default = "default_true")]
    pub deduplicate: bool,
    #[serde(default)]
    pub max_tracks: Option<usize>,
}

fn default_true() -> bool {
    true
}

struct TargetPlaylist {
    id: String,
    name: String,
}

/// Mirror tracks from a source (saved tracks or a playlist) into one or
/// more target playlists, advancing a cursor between fires.
#[derive(Debug)]
pub struct PlaylistMirrorModule {
    options: PlaylistMirrorOptions,
    summary: Map<String, Value>,
}

impl PlaylistMirrorModule {
    pub fn new(sync: &SyncConfig) -> Result<Self> {
        Ok(Self {
            options: parse_options(&sync.options)?,
            summary: Map::new(),
        })
    }

    fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.summary.insert(key.to_string(), value.into());
    }

    fn add_to(&mut self, key: &str, value: u64) {
        let current = self.summary.get(key).and_then(Value::as_u64).unwrap_or(0);
        self.summary.insert(key.to_string(), json!(current + value));
    }

    fn outcome(&self, status: RunStatus) -> RunOutcome {
        RunOutcome {
            status,
            details: self.summary.clone(),
        }
    }

    async fn collect_source_tracks(
        &self,
        service: &SpotifyService,
        cursor: Option<&str>,
    ) -> Result<Vec<String>> {
        let source = &self.options.source;
        match source.kind {
            ResolverKind::SavedTracks => {
                let query = SavedTracksQuery {
                    max_tracks: source.max_tracks.or(self.options.max_tracks),
                    lookback_count: source.lookback_count,
                    lookback_days: source.lookback_days,
                    full_scan: source.full_scan,
                    last_processed_id: cursor.map(str::to_string),
                    direction: source.scan_direction.into(),
                };
                Ok(service.get_saved_tracks(&query).await?)
            }
            ResolverKind::PlaylistId => {
                let id = source.playlist_id.as_deref().ok_or_else(|| {
                    crate::ModuleError::PlaylistResolution("playlist_id requires 'id'".to_string())
                })?;
                Ok(service.get_playlist_tracks(id).await?)
            }
            ResolverKind::PlaylistName => {
                let name = source.name.as_deref().ok_or_else(|| {
                    crate::ModuleError::PlaylistResolution(
                        "playlist_name requires 'name'".to_string(),
                    )
                })?;
                match service.find_playlist_by_name(name).await? {
                    Some(playlist) => Ok(service.get_playlist_tracks(&playlist.id).await?),
                    None => Ok(Vec::new()),
                }
            }
            ResolverKind::PlaylistPattern => Err(crate::ModuleError::PlaylistResolution(
                "playlist_pattern is not a valid mirror source".to_string(),
            )),
        }
    }

    /// Drop everything at or before the cursor, returning tracks in the
    /// order they should be appended (oldest to newest).
    fn filter_new_tracks(&self, source_ids: &[String], cursor: Option<&str>) -> Vec<String> {
        let newest_first = self.options.source.scan_direction == ScanDirection::Newest;

        let Some(cursor) = cursor else {
            return if newest_first {
                source_ids.iter().rev().cloned().collect()
            } else {
                source_ids.to_vec()
            };
        };

        match source_ids.iter().position(|id| id == cursor) {
            Some(index) if newest_first => source_ids[..index].iter().rev().cloned().collect(),
            Some(index) => source_ids[index + 1..].to_vec(),
            None => {
                warn!(
                    target: "playlist_mirror",
                    last_processed_id = cursor,
                    "previous cursor not found; processing all tracks"
                );
                source_ids.to_vec()
            }
        }
    }

    async fn resolve_targets(&self, ctx: &mut SyncContext<'_>) -> Result<Vec<TargetPlaylist>> {
        let service = ctx.spotify;
        let mut targets = Vec::with_capacity(self.options.targets.len());

        for resolver in &self.options.targets {
            let target = match resolver.kind {
                ResolverKind::PlaylistId => {
                    let id = resolver.playlist_id.as_deref().ok_or_else(|| {
                        crate::ModuleError::PlaylistResolution(
                            "playlist_id requires 'id'".to_string(),
                        )
                    })?;
                    let playlist = service.client().playlist(id).await?;
                    TargetPlaylist {
                        id: playlist.id,
                        name: playlist.name,
                    }
                }
                ResolverKind::PlaylistName => {
                    let name = resolver.name.as_deref().ok_or_else(|| {
                        crate::ModuleError::PlaylistResolution(
                            "playlist_name requires 'name'".to_string(),
                        )
                    })?;
                    let cache_key = format!("name::{}", name.trim().to_lowercase());
                    self.get_or_create_cached(ctx, name, resolver, &cache_key).await?
                }
                ResolverKind::PlaylistPattern => {
                    let pattern = resolver.pattern.as_deref().ok_or_else(|| {
                        crate::ModuleError::PlaylistResolution(
                            "playlist_pattern requires 'pattern'".to_string(),
                        )
                    })?;
                    let name = syncopate_spotify::format_pattern(pattern);
                    let cache_key =
                        format!("pattern::{pattern}::{}", name.trim().to_lowercase());
                    self.get_or_create_cached(ctx, &name, resolver, &cache_key).await?
                }
                ResolverKind::SavedTracks => {
                    return Err(crate::ModuleError::PlaylistResolution(
                        "saved_tracks is not a valid mirror target".to_string(),
                    ))
                }
            };
            targets.push(target);
        }
        Ok(targets)
    }

    /// Resolve a named target through the per-sync playlist id cache so
    /// repeat fires skip the discovery round trip.
    async fn get_or_create_cached(
        &self,
        ctx: &mut SyncContext<'_>,
        name: &str,
        resolver: &PlaylistResolver,
        cache_key: &str,
    ) -> Result<TargetPlaylist> {
        let cached_id = ctx
            .state
            .get("playlist_cache")
            .and_then(|cache| cache.get(cache_key))
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(id) = cached_id {
            match ctx.spotify.client().playlist(&id).await {
                Ok(playlist) => {
                    return Ok(TargetPlaylist {
                        id: playlist.id,
                        name: playlist.name,
                    })
                }
                Err(SpotifyError::RateLimited { retry_after }) => {
                    return Err(SpotifyError::RateLimited { retry_after }.into())
                }
                Err(_) => {
                    debug!(target: "playlist_mirror", cache_key, "cached playlist id is stale");
                    ctx.state.scratch_mut("playlist_cache").remove(cache_key);
                    ctx.state.mark_dirty();
                }
            }
        }

        let playlist = ctx
            .spotify
            .ensure_playlist(name, resolver.public, resolver.description.as_deref())
            .await?;
        ctx.state
            .scratch_mut("playlist_cache")
            .insert(cache_key.to_string(), json!(playlist.id));
        ctx.state.mark_dirty();
        Ok(TargetPlaylist {
            id: playlist.id,
            name: playlist.name,
        })
    }

    async fn sync_target(
        &mut self,
        service: &SpotifyService,
        target: &TargetPlaylist,
        tracks_to_process: &[String],
        had_cursor: bool,
    ) -> Result<usize> {
        let mut tracks_to_add = tracks_to_process.to_vec();

        // a full existing-track diff only pays off on the cursorless first
        // run; afterwards the cursor already bounds the work
        if self.options.deduplicate && !had_cursor {
            let existing: std::collections::HashSet<String> =
                service.get_playlist_tracks(&target.id).await?.into_iter().collect();
            tracks_to_add.retain(|id| !existing.contains(id));
        }

        if tracks_to_add.is_empty() {
            info!(
                target: "playlist_mirror",
                target_id = %target.id,
                target_name = %target.name,
                "target skipped, no new tracks"
            );
            return Ok(0);
        }

        let added = service.add_tracks(&target.id, &tracks_to_add).await?;
        info!(
            target: "playlist_mirror",
            target_id = %target.id,
            target_name = %target.name,
            added,
            "target synced"
        );
        Ok(added)
    }

    fn update_cursor(&self, ctx: &mut SyncContext<'_>, source_ids: &[String]) {
        let cursor_value = match self.options.source.scan_direction {
            ScanDirection::Newest => source_ids.first(),
            ScanDirection::Oldest => source_ids.last(),
        };
        if let Some(id) = cursor_value {
            ctx.state.set_last_processed_track_id(Some(id));
        }
    }
}

#[async_trait::async_trait]
impl SyncModule for PlaylistMirrorModule {
    async fn run(&mut self, ctx: &mut SyncContext<'_>) -> Result<RunOutcome> {
        self.summary = Map::new();
        self.set("processed", 0u64);
        self.set("targets", 0u64);
        self.set("total_source", 0u64);
        self.set("added", 0u64);

        info!(target: "playlist_mirror", "start");
        let service = ctx.spotify;
        let cursor = ctx.state.last_processed_track_id().map(str::to_string);

        let source_ids = match self.collect_source_tracks(service, cursor.as_deref()).await {
            Ok(ids) => ids,
            Err(crate::ModuleError::Spotify(SpotifyError::RateLimited { retry_after })) => {
                warn!(target: "playlist_mirror", phase = "source", "rate limited");
                self.set("reason", "source_rate_limited");
                return Ok(self
                    .outcome(RunStatus::RateLimited)
                    .with("retry_after", json!(retry_after)));
            }
            Err(other) => return Err(other),
        };

        if source_ids.is_empty() {
            info!(target: "playlist_mirror", "no tracks to mirror");
            self.set("reason", "no_source_tracks");
            return Ok(self.outcome(RunStatus::Idle));
        }
        self.set("total_source", source_ids.len() as u64);

        let tracks_to_process = self.filter_new_tracks(&source_ids, cursor.as_deref());
        self.set("processed", tracks_to_process.len() as u64);

        let targets = match self.resolve_targets(ctx).await {
            Ok(targets) => targets,
            Err(crate::ModuleError::Spotify(SpotifyError::RateLimited { retry_after })) => {
                warn!(target: "playlist_mirror", phase = "target_resolve", "rate limited");
                self.set("reason", "target_resolution_rate_limited");
                return Ok(self
                    .outcome(RunStatus::RateLimited)
                    .with("retry_after", json!(retry_after)));
            }
            Err(other) => return Err(other),
        };
        self.set("targets", targets.len() as u64);

        let status = if tracks_to_process.is_empty() {
            info!(target: "playlist_mirror", "cursor up to date");
            self.set("reason", "cursor_up_to_date");
            RunStatus::UpToDate
        } else {
            for target in &targets {
                match self
                    .sync_target(service, target, &tracks_to_process, cursor.is_some())
                    .await
                {
                    Ok(added) => self.add_to("added", added as u64),
                    Err(crate::ModuleError::Spotify(SpotifyError::RateLimited { retry_after })) => {
                        warn!(
                            target: "playlist_mirror",
                            phase = "target_sync",
                            target_id = %target.id,
                            "rate limited"
                        );
                        self.set("reason", "target_sync_rate_limited");
                        return Ok(self
                            .outcome(RunStatus::RateLimited)
                            .with("retry_after", json!(retry_after)));
                    }
                    Err(other) => return Err(other),
                }
            }
            let added = self.summary.get("added").and_then(Value::as_u64).unwrap_or(0);
            if added > 0 {
                RunStatus::Success
            } else {
                self.set("reason", "no_new_tracks_after_deduplicate");
                RunStatus::Noop
            }
        };

        self.update_cursor(ctx, &source_ids);
        info!(
            target: "playlist_mirror",
            targets = targets.len(),
            processed = tracks_to_process.len(),
            "completed"
        );
        Ok(self.outcome(status))
    }

    fn last_run_summary(&self) -> Map<String, Value> {
        self.summary.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_with_direction(direction: &str) -> PlaylistMirrorModule {
        let sync: SyncConfig = serde_json::from_value(serde_json::json!({
            "id": "mirror",
            "type": "playlist_mirror",
            "schedule": {"interval": "5m"},
            "options": {
                "source": {"kind": "saved_tracks", "scan_direction": direction},
                "targets": [{"kind": "playlist_id", "id": "p1"}],
            },
        }))
        .unwrap();
        PlaylistMirrorModule::new(&sync).unwrap()
    }

    #[test]
    fn filter_without_cursor_orders_oldest_first() {
        let ids = vec!["t3".to_string(), "t2".to_string(), "t1".to_string()];

        let newest = module_with_direction("newest");
        assert_eq!(newest.filter_new_tracks(&ids, None), vec!["t1", "t2", "t3"]);

        let oldest = module_with_direction("oldest");
        assert_eq!(oldest.filter_new_tracks(&ids, None), vec!["t3", "t2", "t1"]);
    }

    #[test]
    fn filter_slices_around_the_cursor() {
        // newest-first listing: new tracks appear before the cursor
        let ids = vec!["t4".to_string(), "t3".to_string(), "t2".to_string()];
        let newest = module_with_direction("newest");
        assert_eq!(newest.filter_new_tracks(&ids, Some("t2")), vec!["t3", "t4"]);

        // oldest-first listing: new tracks appear after the cursor
        let ids = vec!["t1".to_string(), "t2".to_string(), "t3".to_string()];
        let oldest = module_with_direction("oldest");
        assert_eq!(oldest.filter_new_tracks(&ids, Some("t2")), vec!["t3"]);
    }

    #[test]
    fn missing_cursor_processes_everything() {
        let ids = vec!["t1".to_string(), "t2".to_string()];
        let oldest = module_with_direction("oldest");
        assert_eq!(oldest.filter_new_tracks(&ids, Some("gone")), vec!["t1", "t2"]);
    }
}
