// SPDX-License-Identifier: GPL-3.0-or-later

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use syncopate_config::SyncConfig;
use syncopate_spotify::service::PlaylistTrack;
use syncopate_spotify::SpotifyService;
use syncopate_state::RunStatus;

use crate::context::SyncContext;
use crate::module::SyncModule;
use crate::outcome::RunOutcome;
use crate::resolver::{parse_options, PlaylistResolver, ResolverKind};
use crate::{ModuleError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistRetentionOptions {
    pub source: PlaylistResolver,
    #[serde(default)]
    pub archive: Option<PlaylistResolver>,
    #[serde(default)]
    pub retention_days: Option<i64>,
    #[serde(default)]
    pub max_tracks: Option<usize>,
    #[serde(default)]
    pub min_tracks: Option<usize>,
}

/// Retain recent tracks in a playlist, archiving and pruning older entries.
#[derive(Debug)]
pub struct PlaylistRetentionModule {
    options: PlaylistRetentionOptions,
    summary: Map<String, Value>,
}

impl PlaylistRetentionModule {
    pub fn new(sync: &SyncConfig) -> Result<Self> {
        Ok(Self {
            options: parse_options(&sync.options)?,
            summary: Map::new(),
        })
    }

    /// The retention source must already exist: an id passes through, a
    /// name is looked up. Pattern resolvers would ensure-create an empty
    /// playlist and are not valid here.
    async fn resolve_source_playlist(&self, service: &SpotifyService) -> Result<String> {
        let resolver = &self.options.source;
        match resolver.kind {
            ResolverKind::PlaylistId => resolver.playlist_id.clone().ok_or_else(|| {
                ModuleError::PlaylistResolution("playlist_id requires 'id'".to_string())
            }),
            ResolverKind::PlaylistName => {
                let name = resolver.name.as_deref().ok_or_else(|| {
                    ModuleError::PlaylistResolution("playlist_name requires 'name'".to_string())
                })?;
                let playlist = service.find_playlist_by_name(name).await?;
                playlist.map(|playlist| playlist.id).ok_or_else(|| {
                    ModuleError::PlaylistResolution(format!("source playlist '{name}' not found"))
                })
            }
            ResolverKind::PlaylistPattern | ResolverKind::SavedTracks => {
                Err(ModuleError::PlaylistResolution(
                    "retention source must be playlist_id or playlist_name".to_string(),
                ))
            }
        }
    }

    /// Select tracks to drop: first everything past the retention cutoff,
    /// then the oldest beyond `max_tracks`, then give back the newest
    /// removals until `min_tracks` survive.
    fn determine_tracks_to_remove(&self, tracks: &[PlaylistTrack]) -> Vec<PlaylistTrack> {
        if tracks.is_empty() {
            return Vec::new();
        }

        let cutoff = self
            .options
            .retention_days
            .map(|days| Utc::now() - Duration::days(days));

        let mut removal: Vec<PlaylistTrack> = Vec::new();
        if let Some(cutoff) = cutoff {
            for track in tracks {
                if parse_added_at(track.added_at.as_deref()).is_some_and(|at| at < cutoff) {
                    removal.push(track.clone());
                }
            }
        }

        if let Some(max_tracks) = self.options.max_tracks {
            if tracks.len() - removal.len() > max_tracks {
                let mut sorted: Vec<&PlaylistTrack> = tracks.iter().collect();
                sorted.sort_by_key(|track| parse_added_at(track.added_at.as_deref()));
                let keep: std::collections::HashSet<&str> = sorted
                    [sorted.len().saturating_sub(max_tracks)..]
                    .iter()
                    .map(|track| track.id.as_str())
                    .collect();
                for track in sorted {
                    if !keep.contains(track.id.as_str())
                        && !removal.iter().any(|existing| existing.id == track.id)
                    {
                        removal.push(track.clone());
                    }
                }
            }
        }

        if let Some(min_tracks) = self.options.min_tracks {
            removal.sort_by_key(|track| parse_added_at(track.added_at.as_deref()));
            while !removal.is_empty() && tracks.len() - removal.len() < min_tracks {
                removal.remove(0);
            }
        }

        // unique by id, oldest first
        let mut unique: Vec<PlaylistTrack> = Vec::with_capacity(removal.len());
        for track in removal {
            if !unique.iter().any(|existing| existing.id == track.id) {
                unique.push(track);
            }
        }
        unique.sort_by_key(|track| parse_added_at(track.added_at.as_deref()));
        unique
    }
}

fn parse_added_at(value: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value?)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait::async_trait]
impl SyncModule for PlaylistRetentionModule {
    async fn run(&mut self, ctx: &mut SyncContext<'_>) -> Result<RunOutcome> {
        self.summary = Map::new();
        let service = ctx.spotify;
        info!(target: "playlist_retention", "start");

        let source_id = self.resolve_source_playlist(service).await?;
        let archive_id = match &self.options.archive {
            Some(archive) => Some(archive.resolve_or_create(service).await?),
            None => None,
        };

        let tracks = service.get_playlist_items_with_added_at(&source_id).await?;
        info!(target: "playlist_retention", count = tracks.len(), "source fetched");

        let to_remove = self.determine_tracks_to_remove(&tracks);
        if to_remove.is_empty() {
            info!(target: "playlist_retention", "retention criteria satisfied");
            let outcome = RunOutcome::new(RunStatus::Noop)
                .with("removed", 0u64)
                .with("retained", tracks.len() as u64);
            self.summary = outcome.details.clone();
            return Ok(outcome);
        }

        let removal_ids: Vec<String> = to_remove.iter().map(|track| track.id.clone()).collect();

        if let Some(archive_id) = &archive_id {
            let archived = service.add_tracks(archive_id, &removal_ids).await?;
            info!(
                target: "playlist_retention",
                added = archived,
                archive_playlist = %archive_id,
                "archived"
            );
        }

        service.remove_tracks(&source_id, &removal_ids).await?;
        let retained = tracks.len().saturating_sub(removal_ids.len());
        info!(
            target: "playlist_retention",
            removed = removal_ids.len(),
            remaining = retained,
            "pruned"
        );

        let outcome = RunOutcome::new(RunStatus::Success)
            .with("removed", removal_ids.len() as u64)
            .with(
                "archived",
                if archive_id.is_some() { removal_ids.len() as u64 } else { 0 },
            )
            .with("retained", retained as u64);
        self.summary = outcome.details.clone();
        Ok(outcome)
    }

    fn last_run_summary(&self) -> Map<String, Value> {
        self.summary.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, added_at: &str) -> PlaylistTrack {
        PlaylistTrack {
            id: id.to_string(),
            name: id.to_string(),
            artists: String::new(),
            added_at: Some(added_at.to_string()),
        }
    }

    fn module(options: serde_json::Value) -> PlaylistRetentionModule {
        let sync: SyncConfig = serde_json::from_value(serde_json::json!({
            "id": "retention",
            "type": "playlist_retention",
            "schedule": {"interval": "1h"},
            "options": options,
        }))
        .unwrap();
        PlaylistRetentionModule::new(&sync).unwrap()
    }

    fn days_ago(days: i64) -> String {
        (Utc::now() - Duration::days(days)).to_rfc3339()
    }

    #[test]
    fn retention_days_prunes_old_tracks() {
        let module = module(serde_json::json!({
            "source": {"kind": "playlist_id", "id": "p"},
            "retention_days": 7,
        }));
        let tracks = vec![
            track("old", &days_ago(10)),
            track("newer", &days_ago(3)),
            track("new", &days_ago(1)),
        ];
        let removal = module.determine_tracks_to_remove(&tracks);
        assert_eq!(removal.len(), 1);
        assert_eq!(removal[0].id, "old");
    }

    #[test]
    fn max_tracks_removes_the_oldest_overflow() {
        let module = module(serde_json::json!({
            "source": {"kind": "playlist_id", "id": "p"},
            "max_tracks": 2,
        }));
        let tracks = vec![
            track("a", &days_ago(5)),
            track("b", &days_ago(4)),
            track("c", &days_ago(3)),
            track("d", &days_ago(2)),
        ];
        let removal = module.determine_tracks_to_remove(&tracks);
        let ids: Vec<&str> = removal.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn min_tracks_undoes_removals_newest_first() {
        let module = module(serde_json::json!({
            "source": {"kind": "playlist_id", "id": "p"},
            "retention_days": 1,
            "min_tracks": 2,
        }));
        let tracks = vec![
            track("a", &days_ago(10)),
            track("b", &days_ago(9)),
            track("c", &days_ago(8)),
        ];
        let removal = module.determine_tracks_to_remove(&tracks);
        // all three are past the cutoff, but two must survive; undo starts
        // from the front of the removal list
        assert_eq!(removal.len(), 1);
        assert_eq!(removal[0].id, "c");
    }

    fn offline_service() -> SpotifyService {
        let paths = syncopate_config::ConfigPaths::from_base_dir("/tmp/syncopate-test");
        let mut global = syncopate_config::GlobalConfig::defaults_for(&paths);
        global.spotify.client_id = "id".to_string();
        global.spotify.client_secret = "secret".to_string();
        let auth = syncopate_spotify::SpotifyAuth::from_config(&global).unwrap();
        SpotifyService::new(syncopate_spotify::SpotifyClient::new(auth).unwrap())
    }

    #[tokio::test]
    async fn pattern_sources_are_rejected() {
        let module = module(serde_json::json!({
            "source": {"kind": "playlist_pattern", "pattern": "Liked ${month_abbr}"},
            "retention_days": 7,
        }));
        let err = module
            .resolve_source_playlist(&offline_service())
            .await
            .unwrap_err();
        assert!(matches!(err, ModuleError::PlaylistResolution(_)));
    }

    #[test]
    fn empty_playlist_removes_nothing() {
        let module = module(serde_json::json!({
            "source": {"kind": "playlist_id", "id": "p"},
            "retention_days": 1,
        }));
        assert!(module.determine_tracks_to_remove(&[]).is_empty());
    }
}
