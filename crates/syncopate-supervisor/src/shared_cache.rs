// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use syncopate_config::{GlobalConfig, SyncConfig};
use syncopate_spotify::{CachedPlaylist, SharedPlaylistCache};
use syncopate_state::{state_path_for_sync, SyncState};

/// Rebuilds the cross-sync playlist snapshot from the state files of
/// `playlist_cache` syncs.
///
/// Refreshes are gated by file mtime: a state file that has not changed
/// since the last look is skipped unless the refresh is forced. When no
/// candidate is fresher the previous (possibly stale) snapshot is kept.
#[derive(Debug, Default)]
pub struct SharedCacheManager {
    cache_syncs: Vec<SyncConfig>,
    current: Option<Arc<SharedPlaylistCache>>,
    mtimes: HashMap<PathBuf, SystemTime>,
}

impl SharedCacheManager {
    pub fn new(syncs: &[SyncConfig]) -> Self {
        Self {
            cache_syncs: Self::cache_producers(syncs),
            current: None,
            mtimes: HashMap::new(),
        }
    }

    /// Swap in the sync list after a reload.
    pub fn set_syncs(&mut self, syncs: &[SyncConfig]) {
        self.cache_syncs = Self::cache_producers(syncs);
        if self.cache_syncs.is_empty() {
            self.current = None;
        }
    }

    fn cache_producers(syncs: &[SyncConfig]) -> Vec<SyncConfig> {
        syncs
            .iter()
            .filter(|sync| sync.kind == "playlist_cache")
            .cloned()
            .collect()
    }

    pub fn current(&self) -> Option<Arc<SharedPlaylistCache>> {
        self.current.clone()
    }

    /// Refresh from the freshest eligible cache-producing state file and
    /// return the in-memory snapshot, which may be unchanged.
    pub fn refresh(
        &mut self,
        global: &GlobalConfig,
        force: bool,
    ) -> Option<Arc<SharedPlaylistCache>> {
        if self.cache_syncs.is_empty() {
            self.current = None;
            return None;
        }

        let mut best: Option<(DateTime<Utc>, Vec<CachedPlaylist>)> = None;

        for sync in &self.cache_syncs {
            let path = state_path_for_sync(global, sync);
            let Ok(metadata) = std::fs::metadata(&path) else {
                continue;
            };
            let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

            if !force && self.current.is_some() {
                if let Some(seen) = self.mtimes.get(&path) {
                    if *seen >= mtime {
                        continue;
                    }
                }
            }

            let state = match SyncState::load(&path) {
                Ok(state) => state,
                Err(e) => {
                    warn!(target: "supervisor", path = %path.display(), error = %e, "unreadable cache state");
                    continue;
                }
            };

            let Some(playlists) = state.get("playlists").and_then(Value::as_array) else {
                continue;
            };
            let entries: Vec<CachedPlaylist> = playlists
                .iter()
                .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                .collect();

            let refreshed_at = state
                .get("last_refreshed")
                .and_then(Value::as_str)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|at| at.with_timezone(&Utc))
                .unwrap_or_else(|| DateTime::<Utc>::from(mtime));

            if best
                .as_ref()
                .map_or(true, |(best_at, _)| refreshed_at > *best_at)
            {
                best = Some((refreshed_at, entries));
            }
            self.mtimes.insert(path, mtime);
        }

        if let Some((refreshed_at, entries)) = best {
            debug!(
                target: "supervisor",
                playlists = entries.len(),
                refreshed_at = %refreshed_at,
                "shared playlist cache rebuilt"
            );
            self.current = Some(SharedPlaylistCache::new(refreshed_at.to_rfc3339(), entries));
        }
        self.current.clone()
    }
}
