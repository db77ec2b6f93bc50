// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::Playlist;

/// One playlist entry as persisted by the `playlist_cache` sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPlaylist {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub collaborative: Option<bool>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub snapshot_id: Option<String>,
}

impl From<&Playlist> for CachedPlaylist {
    fn from(playlist: &Playlist) -> Self {
        Self {
            id: playlist.id.clone(),
            name: playlist.name.clone(),
            uri: playlist.uri.clone(),
            href: playlist.href.clone(),
            public: playlist.public,
            collaborative: playlist.collaborative,
            owner_id: playlist.owner.as_ref().and_then(|owner| owner.id.clone()),
            snapshot_id: playlist.snapshot_id.clone(),
        }
    }
}

/// Cross-sync snapshot of the user's playlists, rebuilt by the supervisor
/// from the freshest `playlist_cache` state file. Read-only for consumers;
/// shared as an `Arc` so a fire sees one consistent snapshot.
#[derive(Debug, Clone)]
pub struct SharedPlaylistCache {
    last_refreshed: String,
    playlists: Vec<CachedPlaylist>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<String, usize>,
}

impl SharedPlaylistCache {
    /// Build the snapshot and its lookup indices. Name keys are lowercased
    /// and trimmed; on collision the last entry wins.
    pub fn new(last_refreshed: String, playlists: Vec<CachedPlaylist>) -> Arc<Self> {
        let mut by_name = HashMap::with_capacity(playlists.len());
        let mut by_id = HashMap::with_capacity(playlists.len());
        for (index, playlist) in playlists.iter().enumerate() {
            by_name.insert(playlist.name.trim().to_lowercase(), index);
            by_id.insert(playlist.id.clone(), index);
        }
        Arc::new(Self {
            last_refreshed,
            playlists,
            by_name,
            by_id,
        })
    }

    pub fn last_refreshed(&self) -> &str {
        &self.last_refreshed
    }

    pub fn playlists(&self) -> &[CachedPlaylist] {
        &self.playlists
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&CachedPlaylist> {
        self.by_name
            .get(&name.trim().to_lowercase())
            .map(|&index| &self.playlists[index])
    }

    pub fn lookup_by_id(&self, id: &str) -> Option<&CachedPlaylist> {
        self.by_id.get(id).map(|&index| &self.playlists[index])
    }

    pub fn len(&self) -> usize {
        self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty()
    }
}
