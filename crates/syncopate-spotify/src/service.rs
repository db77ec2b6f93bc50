// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;

use chrono::{DateTime, Duration, Local, Utc};
use tokio::sync::Mutex;
use tracing::warn;

use crate::cache::SharedPlaylistCache;
use crate::client::{SpotifyClient, BATCH_SIZE};
use crate::error::Result;
use crate::models::Playlist;

/// Scan order for the saved-tracks library (which is served newest-first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanDirection {
    #[default]
    Oldest,
    Newest,
}

/// Constraints for a saved-tracks scan.
#[derive(Debug, Clone, Default)]
pub struct SavedTracksQuery {
    pub max_tracks: Option<usize>,
    pub lookback_count: Option<usize>,
    pub lookback_days: Option<i64>,
    pub full_scan: bool,
    pub last_processed_id: Option<String>,
    pub direction: ScanDirection,
}

/// A playlist entry with the metadata the retention module needs.
#[derive(Debug, Clone)]
pub struct PlaylistTrack {
    pub id: String,
    pub name: String,
    pub artists: String,
    pub added_at: Option<String>,
}

/// High-level Spotify helpers built on top of [`SpotifyClient`].
///
/// Playlist discovery consults the shared cache first (when the supervisor
/// injected one) and falls back to listing the user's playlists, memoized
/// for the lifetime of the service — one fire.
#[derive(Debug)]
pub struct SpotifyService {
    client: SpotifyClient,
    shared_cache: Option<Arc<SharedPlaylistCache>>,
    current_user_id: Mutex<Option<String>>,
    playlists: Mutex<Option<Vec<Playlist>>>,
}

impl SpotifyService {
    pub fn new(client: SpotifyClient) -> Self {
        Self {
            client,
            shared_cache: None,
            current_user_id: Mutex::new(None),
            playlists: Mutex::new(None),
        }
    }

    /// Inject the shared playlist cache produced by a `playlist_cache` sync.
    pub fn with_shared_cache(mut self, cache: Option<Arc<SharedPlaylistCache>>) -> Self {
        self.shared_cache = cache;
        self
    }

    pub fn client(&self) -> &SpotifyClient {
        &self.client
    }

    pub async fn user_id(&self) -> Result<String> {
        let mut cached = self.current_user_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }
        let user = self.client.current_user().await?;
        *cached = Some(user.id.clone());
        Ok(user.id)
    }

    // ------------------------------------------------------------------
    // Playlist discovery
    // ------------------------------------------------------------------

    /// A fresh listing of all of the user's playlists.
    pub async fn list_all_playlists(&self) -> Result<Vec<Playlist>> {
        let mut playlists = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.client.current_user_playlists(offset).await?;
            let count = page.items.len();
            playlists.extend(page.items);
            if page.next.is_none() || count == 0 {
                break;
            }
            offset += count;
        }
        Ok(playlists)
    }

    /// Find a playlist by case-insensitive name, preferring the shared cache.
    pub async fn find_playlist_by_name(&self, name: &str) -> Result<Option<Playlist>> {
        if let Some(cache) = &self.shared_cache {
            if let Some(entry) = cache.lookup_by_name(name) {
                return Ok(Some(Playlist {
                    id: entry.id.clone(),
                    name: entry.name.clone(),
                    uri: entry.uri.clone(),
                    href: entry.href.clone(),
                    public: entry.public,
                    collaborative: entry.collaborative,
                    owner: None,
                    snapshot_id: entry.snapshot_id.clone(),
                }));
            }
        }

        let needle = name.trim().to_lowercase();
        let mut memo = self.playlists.lock().await;
        if memo.is_none() {
            *memo = Some(self.list_all_playlists().await?);
        }
        Ok(memo
            .as_ref()
            .and_then(|playlists| {
                playlists
                    .iter()
                    .find(|playlist| playlist.name.trim().to_lowercase() == needle)
            })
            .cloned())
    }

    /// Find a playlist by name or create it.
    pub async fn ensure_playlist(
        &self,
        name: &str,
        public: bool,
        description: Option<&str>,
    ) -> Result<Playlist> {
        if let Some(existing) = self.find_playlist_by_name(name).await? {
            return Ok(existing);
        }
        let user_id = self.user_id().await?;
        let playlist = self
            .client
            .create_playlist(&user_id, name, public, description)
            .await?;
        // the memoized listing is stale now
        *self.playlists.lock().await = None;
        Ok(playlist)
    }

    // ------------------------------------------------------------------
    // Track fetching
    // ------------------------------------------------------------------

    /// Track ids of a playlist, in playlist order.
    pub async fn get_playlist_tracks(&self, playlist_id: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.client.playlist_items(playlist_id, offset).await?;
            let count = page.items.len();
            ids.extend(
                page.items
                    .into_iter()
                    .filter_map(|entry| entry.track.and_then(|track| track.id)),
            );
            if page.next.is_none() || count == 0 {
                break;
            }
            offset += count;
        }
        Ok(ids)
    }

    /// Playlist entries with track metadata and added timestamps.
    pub async fn get_playlist_items_with_added_at(
        &self,
        playlist_id: &str,
    ) -> Result<Vec<PlaylistTrack>> {
        let mut items = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.client.playlist_items(playlist_id, offset).await?;
            let count = page.items.len();
            for entry in page.items {
                let Some(track) = entry.track else { continue };
                let Some(id) = track.id.clone() else { continue };
                items.push(PlaylistTrack {
                    id,
                    artists: track.artist_names(),
                    name: track.name,
                    added_at: entry.added_at,
                });
            }
            if page.next.is_none() || count == 0 {
                break;
            }
            offset += count;
        }
        Ok(items)
    }

    /// Saved track ids honoring the scan constraints. The library is served
    /// newest-first; `Oldest` direction reverses the collected window.
    pub async fn get_saved_tracks(&self, query: &SavedTracksQuery) -> Result<Vec<String>> {
        let mut max_items = query.max_tracks;
        if let Some(lookback) = query.lookback_count {
            max_items = Some(max_items.map_or(lookback, |max| max.min(lookback)));
        }

        let page_limit = max_items.map_or(50, |max| max.clamp(1, 50));
        let cutoff: Option<DateTime<Utc>> = query
            .lookback_days
            .filter(|days| *days > 0)
            .map(|days| Utc::now() - Duration::days(days));

        let mut collected: Vec<String> = Vec::new();
        let mut offset = 0;
        'scan: loop {
            let page = self.client.saved_tracks(page_limit, offset).await?;
            let count = page.items.len();

            for entry in &page.items {
                let Some(track_id) = entry.track.as_ref().and_then(|t| t.id.clone()) else {
                    continue;
                };

                if !query.full_scan
                    && query.last_processed_id.as_deref() == Some(track_id.as_str())
                {
                    break 'scan;
                }

                if let (Some(cutoff), Some(added_at)) = (cutoff, parse_timestamp(entry.added_at.as_deref())) {
                    if added_at < cutoff {
                        break 'scan;
                    }
                }

                collected.push(track_id);

                if query.lookback_count.is_some_and(|n| collected.len() >= n)
                    || query.max_tracks.is_some_and(|n| collected.len() >= n)
                {
                    break 'scan;
                }
            }

            if page.next.is_none() || count == 0 {
                break;
            }
            offset += count;
        }

        if query.direction == ScanDirection::Oldest {
            collected.reverse();
        }
        Ok(collected)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Add tracks in batches of 100; returns the number requested.
    pub async fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<usize> {
        for batch in track_ids.chunks(BATCH_SIZE) {
            self.client.add_items(playlist_id, batch).await?;
        }
        Ok(track_ids.len())
    }

    /// Remove all occurrences of the given tracks, batched.
    pub async fn remove_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<usize> {
        for batch in track_ids.chunks(BATCH_SIZE) {
            self.client.remove_items(playlist_id, batch).await?;
        }
        Ok(track_ids.len())
    }

    /// Replace the playlist contents: first batch replaces, the rest append.
    pub async fn replace_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        let (first, rest) = track_ids.split_at(track_ids.len().min(BATCH_SIZE));
        self.client.replace_items(playlist_id, first).await?;
        for batch in rest.chunks(BATCH_SIZE) {
            self.client.add_items(playlist_id, batch).await?;
        }
        Ok(())
    }

    pub async fn update_playlist_details(
        &self,
        playlist_id: &str,
        name: Option<&str>,
        description: Option<&str>,
        public: Option<bool>,
    ) -> Result<()> {
        self.client
            .change_details(playlist_id, name, description, public)
            .await
    }

    pub async fn upload_playlist_cover(&self, playlist_id: &str, image_b64: String) -> Result<()> {
        self.client.upload_cover(playlist_id, image_b64).await
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Find the Spotify id for a track, trying a strict field query first
    /// and relaxing to a free-text search with name/artist matching.
    pub async fn search_track(
        &self,
        name: &str,
        artist: Option<&str>,
        limit: usize,
    ) -> Result<Option<String>> {
        let mut query = format!("track:{name}");
        if let Some(artist) = artist {
            query.push_str(&format!(" artist:{artist}"));
        }
        let strict = self.client.search_tracks(&query, 1).await?;
        if let Some(hit) = strict.first().and_then(|track| track.id.clone()) {
            return Ok(Some(hit));
        }

        let relaxed_query = match artist {
            Some(artist) => format!("{name} {artist}"),
            None => name.to_string(),
        };
        let relaxed = self.client.search_tracks(&relaxed_query, limit).await?;
        if relaxed.is_empty() {
            warn!(target: "spotify", track = name, "search found no candidates");
            return Ok(None);
        }

        let needle_name = name.to_lowercase();
        let needle_artist = artist.map(str::to_lowercase);
        for track in &relaxed {
            let track_name = track.name.to_lowercase();
            let track_artists = track.artist_names().to_lowercase();
            if !needle_name.is_empty() && track_name.contains(&needle_name) {
                let artist_matches = needle_artist
                    .as_ref()
                    .map_or(true, |needle| track_artists.contains(needle));
                if artist_matches {
                    return Ok(track.id.clone());
                }
            }
        }
        Ok(relaxed.first().and_then(|track| track.id.clone()))
    }
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?;
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Expand `${...}` date placeholders in a playlist name pattern.
pub fn format_pattern(pattern: &str) -> String {
    format_pattern_at(pattern, Local::now())
}

fn format_pattern_at<Tz: chrono::TimeZone>(pattern: &str, now: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    pattern
        .replace("${month_abbr}", &now.format("%b").to_string().to_uppercase())
        .replace("${month_full}", &now.format("%B").to_string())
        .replace("${year_short}", &now.format("%y").to_string())
        .replace("${year_full}", &now.format("%Y").to_string())
        .replace("${weekday}", &now.format("%A").to_string())
}
